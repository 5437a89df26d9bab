//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REKY__*` 覆盖（双下划线表示嵌套，如 `REKY__TELEGRAM__CHAT_ID=-100123`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::relay::MenuOption;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub relay: RelaySection,
    pub business: BusinessSection,
    pub menu: MenuSection,
    pub whatsapp: WhatsappSection,
    pub telegram: TelegramSection,
    pub assistant: AssistantSection,
    pub delivery: DeliverySection,
    pub contacts: ContactsSection,
}

/// [server] 段：监听地址与后台清理周期
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 去重基线与空闲 lane 的清理周期（秒）
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_purge_interval_secs() -> u64 {
    300
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl ServerSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// [relay] 段：人工模式时长、去重窗口、关联表容量
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_human_ttl_secs")]
    pub human_ttl_secs: u64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// 每个客户最多保留的运营消息关联数
    #[serde(default = "default_max_links_per_customer")]
    pub max_links_per_customer: usize,
}

fn default_human_ttl_secs() -> u64 {
    3600
}

fn default_dedup_window_secs() -> u64 {
    90
}

fn default_max_links_per_customer() -> usize {
    64
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            human_ttl_secs: default_human_ttl_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            max_links_per_customer: default_max_links_per_customer(),
        }
    }
}

/// chrono::Duration 可表示的最大秒数（毫秒精度下限）
const MAX_DURATION_SECS: u64 = (i64::MAX / 1000) as u64;

/// 超出范围的配置值截断到上限，不在启动时 panic
fn clamped_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

impl RelaySection {
    pub fn human_ttl(&self) -> chrono::Duration {
        clamped_seconds(self.human_ttl_secs)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        clamped_seconds(self.dedup_window_secs)
    }
}

/// [business] 段：对客户文案里用到的业务信息
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusinessSection {
    pub bot_name: String,
    pub version: String,
    pub company: String,
    pub hours: String,
    pub zones: String,
    pub services: String,
    pub email: String,
    pub form_url: String,
    pub web_url: String,
}

impl Default for BusinessSection {
    fn default() -> Self {
        Self {
            bot_name: "RekyBot".to_string(),
            version: "1.5.1".to_string(),
            company: "REKAR".to_string(),
            hours: "de lunes a sábado de 9 a 19 hs".to_string(),
            zones: "CABA y GBA".to_string(),
            services: "kinesiología y enfermería domiciliaria".to_string(),
            email: "rekar.salud@gmail.com".to_string(),
            form_url: "https://forms.gle/rekar-base-de-datos".to_string(),
            web_url: "https://rekarsalud.blogspot.com/?m=1".to_string(),
        }
    }
}

impl BusinessSection {
    /// 助手的默认业务上下文
    pub fn assistant_context(&self) -> String {
        format!(
            "{company} brinda {services} en {zones}. Horario: {hours}. \
             Contacto: {email}. Web: {web}.",
            company = self.company,
            services = self.services,
            zones = self.zones,
            hours = self.hours,
            email = self.email,
            web = self.web_url,
        )
    }
}

/// [menu] 段：为空时使用内置的八个选项
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MenuSection {
    #[serde(default)]
    pub options: Vec<MenuOption>,
}

/// [whatsapp] 段：Cloud API 凭据与 webhook 校验 token
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsappSection {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub verify_token: Option<String>,
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
}

fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

impl Default for WhatsappSection {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            verify_token: None,
            api_base: default_whatsapp_api_base(),
        }
    }
}

/// [telegram] 段：Bot token 与运营群组 chat_id
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
        }
    }
}

/// [assistant] 段：OpenAI 兼容后端；未配置 api_key 时助手关闭
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: Option<String>,
    #[serde(default = "default_assistant_model")]
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_assistant_timeout_secs")]
    pub timeout_secs: u64,
    /// 追加给模型的业务上下文；未设置时由 [business] 生成
    pub context: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_assistant_model() -> String {
    crate::llm::GEMINI_FLASH.to_string()
}

fn default_assistant_timeout_secs() -> u64 {
    25
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            model: default_assistant_model(),
            api_key: None,
            timeout_secs: default_assistant_timeout_secs(),
            context: None,
        }
    }
}

impl AssistantSection {
    /// 有 key 且未显式关闭
    pub fn api_key(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// [delivery] 段：出站 HTTP 超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySection {
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_delivery_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            timeout_secs: default_delivery_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl DeliverySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// [contacts] 段：联系人登记目标，两者都未设置时不登记
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContactsSection {
    pub jsonl_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
}

/// 从 config 目录加载配置，环境变量 REKY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REKY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REKY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
