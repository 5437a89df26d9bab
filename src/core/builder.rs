//! 中继构建器：统一的组件初始化逻辑
//!
//! 服务入口与测试共用同一套装配：配置决定默认实现，`with_*` 可替换任意协作方。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::contacts::{create_contact_sink, ContactSink};
use crate::core::RelayError;
use crate::integrations::{TelegramClient, WhatsappClient};
use crate::llm::{LlmClient, OpenAiClient};
use crate::observability::RelayMetrics;
use crate::relay::{
    Assistant, Catalog, Clock, CustomerChannel, CustomerLanes, Deduplicator, HandoffRegistry,
    MemorySessionStore, OperatorChannel, RelayController, SessionStore, StateMachine, SystemClock,
};

/// 中继构建器：配置和初始化控制器的各个组件
pub struct RelayBuilder {
    config: AppConfig,
    clock: Option<Arc<dyn Clock>>,
    sessions: Option<Arc<dyn SessionStore>>,
    customer: Option<Arc<dyn CustomerChannel>>,
    operator: Option<Arc<dyn OperatorChannel>>,
    llm: Option<Arc<dyn LlmClient>>,
    contacts: Option<Arc<dyn ContactSink>>,
}

impl RelayBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            clock: None,
            sessions: None,
            customer: None,
            operator: None,
            llm: None,
            contacts: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_customer_channel(mut self, channel: Arc<dyn CustomerChannel>) -> Self {
        self.customer = Some(channel);
        self
    }

    pub fn with_operator_channel(mut self, channel: Arc<dyn OperatorChannel>) -> Self {
        self.operator = Some(channel);
        self
    }

    /// 指定助手后端（覆盖 [assistant] 配置）
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_contact_sink(mut self, sink: Arc<dyn ContactSink>) -> Self {
        self.contacts = Some(sink);
        self
    }

    /// 按配置创建助手后端；没有 API key 时返回 None
    fn llm_from_config(&self) -> Option<Arc<dyn LlmClient>> {
        let section = &self.config.assistant;
        let key = section.api_key()?;
        let base_url = section
            .base_url
            .as_deref()
            .unwrap_or(crate::llm::GEMINI_OPENAI_BASE_URL);
        tracing::info!(model = %section.model, "Assistant backend: {}", base_url);
        Some(Arc::new(OpenAiClient::new(Some(base_url), &section.model, key)))
    }

    fn build_assistant(&self) -> Assistant {
        let client = self.llm.clone().or_else(|| self.llm_from_config());
        match client {
            Some(client) => {
                let context = self
                    .config
                    .assistant
                    .context
                    .clone()
                    .unwrap_or_else(|| self.config.business.assistant_context());
                Assistant::new(
                    client,
                    &self.config.business,
                    context,
                    self.config.assistant.timeout(),
                )
            }
            None => {
                tracing::info!("Assistant disabled, static fallback answers only");
                Assistant::disabled()
            }
        }
    }

    /// 构建控制器；未注入的渠道从配置创建，缺少凭据时报错
    pub fn build(self) -> Result<RelayController, RelayError> {
        let cfg = &self.config;

        let customer: Arc<dyn CustomerChannel> = match &self.customer {
            Some(c) => Arc::clone(c),
            None => Arc::new(WhatsappClient::from_config(&cfg.whatsapp, &cfg.delivery)?),
        };
        let operator: Arc<dyn OperatorChannel> = match &self.operator {
            Some(o) => Arc::clone(o),
            None => Arc::new(TelegramClient::from_config(&cfg.telegram, &cfg.delivery)?),
        };

        let assistant = self.build_assistant();
        let contacts = self
            .contacts
            .clone()
            .unwrap_or_else(|| create_contact_sink(&cfg.contacts, cfg.delivery.timeout()));

        let catalog = Arc::new(Catalog::new(cfg.business.clone(), cfg.menu.options.clone()));
        let machine = StateMachine::new(catalog, cfg.relay.human_ttl());

        Ok(RelayController {
            sessions: self
                .sessions
                .clone()
                .unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
            dedup: Deduplicator::new(cfg.relay.dedup_window()),
            machine,
            handoffs: Arc::new(HandoffRegistry::new(cfg.relay.max_links_per_customer)),
            lanes: CustomerLanes::new(),
            customer,
            operator,
            assistant,
            contacts,
            clock: self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock)),
            metrics: Arc::new(RelayMetrics::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{RecordingCustomerChannel, RecordingOperatorChannel};

    #[test]
    fn test_build_requires_channel_credentials() {
        let result = RelayBuilder::new(AppConfig::default()).build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_build_with_injected_channels() {
        let controller = RelayBuilder::new(AppConfig::default())
            .with_customer_channel(Arc::new(RecordingCustomerChannel::new()))
            .with_operator_channel(Arc::new(RecordingOperatorChannel::new()))
            .build()
            .unwrap();
        assert!(!controller.assistant.is_enabled());
        assert_eq!(controller.machine.human_ttl(), chrono::Duration::seconds(3600));
    }
}
