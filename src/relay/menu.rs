//! 菜单与文案
//!
//! 菜单选项是数据（编号 → 静态内容或状态切换），新增选项只需改配置。

use serde::{Deserialize, Serialize};

use crate::config::BusinessSection;

/// 选项触发的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum OptionAction {
    /// 回复一段静态内容，停留在 MENU
    Reply(String),
    /// 转人工
    Handoff,
    /// 进入 AI 助手模式
    Assistant,
    /// 结束会话
    Exit,
}

/// 菜单选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub code: String,
    pub label: String,
    pub action: OptionAction,
}

impl MenuOption {
    pub fn new(code: impl Into<String>, label: impl Into<String>, action: OptionAction) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
            action,
        }
    }
}

/// 全部对客户的文案与菜单表
#[derive(Debug, Clone)]
pub struct Catalog {
    pub business: BusinessSection,
    pub options: Vec<MenuOption>,
}

fn keycap(code: &str) -> String {
    match code {
        "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9" => format!("{}\u{fe0f}\u{20e3}", code),
        other => format!("{})", other),
    }
}

impl Catalog {
    /// 使用默认菜单；`options` 非空时覆盖默认菜单
    pub fn new(business: BusinessSection, options: Vec<MenuOption>) -> Self {
        let options = if options.is_empty() {
            default_options(&business)
        } else {
            options
        };
        Self { business, options }
    }

    pub fn find(&self, code: &str) -> Option<&MenuOption> {
        let code = code.trim();
        self.options.iter().find(|o| o.code.eq_ignore_ascii_case(code))
    }

    pub fn greeting(&self) -> String {
        let b = &self.business;
        format!(
            "👋 ¡Hola! Soy 🤖 *{} {}*, asistente virtual de *{}*. 😊\n\
             Atendemos {}.\n\n\
             ¿Cómo es tu *nombre*?",
            b.bot_name, b.version, b.company, b.hours
        )
    }

    pub fn reask_name(&self) -> String {
        "🙂 No llegué a entender tu nombre. ¿Me lo escribís? (por ejemplo: *Soy Ana*)".to_string()
    }

    pub fn menu(&self, name: &str) -> String {
        let greeting = if name.is_empty() {
            "¡Genial!".to_string()
        } else {
            format!("¡Genial, {}!", name)
        };
        let mut out = format!("{} ✨\nElegí una opción:\n\n", greeting);
        for option in &self.options {
            out.push_str(&format!("{} {}\n", keycap(&option.code), option.label));
        }
        out.push_str("\nSi querés volver al *menú*, escribí *M*.\nPara *salir*, escribí *S*.");
        out
    }

    pub fn help(&self) -> String {
        "No entendí. Indicá el *número* de la opción, *M* para menú o *S* para salir.".to_string()
    }

    pub fn farewell(&self) -> String {
        format!(
            "¡Gracias por contactarte con *{}*! 👋 Cuando necesites, escribinos de nuevo.",
            self.business.company
        )
    }

    pub fn handoff_confirmation(&self) -> String {
        "📞 *Listo.* Un representante fue notificado. Te responderá por este chat.".to_string()
    }

    pub fn human_ack(&self) -> String {
        "🕐 Gracias por tu mensaje. Nuestro representante ya fue notificado y te responderá a la brevedad."
            .to_string()
    }

    pub fn human_expired(&self) -> String {
        "⏳ La conversación anterior finalizó por inactividad. Volvemos al menú.".to_string()
    }

    pub fn assistant_onboarding(&self) -> String {
        format!(
            "💬 Ahora estás chateando con *{} Asistente*. Podés hacerme preguntas sobre nuestros servicios.",
            self.business.bot_name
        )
    }

    pub fn assistant_footer(&self) -> String {
        "Escribí *M* para volver al menú o *S* para salir.".to_string()
    }

    /// 运营群组：新联系人通知
    pub fn new_contact_notice(&self, name: &str, customer: &str) -> String {
        format!("🆕 Nuevo contacto: {} (+{})", name, customer)
    }

    /// 运营群组：客户请求人工
    pub fn handoff_notice(&self, name: &str, customer: &str) -> String {
        format!(
            "📞 Nuevo cliente quiere hablar con un representante:\n{} (+{})\n\
             Respondé a este mensaje para contestarle.",
            display_or_default(name),
            customer
        )
    }

    /// 运营群组：转发客户消息（正文原样保留）
    pub fn relay_line(&self, name: &str, customer: &str, text: &str) -> String {
        format!("💬 {} (+{}):\n{}", display_or_default(name), customer, text)
    }

    pub fn operator_usage(&self) -> String {
        "❌ No pude identificar al cliente.\n\
         • Respondé (reply) a un mensaje del bot, o\n\
         • escribí: <número> <mensaje>\n\
         • /enviar <número> <mensaje>\n\
         • /cerrar <número>"
            .to_string()
    }
}

/// 运营侧显示名，未采集姓名时用 "Cliente"
pub fn display_or_default(name: &str) -> &str {
    if name.is_empty() {
        "Cliente"
    } else {
        name
    }
}

/// 默认八个选项
pub fn default_options(b: &BusinessSection) -> Vec<MenuOption> {
    vec![
        MenuOption::new(
            "1",
            format!("Enviar tu CV ({})", b.email),
            OptionAction::Reply(format!(
                "📧 Enviá tu CV a: {}\n¡Gracias por postularte! 🙌",
                b.email
            )),
        ),
        MenuOption::new(
            "2",
            format!("Requisitos para trabajar en {}", b.company),
            OptionAction::Reply(format!(
                "✅ *Requisitos para trabajar en {}:*\n\
                 • Título y matrícula habilitante (según profesión).\n\
                 • DNI y CBU.\n\
                 • Seguro/ART o voluntad de gestionarlo con nosotros.\n\
                 • Disponibilidad horaria (guardias/visitas a acordar).\n\
                 • Buena comunicación y trato con pacientes/familias.",
                b.company
            )),
        ),
        MenuOption::new(
            "3",
            "Ingresar a la web institucional",
            OptionAction::Reply(format!("🌐 Visitá nuestra web: {}", b.web_url)),
        ),
        MenuOption::new(
            "4",
            "Completar formulario de base de datos",
            OptionAction::Reply(format!("🗂️ Completá el formulario: {}", b.form_url)),
        ),
        MenuOption::new(
            "5",
            format!("Información sobre {}", b.company),
            OptionAction::Reply(format!(
                "🏥 *Sobre {}*\n\
                 Brindamos *{}* en *{}*.\n\
                 • Prestaciones planificadas y guardias de enfermería.\n\
                 • Atención particular y convenios con obras sociales.\n\
                 • Equipo humano con foco en la calidad y el respeto.",
                b.company, b.services, b.zones
            )),
        ),
        MenuOption::new(
            "6",
            format!("Hablar con un representante de {}", b.company),
            OptionAction::Handoff,
        ),
        MenuOption::new(
            "7",
            format!("Seguir chateando con {} (modo asistente IA)", b.bot_name),
            OptionAction::Assistant,
        ),
        MenuOption::new("8", "Salir ❌", OptionAction::Exit),
    ]
}
