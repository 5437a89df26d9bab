//! AI 助手协作方：带超时地调用 LlmClient，失败、超时或空回答一律视为不可用

use std::sync::Arc;
use std::time::Duration;

use crate::config::BusinessSection;
use crate::core::RelayError;
use crate::llm::{LlmClient, Message};

pub struct Assistant {
    client: Option<Arc<dyn LlmClient>>,
    system_prompt: String,
    context: String,
    timeout: Duration,
}

/// 系统提示：限定回答范围，信息不足时引导转人工
pub fn system_prompt(business: &BusinessSection) -> String {
    format!(
        "Sos el asistente de {company}. Respondé breve, amable y claro. \
         Si preguntan por precios, horarios o zonas, respondé con la info conocida: \
         horario {hours}, zonas {zones}, servicios de {services}. \
         Si falta info exacta, sugerí 'te puede contactar un representante (opción 6)'.",
        company = business.company,
        hours = business.hours,
        zones = business.zones,
        services = business.services,
    )
}

impl Assistant {
    pub fn new(
        client: Arc<dyn LlmClient>,
        business: &BusinessSection,
        context: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Some(client),
            system_prompt: system_prompt(business),
            context,
            timeout,
        }
    }

    /// 未配置后端：每次都走静态兜底
    pub fn disabled() -> Self {
        Self {
            client: None,
            system_prompt: String::new(),
            context: String::new(),
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// 后端累计 token：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.client
            .as_ref()
            .map(|c| c.token_usage())
            .unwrap_or((0, 0, 0))
    }

    pub async fn generate_reply(&self, prompt: &str, context_hint: &str) -> Result<String, RelayError> {
        let Some(client) = &self.client else {
            return Err(RelayError::AssistantUnavailable("assistant disabled".to_string()));
        };

        let mut messages = vec![Message::system(self.system_prompt.clone())];
        if !context_hint.is_empty() {
            messages.push(Message::system(context_hint));
        }
        messages.push(Message::user(prompt));

        match tokio::time::timeout(self.timeout, client.complete(&messages)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(Ok(_)) => Err(RelayError::AssistantUnavailable("empty answer".to_string())),
            Ok(Err(e)) => Err(RelayError::AssistantUnavailable(e)),
            Err(_) => Err(RelayError::AssistantUnavailable(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
