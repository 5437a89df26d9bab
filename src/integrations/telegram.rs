//! Telegram Bot API 集成（运营群组）
//!
//! 出站：`sendMessage`，返回的 message_id 作为 `MessageRef` 登记到关联表。
//! 入站：Webhook 推送的 Update，只接受配置的群组，转换为 `OperatorEvent`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{chunk_text, AttemptError, DeliveryPolicy};
use crate::config::{DeliverySection, TelegramSection};
use crate::core::RelayError;
use crate::relay::{MessageRef, OperatorChannel, OperatorEvent};

/// Telegram 单条消息上限 4096 字符
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: Option<i64>,
    pub message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

impl TgMessage {
    fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

/// 转换为运营事件；非授权群组或无消息的 Update 返回 None
pub fn to_operator_event(update: Update, allowed_chat: &str) -> Option<OperatorEvent> {
    let message = update.message?;
    let chat_id = message.chat.id.to_string();
    if chat_id != allowed_chat.trim() {
        tracing::debug!(chat_id = %chat_id, "Ignoring update from unauthorized chat");
        return None;
    }

    let (reply_to, quoted_text) = match &message.reply_to_message {
        Some(replied) => (
            Some(MessageRef::from(replied.message_id)),
            replied.body().map(str::to_string),
        ),
        None => (None, None),
    };

    Some(OperatorEvent {
        text: message.body().unwrap_or_default().to_string(),
        reply_to,
        quoted_text,
        chat_id,
    })
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot API 出站客户端
pub struct TelegramClient {
    http: reqwest::Client,
    url: String,
    chat_id: String,
    policy: DeliveryPolicy,
}

impl TelegramClient {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
        delivery: &DeliverySection,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(delivery.timeout())
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), bot_token),
            chat_id: chat_id.into(),
            policy: DeliveryPolicy::from(delivery),
        })
    }

    pub fn from_config(section: &TelegramSection, delivery: &DeliverySection) -> Result<Self, RelayError> {
        let token = section
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Config("telegram.bot_token is not set".to_string()))?;
        let chat_id = section
            .chat_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Config("telegram.chat_id is not set".to_string()))?;
        Self::new(&section.api_base, token, chat_id, delivery)
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn post_message(&self, text: &str) -> Result<i64, AttemptError> {
        let req = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };
        let resp = self.http.post(&self.url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, &body));
        }
        let body: ApiResponse = resp.json().await?;
        match body {
            ApiResponse {
                ok: true,
                result: Some(sent),
                ..
            } => Ok(sent.message_id),
            other => Err(AttemptError::fatal(
                other.description.unwrap_or_else(|| "sendMessage returned no message".to_string()),
            )),
        }
    }
}

#[async_trait]
impl OperatorChannel for TelegramClient {
    /// 长消息分段发送，返回最后一段的 message_id（运营最可能回复的那条）
    async fn notify_operator(&self, text: &str) -> Result<MessageRef, RelayError> {
        let mut last = None;
        for chunk in chunk_text(text, MAX_MESSAGE_CHARS) {
            let id = self.policy.run("telegram", || self.post_message(&chunk)).await?;
            last = Some(id);
        }
        last.map(MessageRef::from)
            .ok_or_else(|| RelayError::transport("telegram", "nothing was sent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_reply_becomes_operator_event() {
        let event = to_operator_event(
            update(serde_json::json!({
                "update_id": 1,
                "message": {
                    "message_id": 900,
                    "chat": {"id": -100123},
                    "text": "Hola Carla, te llamo en 5",
                    "reply_to_message": {
                        "message_id": 777,
                        "chat": {"id": -100123},
                        "text": "💬 Carla (+5491122334455):\nNecesito enfermería"
                    }
                }
            })),
            "-100123",
        )
        .unwrap();

        assert_eq!(event.text, "Hola Carla, te llamo en 5");
        assert_eq!(event.reply_to, Some(MessageRef::new("777")));
        assert!(event.quoted_text.unwrap().contains("(+5491122334455)"));
        assert_eq!(event.chat_id, "-100123");
    }

    #[test]
    fn test_foreign_chat_is_ignored() {
        let u = update(serde_json::json!({
            "update_id": 2,
            "message": {"message_id": 1, "chat": {"id": 42}, "text": "hola"}
        }));
        assert!(to_operator_event(u, "-100123").is_none());

        let empty = update(serde_json::json!({"update_id": 3}));
        assert!(to_operator_event(empty, "-100123").is_none());
    }

    #[test]
    fn test_client_url() {
        let section = TelegramSection {
            bot_token: Some("123:abc".into()),
            chat_id: Some("-100123".into()),
            ..TelegramSection::default()
        };
        let client = TelegramClient::from_config(&section, &DeliverySection::default()).unwrap();
        assert_eq!(client.url, "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(client.chat_id(), "-100123");
        assert!(TelegramClient::from_config(&TelegramSection::default(), &DeliverySection::default()).is_err());
    }
}
