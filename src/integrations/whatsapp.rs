//! WhatsApp Cloud API 集成
//!
//! 入站：Webhook 请求体解析为 `CustomerEvent`（非文本消息文本为空）。
//! 出站：`WhatsappClient` 实现 `CustomerChannel`，长消息按 4000 字符分段发送。

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{chunk_text, AttemptError, DeliveryPolicy};
use crate::config::{DeliverySection, WhatsappSection};
use crate::core::RelayError;
use crate::relay::{CustomerChannel, CustomerEvent, CustomerId};

/// WhatsApp 消息有长度限制 (4096 字符)
const MAX_MESSAGE_CHARS: usize = 4000;

/// Webhook 验证参数
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl WebhookVerifyQuery {
    /// 校验通过时返回 challenge
    pub fn verify(self, expected_token: &str) -> Option<String> {
        if self.mode.as_deref() == Some("subscribe")
            && !expected_token.is_empty()
            && self.verify_token.as_deref() == Some(expected_token)
        {
            Some(self.challenge.unwrap_or_default())
        } else {
            None
        }
    }
}

/// WhatsApp Webhook 请求体
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<String>,
    pub entry: Option<Vec<WebhookEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,
    pub changes: Option<Vec<WebhookChange>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    pub value: Option<WebhookValue>,
    pub field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookValue {
    pub messaging_product: Option<String>,
    pub messages: Option<Vec<WebhookMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: Option<String>,
    pub id: Option<String>,
    /// Unix 秒（字符串）
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let secs = raw?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// 从请求体中取出全部消息事件
///
/// 状态回执（delivered / read）没有 `messages`，直接跳过；缺少发送方的消息
/// 仍会产生一个空 customer_id 的事件，由控制器按格式错误丢弃并计数。
pub fn extract_events(payload: WebhookPayload, now: DateTime<Utc>) -> Vec<CustomerEvent> {
    if payload.object.as_deref() != Some("whatsapp_business_account") {
        return Vec::new();
    }

    let mut events = Vec::new();
    for entry in payload.entry.unwrap_or_default() {
        for change in entry.changes.unwrap_or_default() {
            let Some(value) = change.value else { continue };
            for msg in value.messages.unwrap_or_default() {
                let text = match msg.msg_type.as_deref() {
                    Some("text") => msg.text.map(|t| t.body).unwrap_or_default(),
                    _ => String::new(),
                };
                let received_at = parse_timestamp(msg.timestamp.as_deref()).unwrap_or(now);
                events.push(CustomerEvent::new(
                    CustomerId::new(msg.from.unwrap_or_default()),
                    text,
                    received_at,
                ));
            }
        }
    }
    events
}

/// WhatsApp 发送消息 API 请求体
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    msg_type: &'static str,
    text: SendMessageText<'a>,
}

#[derive(Debug, Serialize)]
struct SendMessageText<'a> {
    body: &'a str,
}

/// Cloud API 出站客户端
pub struct WhatsappClient {
    http: reqwest::Client,
    url: String,
    access_token: String,
    policy: DeliveryPolicy,
}

impl WhatsappClient {
    pub fn new(
        api_base: &str,
        phone_number_id: &str,
        access_token: impl Into<String>,
        delivery: &DeliverySection,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(delivery.timeout())
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/{}/messages", api_base.trim_end_matches('/'), phone_number_id),
            access_token: access_token.into(),
            policy: DeliveryPolicy::from(delivery),
        })
    }

    /// 从配置创建；缺少凭据时报配置错误
    pub fn from_config(section: &WhatsappSection, delivery: &DeliverySection) -> Result<Self, RelayError> {
        let token = section
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Config("whatsapp.access_token is not set".to_string()))?;
        let phone_id = section
            .phone_number_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Config("whatsapp.phone_number_id is not set".to_string()))?;
        Self::new(&section.api_base, phone_id, token, delivery)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_chunk(&self, to: &str, body: &str) -> Result<(), AttemptError> {
        let req = SendMessageRequest {
            messaging_product: "whatsapp",
            to,
            msg_type: "text",
            text: SendMessageText { body },
        };
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, &text));
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerChannel for WhatsappClient {
    async fn send_to_customer(&self, customer: &CustomerId, text: &str) -> Result<(), RelayError> {
        for chunk in chunk_text(text, MAX_MESSAGE_CHARS) {
            self.policy
                .run("whatsapp", || self.post_chunk(customer.as_str(), &chunk))
                .await?;
        }
        tracing::debug!(customer = %customer, "WhatsApp message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_extract_text_and_media_events() {
        let now = Utc::now();
        let events = extract_events(
            payload(serde_json::json!({
                "object": "whatsapp_business_account",
                "entry": [{
                    "id": "1",
                    "changes": [{
                        "field": "messages",
                        "value": {
                            "messaging_product": "whatsapp",
                            "messages": [
                                {"from": "5491122334455", "id": "wamid.1", "timestamp": "1700000000",
                                 "type": "text", "text": {"body": "Hola"}},
                                {"from": "5491122334455", "id": "wamid.2", "type": "image"}
                            ]
                        }
                    }]
                }]
            })),
            now,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].customer_id.as_str(), "5491122334455");
        assert_eq!(events[0].text, "Hola");
        assert_eq!(events[0].received_at.timestamp(), 1_700_000_000);
        assert_eq!(events[1].text, "");
        assert_eq!(events[1].received_at, now);
    }

    #[test]
    fn test_status_callbacks_and_foreign_objects_are_ignored() {
        let now = Utc::now();
        let statuses = payload(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"value": {"statuses": [{"id": "x"}]}}]}]
        }));
        assert!(extract_events(statuses, now).is_empty());

        let other = payload(serde_json::json!({"object": "page", "entry": []}));
        assert!(extract_events(other, now).is_empty());
    }

    #[test]
    fn test_verify_query() {
        let ok = WebhookVerifyQuery {
            mode: Some("subscribe".into()),
            verify_token: Some("secret".into()),
            challenge: Some("42".into()),
        };
        assert_eq!(ok.verify("secret"), Some("42".to_string()));

        let wrong = WebhookVerifyQuery {
            mode: Some("subscribe".into()),
            verify_token: Some("nope".into()),
            challenge: Some("42".into()),
        };
        assert_eq!(wrong.verify("secret"), None);
    }

    #[test]
    fn test_client_requires_credentials() {
        let section = WhatsappSection::default();
        assert!(WhatsappClient::from_config(&section, &DeliverySection::default()).is_err());

        let section = WhatsappSection {
            access_token: Some("t".into()),
            phone_number_id: Some("123".into()),
            ..WhatsappSection::default()
        };
        let client = WhatsappClient::from_config(&section, &DeliverySection::default()).unwrap();
        assert_eq!(client.url(), "https://graph.facebook.com/v18.0/123/messages");
    }
}
