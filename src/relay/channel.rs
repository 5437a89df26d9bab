//! 渠道接口：客户渠道（WhatsApp）与运营渠道（Telegram）
//!
//! 核心只依赖这两个 trait；具体 HTTP 实现见 `integrations`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::handoff::MessageRef;
use super::session::CustomerId;
use crate::core::RelayError;

/// 客户渠道入站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerEvent {
    pub customer_id: CustomerId,
    /// 文本内容；非文本消息（图片、语音等）为空
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl CustomerEvent {
    pub fn new(
        customer_id: impl Into<CustomerId>,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            text: text.into(),
            received_at,
        }
    }
}

/// 运营渠道入站事件（已在上游过滤为授权群组）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorEvent {
    pub text: String,
    /// 运营"回复"的那条消息
    pub reply_to: Option<MessageRef>,
    /// 被回复消息的原文（登记表查不到时用于降级解析）
    pub quoted_text: Option<String>,
    pub chat_id: String,
}

impl OperatorEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn reply(text: impl Into<String>, reply_to: MessageRef) -> Self {
        Self {
            text: text.into(),
            reply_to: Some(reply_to),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait CustomerChannel: Send + Sync {
    async fn send_to_customer(&self, customer: &CustomerId, text: &str) -> Result<(), RelayError>;
}

#[async_trait]
pub trait OperatorChannel: Send + Sync {
    /// 发通知，返回运营渠道中的消息引用
    async fn notify_operator(&self, text: &str) -> Result<MessageRef, RelayError>;

    /// 转发客户消息，返回运营渠道中的消息引用
    async fn relay_to_operator(&self, text: &str) -> Result<MessageRef, RelayError> {
        self.notify_operator(text).await
    }
}
