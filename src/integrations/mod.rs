//! 外部集成：WhatsApp Cloud API（客户渠道）与 Telegram Bot API（运营渠道）
//!
//! 出站调用共用 `DeliveryPolicy`：单次请求超时 + 指数退避的有限重试。

pub mod mock;
pub mod telegram;
pub mod whatsapp;

use std::future::Future;
use std::time::Duration;

use crate::config::DeliverySection;
use crate::core::RelayError;

pub use mock::{RecordingCustomerChannel, RecordingOperatorChannel};
pub use telegram::TelegramClient;
pub use whatsapp::WhatsappClient;

/// 单次尝试失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub reason: String,
    /// 网络错误、429、5xx 可重试；其余 4xx 直接放弃
    pub retryable: bool,
}

impl AttemptError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let reason = format!("HTTP {}: {}", status, body);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::retryable(reason)
        } else {
            Self::fatal(reason)
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        Self::retryable(e.to_string())
    }
}

/// 出站重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

impl From<&DeliverySection> for DeliveryPolicy {
    fn from(section: &DeliverySection) -> Self {
        Self {
            max_retries: section.max_retries,
            base_delay_ms: section.base_delay_ms,
            max_delay_ms: section.max_delay_ms,
        }
    }
}

impl DeliveryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// 执行 `op`，可重试的失败按退避间隔重来，直到成功或用完次数
    pub async fn run<T, F, Fut>(&self, channel: &'static str, mut op: F) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        channel,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Delivery attempt failed, retrying: {}",
                        e.reason
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(RelayError::transport(channel, e.reason)),
            }
        }
    }
}

/// 按字符切分长消息（渠道单条消息有长度上限）
pub fn chunk_text(body: &str, max_chars: usize) -> Vec<String> {
    if body.chars().count() <= max_chars {
        return vec![body.to_string()];
    }
    body.chars()
        .collect::<Vec<_>>()
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}
