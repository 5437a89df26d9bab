//! 记录型渠道（用于测试与本地演练，不发任何网络请求）

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::RelayError;
use crate::relay::{CustomerChannel, CustomerId, MessageRef, OperatorChannel};

/// 记录所有发给客户的消息
#[derive(Debug, Default)]
pub struct RecordingCustomerChannel {
    sent: Mutex<Vec<(CustomerId, String)>>,
    failing: AtomicBool,
}

impl RecordingCustomerChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的发送一律失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(CustomerId, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, customer: &CustomerId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == customer)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl CustomerChannel for RecordingCustomerChannel {
    async fn send_to_customer(&self, customer: &CustomerId, text: &str) -> Result<(), RelayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::transport("whatsapp", "recording channel set to fail"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((customer.clone(), text.to_string()));
        }
        Ok(())
    }
}

/// 记录所有发往运营群组的消息，message_id 从 1 递增
#[derive(Debug, Default)]
pub struct RecordingOperatorChannel {
    posted: Mutex<Vec<(MessageRef, String)>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl RecordingOperatorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<(MessageRef, String)> {
        self.posted.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.posted().into_iter().map(|(_, text)| text).collect()
    }

    /// 最后一条包含 `needle` 的消息引用
    pub fn last_ref_containing(&self, needle: &str) -> Option<MessageRef> {
        self.posted()
            .into_iter()
            .rev()
            .find(|(_, text)| text.contains(needle))
            .map(|(r, _)| r)
    }

    pub fn clear(&self) {
        if let Ok(mut posted) = self.posted.lock() {
            posted.clear();
        }
    }
}

#[async_trait]
impl OperatorChannel for RecordingOperatorChannel {
    async fn notify_operator(&self, text: &str) -> Result<MessageRef, RelayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::transport("telegram", "recording channel set to fail"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message_ref = MessageRef::from(id);
        if let Ok(mut posted) = self.posted.lock() {
            posted.push((message_ref.clone(), text.to_string()));
        }
        Ok(message_ref)
    }
}
