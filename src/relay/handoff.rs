//! 运营回复关联表
//!
//! 运营群组里每条由中继发出的消息（通知 / 转发）都登记 message_ref → 客户。
//! 运营对某条消息点"回复"时据此找到客户。条目不过期，只有同一 ref
//! 被重新登记时才改指向；每客户的上限只约束 `latest_for` 用的近期队列。

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::session::CustomerId;

/// 运营渠道中的消息引用（Telegram message_id）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(String);

impl MessageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MessageRef {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Default)]
struct Links {
    by_ref: HashMap<MessageRef, CustomerId>,
    /// 每个客户最近的链接，按登记先后排列（队尾最新）
    by_customer: HashMap<CustomerId, VecDeque<MessageRef>>,
}

pub struct HandoffRegistry {
    links: RwLock<Links>,
    max_links_per_customer: usize,
}

impl HandoffRegistry {
    pub fn new(max_links_per_customer: usize) -> Self {
        Self {
            links: RwLock::new(Links::default()),
            max_links_per_customer: max_links_per_customer.max(1),
        }
    }

    /// 登记一条链接；同一 ref 重复登记时以最新客户为准
    pub async fn register(&self, message_ref: MessageRef, customer: CustomerId) {
        let mut links = self.links.write().await;

        if let Some(previous) = links.by_ref.insert(message_ref.clone(), customer.clone()) {
            if previous != customer {
                if let Some(refs) = links.by_customer.get_mut(&previous) {
                    refs.retain(|r| r != &message_ref);
                }
            }
        }

        let refs = links.by_customer.entry(customer).or_default();
        refs.retain(|r| r != &message_ref);
        refs.push_back(message_ref);

        while refs.len() > self.max_links_per_customer {
            refs.pop_front();
        }
    }

    pub async fn resolve(&self, message_ref: &MessageRef) -> Option<CustomerId> {
        self.links.read().await.by_ref.get(message_ref).cloned()
    }

    /// 该客户最近一次登记的引用
    pub async fn latest_for(&self, customer: &CustomerId) -> Option<MessageRef> {
        self.links
            .read()
            .await
            .by_customer
            .get(customer)
            .and_then(|refs| refs.back().cloned())
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.by_ref.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for HandoffRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}
