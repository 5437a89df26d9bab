//! 会话模型与会话存储
//!
//! 每个客户（CustomerId）至多一条 Session；不存在即视为 NEW。
//! 存储只提供读写整条记录的接口，单客户串行化由控制器的 lane 负责，
//! 因此后端既可以是进程内 HashMap，也可以换成外部 KV。

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 客户标识（WhatsApp wa_id，去掉前导 `+`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        Self(trimmed.trim_start_matches('+').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    New,
    AwaitingName,
    Menu,
    /// 人工接管：只转发，不自动回复
    Human,
    /// AI 助手模式
    Assistant,
}

impl ConversationState {
    pub const ALL: [ConversationState; 5] = [
        ConversationState::New,
        ConversationState::AwaitingName,
        ConversationState::Menu,
        ConversationState::Human,
        ConversationState::Assistant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AwaitingName => "awaiting_name",
            Self::Menu => "menu",
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个客户会话
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub customer_id: CustomerId,
    pub state: ConversationState,
    /// 客户姓名，采集前为空
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// 进入 HUMAN / ASSISTANT 的时间（HUMAN TTL 以此计算）
    pub mode_entered_at: Option<DateTime<Utc>>,
    pub last_inbound_text: String,
    /// 是否已在运营群组通报过该客户
    pub notified_operator: bool,
    /// 本次人工接管期间是否已发过确认回执
    pub human_ack_sent: bool,
}

impl Session {
    pub fn new(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            state: ConversationState::New,
            display_name: String::new(),
            created_at: now,
            last_activity_at: now,
            mode_entered_at: None,
            last_inbound_text: String::new(),
            notified_operator: false,
            human_ack_sent: false,
        }
    }

    /// 客户主动退出：丢弃姓名与历史，回到全新的 NEW
    pub fn reset(&self, now: DateTime<Utc>) -> Self {
        Self::new(self.customer_id.clone(), now)
    }

    pub fn has_name(&self) -> bool {
        !self.display_name.is_empty()
    }

    /// HUMAN 模式是否已超过 TTL（非 HUMAN 状态恒为 false）
    pub fn human_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.state != ConversationState::Human {
            return false;
        }
        match self.mode_entered_at {
            Some(entered) => now - entered >= ttl,
            None => true,
        }
    }

    /// 进入（或重新确认）人工接管；`ack_sent` 为 true 时本轮不再发确认回执
    pub fn enter_human(&mut self, now: DateTime<Utc>, ack_sent: bool) {
        self.state = ConversationState::Human;
        self.mode_entered_at = Some(now);
        self.human_ack_sent = ack_sent;
        self.last_activity_at = now;
    }

    pub fn enter_assistant(&mut self, now: DateTime<Utc>) {
        self.state = ConversationState::Assistant;
        self.mode_entered_at = Some(now);
        self.last_activity_at = now;
    }

    pub fn enter_menu(&mut self, now: DateTime<Utc>) {
        self.state = ConversationState::Menu;
        self.mode_entered_at = None;
        self.human_ack_sent = false;
        self.last_activity_at = now;
    }
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, customer: &CustomerId) -> Option<Session>;

    /// 写入（覆盖）整条会话
    async fn put(&self, session: Session);

    async fn remove(&self, customer: &CustomerId) -> Option<Session>;

    /// 全量快照（监控用，不阻塞客户 lane）
    async fn snapshot(&self) -> Vec<Session>;

    async fn active_count(&self) -> usize;

    /// 按状态统计会话数
    async fn count_by_state(&self) -> BTreeMap<ConversationState, usize> {
        let mut counts: BTreeMap<ConversationState, usize> =
            ConversationState::ALL.iter().map(|s| (*s, 0)).collect();
        for session in self.snapshot().await {
            *counts.entry(session.state).or_default() += 1;
        }
        counts
    }
}

/// 内存会话存储（进程重启即丢失）
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<CustomerId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, customer: &CustomerId) -> Option<Session> {
        self.sessions.read().await.get(customer).cloned()
    }

    async fn put(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.customer_id.clone(), session);
    }

    async fn remove(&self, customer: &CustomerId) -> Option<Session> {
        self.sessions.write().await.remove(customer)
    }

    async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
