//! 可观测性：日志初始化与中继计数器

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing（RUST_LOG 可覆盖，默认 info）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// 运营回复关联到客户所走的路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePath {
    /// 回复了登记过的消息（主路径）
    Reply,
    /// 登记表查不到，从被回复消息原文中解析号码（降级）
    QuotedText,
    /// 从运营自由文本的号码前缀解析（降级）
    Prefix,
}

impl ResolvePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::QuotedText => "quoted_text",
            Self::Prefix => "prefix",
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, Self::Reply)
    }
}

/// 中继计数器（累计值，原子更新，读取不加锁）
#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub inbound: AtomicU64,
    pub duplicates: AtomicU64,
    pub malformed: AtomicU64,
    pub operator_events: AtomicU64,
    pub handoff_reply: AtomicU64,
    pub handoff_quoted: AtomicU64,
    pub handoff_prefix: AtomicU64,
    pub unresolved: AtomicU64,
    pub transport_failures: AtomicU64,
    pub assistant_answers: AtomicU64,
    pub assistant_fallbacks: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub inbound: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub operator_events: u64,
    pub handoff_reply: u64,
    pub handoff_quoted: u64,
    pub handoff_prefix: u64,
    pub unresolved: u64,
    pub transport_failures: u64,
    pub assistant_answers: u64,
    pub assistant_fallbacks: u64,
}

impl RelayMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolve(&self, path: ResolvePath) {
        let counter = match path {
            ResolvePath::Reply => &self.handoff_reply,
            ResolvePath::QuotedText => &self.handoff_quoted,
            ResolvePath::Prefix => &self.handoff_prefix,
        };
        Self::incr(counter);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            inbound: load(&self.inbound),
            duplicates: load(&self.duplicates),
            malformed: load(&self.malformed),
            operator_events: load(&self.operator_events),
            handoff_reply: load(&self.handoff_reply),
            handoff_quoted: load(&self.handoff_quoted),
            handoff_prefix: load(&self.handoff_prefix),
            unresolved: load(&self.unresolved),
            transport_failures: load(&self.transport_failures),
            assistant_answers: load(&self.assistant_answers),
            assistant_fallbacks: load(&self.assistant_fallbacks),
        }
    }
}
