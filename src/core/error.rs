//! 中继错误类型
//!
//! 所有错误都可在本地恢复或上报给运营群组，没有任何一种会让进程退出。

use thiserror::Error;

/// 中继运行过程中可能出现的错误（发送失败、助手不可用、回复无法关联等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// 出站发送失败（已按策略重试后仍失败），记录日志后丢弃
    #[error("Transport failure on {channel}: {reason}")]
    Transport { channel: &'static str, reason: String },

    /// 助手返回失败或超时，由静态兜底回答替代
    #[error("Assistant unavailable: {0}")]
    AssistantUnavailable(String),

    /// 运营回复无法关联到任何客户，需回传使用提示
    #[error("Unresolved handoff: {0}")]
    UnresolvedHandoff(String),

    /// 入站事件缺少必要字段（无客户 ID 等），丢弃不改状态
    #[error("Malformed inbound: {0}")]
    MalformedInbound(String),

    #[error("Contact sink error: {0}")]
    Contact(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn transport(channel: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            channel,
            reason: reason.into(),
        }
    }

    /// 是否为出站发送失败（用于计数）
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
