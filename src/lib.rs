//! Reky - WhatsApp 客服中继
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、组件装配、优雅退出
//! - **relay**: 会话状态机、人工接管、去重、运营回复关联
//! - **integrations**: WhatsApp Cloud API / Telegram Bot API 渠道
//! - **llm**: AI 助手后端抽象与实现（OpenAI 兼容 / Mock）
//! - **contacts**: 联系人登记
//! - **observability**: 日志初始化与计数器
//! - **server**: Webhook HTTP 服务（feature `server`）

pub mod config;
pub mod contacts;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod observability;
pub mod relay;
#[cfg(feature = "server")]
pub mod server;

pub use crate::core::{RelayBuilder, RelayError};
pub use relay::{CustomerEvent, OperatorEvent, RelayController};
