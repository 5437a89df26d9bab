//! 核心层：错误类型、组件装配、优雅退出

pub mod builder;
pub mod error;
pub mod shutdown;

pub use builder::RelayBuilder;
pub use error::RelayError;
pub use shutdown::{ShutdownManager, ShutdownReason};
