//! 中继核心：会话状态机、人工接管、去重与运营回复关联
//!
//! - **session**: 客户标识、会话与会话存储
//! - **machine**: 纯状态机（输入会话与文本，输出新会话与动作）
//! - **controller**: 执行动作、串行化同一客户的处理
//! - **handoff**: 运营消息 → 客户 的关联登记
//! - **dedup**: 重复投递抑制

pub mod assistant;
pub mod channel;
pub mod clock;
pub mod controller;
pub mod dedup;
pub mod fallback;
pub mod handoff;
pub mod lanes;
pub mod machine;
pub mod menu;
pub mod name;
pub mod operator;
pub mod session;

pub use assistant::Assistant;
pub use channel::{CustomerChannel, CustomerEvent, OperatorChannel, OperatorEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{CustomerOutcome, OperatorOutcome, RelayController};
pub use dedup::Deduplicator;
pub use handoff::{HandoffRegistry, MessageRef};
pub use lanes::CustomerLanes;
pub use machine::{Action, StateMachine, Step};
pub use menu::{Catalog, MenuOption, OptionAction};
pub use session::{ConversationState, CustomerId, MemorySessionStore, Session, SessionStore};
