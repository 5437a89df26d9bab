//! 会话状态机
//!
//! 纯函数：给定当前会话、入站文本与当前时间，算出下一条会话记录和需要执行的动作。
//! 不做任何 I/O，对任意输入（包括空文本）都有定义。
//!
//! 状态流转：
//! - NEW → 问候 → AWAITING_NAME
//! - AWAITING_NAME → 采集姓名成功 → MENU（通报运营一次）；失败则重新询问
//! - MENU → 按选项表分发；转人工 → HUMAN；助手 → ASSISTANT
//! - HUMAN → 先检查 TTL；未过期只转发，至多一次确认回执；过期回 MENU
//! - ASSISTANT → 交给助手（控制器负责调用与兜底）
//!
//! 全局指令（非 HUMAN 状态下）：M / menu 回菜单，S / salir 重置会话。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::fallback::fallback_answer;
use super::menu::{Catalog, OptionAction};
use super::name::extract_name;
use super::session::{ConversationState, Session};

/// 状态机产出的动作，由控制器按顺序执行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendToCustomer(String),
    /// 向运营群组发通知（会登记 HandoffLink）
    NotifyOperator(String),
    /// 把客户消息转发到运营群组（会登记 HandoffLink）
    RelayToOperator(String),
    /// 交给 AI 助手回答该问题
    AskAssistant(String),
    /// 写入联系人登记
    RecordContact,
}

/// 一步推进的结果
#[derive(Debug, Clone)]
pub struct Step {
    pub session: Session,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobalCommand {
    Menu,
    Exit,
}

fn global_command(text: &str) -> Option<GlobalCommand> {
    match text.trim().to_lowercase().as_str() {
        "m" | "menu" | "menú" => Some(GlobalCommand::Menu),
        "s" | "salir" | "exit" => Some(GlobalCommand::Exit),
        _ => None,
    }
}

pub struct StateMachine {
    catalog: Arc<Catalog>,
    human_ttl: Duration,
}

impl StateMachine {
    pub fn new(catalog: Arc<Catalog>, human_ttl: Duration) -> Self {
        Self { catalog, human_ttl }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn human_ttl(&self) -> Duration {
        self.human_ttl
    }

    pub fn advance(&self, session: &Session, text: &str, now: DateTime<Utc>) -> Step {
        let mut next = session.clone();
        next.last_activity_at = now;
        next.last_inbound_text = text.to_string();

        let command = match session.state {
            ConversationState::Human => None,
            _ => global_command(text),
        };
        if let Some(command) = command {
            return match command {
                GlobalCommand::Menu => {
                    next.enter_menu(now);
                    let menu = self.catalog.menu(&next.display_name);
                    Step {
                        session: next,
                        actions: vec![Action::SendToCustomer(menu)],
                    }
                }
                GlobalCommand::Exit => self.exit(&next, now),
            };
        }

        match session.state {
            ConversationState::New => {
                next.state = ConversationState::AwaitingName;
                Step {
                    session: next,
                    actions: vec![Action::SendToCustomer(self.catalog.greeting())],
                }
            }
            ConversationState::AwaitingName => self.awaiting_name(next, text, now),
            ConversationState::Menu => self.menu_choice(next, text, now),
            ConversationState::Human => self.human(next, text, now),
            ConversationState::Assistant => self.assistant(next, text),
        }
    }

    fn exit(&self, session: &Session, now: DateTime<Utc>) -> Step {
        Step {
            session: session.reset(now),
            actions: vec![Action::SendToCustomer(self.catalog.farewell())],
        }
    }

    fn awaiting_name(&self, mut next: Session, text: &str, now: DateTime<Utc>) -> Step {
        let Some(name) = extract_name(text) else {
            return Step {
                session: next,
                actions: vec![Action::SendToCustomer(self.catalog.reask_name())],
            };
        };

        if !next.has_name() {
            next.display_name = name;
        }
        next.enter_menu(now);

        let mut actions = vec![Action::SendToCustomer(
            self.catalog.menu(&next.display_name),
        )];
        if !next.notified_operator {
            actions.push(Action::NotifyOperator(self.catalog.new_contact_notice(
                &next.display_name,
                next.customer_id.as_str(),
            )));
            next.notified_operator = true;
        }
        actions.push(Action::RecordContact);

        Step {
            session: next,
            actions,
        }
    }

    fn menu_choice(&self, mut next: Session, text: &str, now: DateTime<Utc>) -> Step {
        let Some(option) = self.catalog.find(text) else {
            return Step {
                session: next,
                actions: vec![Action::SendToCustomer(self.catalog.help())],
            };
        };

        match &option.action {
            OptionAction::Reply(content) => Step {
                session: next,
                actions: vec![Action::SendToCustomer(content.clone())],
            },
            OptionAction::Handoff => {
                next.enter_human(now, false);
                next.notified_operator = true;
                let notice = self
                    .catalog
                    .handoff_notice(&next.display_name, next.customer_id.as_str());
                Step {
                    session: next,
                    actions: vec![
                        Action::SendToCustomer(self.catalog.handoff_confirmation()),
                        Action::NotifyOperator(notice),
                    ],
                }
            }
            OptionAction::Assistant => {
                next.enter_assistant(now);
                Step {
                    session: next,
                    actions: vec![Action::SendToCustomer(self.catalog.assistant_onboarding())],
                }
            }
            OptionAction::Exit => self.exit(&next, now),
        }
    }

    fn human(&self, mut next: Session, text: &str, now: DateTime<Utc>) -> Step {
        // TTL 检查优先于其他任何逻辑
        if next.human_expired(self.human_ttl, now) {
            next.enter_menu(now);
            let menu = self.catalog.menu(&next.display_name);
            return Step {
                session: next,
                actions: vec![
                    Action::SendToCustomer(self.catalog.human_expired()),
                    Action::SendToCustomer(menu),
                ],
            };
        }

        let body = if text.trim().is_empty() {
            "[mensaje sin texto]"
        } else {
            text
        };
        let mut actions = vec![Action::RelayToOperator(self.catalog.relay_line(
            &next.display_name,
            next.customer_id.as_str(),
            body,
        ))];

        if !next.human_ack_sent {
            actions.push(Action::SendToCustomer(self.catalog.human_ack()));
            next.human_ack_sent = true;
        }

        Step {
            session: next,
            actions,
        }
    }

    fn assistant(&self, next: Session, text: &str) -> Step {
        let action = if text.trim().is_empty() {
            Action::SendToCustomer(format!(
                "{}\n\n{}",
                fallback_answer(&self.catalog.business, text),
                self.catalog.assistant_footer()
            ))
        } else {
            Action::AskAssistant(text.trim().to_string())
        };
        Step {
            session: next,
            actions: vec![action],
        }
    }
}
