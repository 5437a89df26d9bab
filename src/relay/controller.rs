//! 中继控制器
//!
//! 唯一有副作用的组件：对每个入站事件依次执行去重、取会话、状态机推进、
//! 执行动作、提交会话。同一客户的所有操作通过 lane 串行化。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::assistant::Assistant;
use super::channel::{CustomerChannel, CustomerEvent, OperatorChannel, OperatorEvent};
use super::clock::Clock;
use super::dedup::Deduplicator;
use super::fallback::fallback_answer;
use super::handoff::HandoffRegistry;
use super::lanes::CustomerLanes;
use super::machine::{Action, StateMachine};
use super::operator::{parse_command, parse_prefixed, parse_quoted_customer, OperatorCommand};
use super::session::{ConversationState, CustomerId, Session, SessionStore};
use crate::contacts::{ContactRecord, ContactSink};
use crate::core::RelayError;
use crate::observability::{RelayMetrics, ResolvePath};

/// 客户事件处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerOutcome {
    /// 重复投递被丢弃
    pub duplicate: bool,
    pub state: ConversationState,
    /// 成功执行的出站动作数
    pub delivered: usize,
    /// 执行失败的动作（已记录日志，不回滚状态）
    pub failures: Vec<RelayError>,
}

/// 运营事件处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorOutcome {
    Forwarded {
        customer: CustomerId,
        path: ResolvePath,
        delivered: bool,
    },
    Closed {
        customer: CustomerId,
    },
}

pub struct RelayController {
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) dedup: Deduplicator,
    pub(crate) machine: StateMachine,
    pub(crate) handoffs: Arc<HandoffRegistry>,
    pub(crate) lanes: CustomerLanes,
    pub(crate) customer: Arc<dyn CustomerChannel>,
    pub(crate) operator: Arc<dyn OperatorChannel>,
    pub(crate) assistant: Assistant,
    pub(crate) contacts: Arc<dyn ContactSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<RelayMetrics>,
}

/// 动作执行统计
#[derive(Default)]
struct Delivery {
    delivered: usize,
    failures: Vec<RelayError>,
}

impl Delivery {
    fn record(&mut self, metrics: &RelayMetrics, result: Result<(), RelayError>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                if e.is_transport() {
                    RelayMetrics::incr(&metrics.transport_failures);
                }
                tracing::warn!("Outbound action failed: {}", e);
                self.failures.push(e);
            }
        }
    }
}

impl RelayController {
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn handoffs(&self) -> &Arc<HandoffRegistry> {
        &self.handoffs
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 处理客户渠道入站消息
    #[tracing::instrument(level = "info", skip_all, fields(customer = %event.customer_id))]
    pub async fn handle_customer(
        &self,
        event: CustomerEvent,
    ) -> Result<CustomerOutcome, RelayError> {
        let customer = event.customer_id.clone();
        if customer.is_empty() {
            RelayMetrics::incr(&self.metrics.malformed);
            tracing::warn!("Discarding customer event without customer id");
            return Err(RelayError::MalformedInbound("missing customer id".to_string()));
        }
        RelayMetrics::incr(&self.metrics.inbound);

        let _lane = self.lanes.acquire(&customer).await;
        let now = self.clock.now();
        let current = self.sessions.get(&customer).await;

        if self.dedup.is_duplicate(&customer, &event.text, now) {
            RelayMetrics::incr(&self.metrics.duplicates);
            tracing::debug!("Duplicate delivery ignored");
            return Ok(CustomerOutcome {
                duplicate: true,
                state: current.map(|s| s.state).unwrap_or(ConversationState::New),
                delivered: 0,
                failures: Vec::new(),
            });
        }

        let current = current.unwrap_or_else(|| Session::new(customer.clone(), now));
        let step = self.machine.advance(&current, &event.text, now);

        let mut delivery = Delivery::default();
        for action in &step.actions {
            let result = self.execute(&step.session, action, now).await;
            delivery.record(&self.metrics, result);
        }

        tracing::info!(
            from = %current.state,
            to = %step.session.state,
            actions = step.actions.len(),
            failed = delivery.failures.len(),
            "Customer message processed"
        );

        let state = step.session.state;
        self.sessions.put(step.session).await;

        Ok(CustomerOutcome {
            duplicate: false,
            state,
            delivered: delivery.delivered,
            failures: delivery.failures,
        })
    }

    async fn execute(
        &self,
        session: &Session,
        action: &Action,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let customer = &session.customer_id;
        match action {
            Action::SendToCustomer(text) => self.customer.send_to_customer(customer, text).await,
            Action::NotifyOperator(text) => {
                let message_ref = self.operator.notify_operator(text).await?;
                self.handoffs.register(message_ref, customer.clone()).await;
                Ok(())
            }
            Action::RelayToOperator(text) => {
                let message_ref = self.operator.relay_to_operator(text).await?;
                self.handoffs.register(message_ref, customer.clone()).await;
                Ok(())
            }
            Action::AskAssistant(prompt) => {
                let answer = match self
                    .assistant
                    .generate_reply(prompt, self.assistant.context())
                    .await
                {
                    Ok(answer) => {
                        RelayMetrics::incr(&self.metrics.assistant_answers);
                        answer
                    }
                    Err(e) => {
                        RelayMetrics::incr(&self.metrics.assistant_fallbacks);
                        tracing::info!("Using static fallback answer: {}", e);
                        fallback_answer(&self.machine.catalog().business, prompt)
                    }
                };
                let text = format!("{}\n\n{}", answer, self.machine.catalog().assistant_footer());
                self.customer.send_to_customer(customer, &text).await
            }
            Action::RecordContact => {
                let record = ContactRecord {
                    customer_id: customer.clone(),
                    display_name: session.display_name.clone(),
                    last_message: session.last_inbound_text.clone(),
                    recorded_at: now,
                    source: "whatsapp",
                };
                let sink = Arc::clone(&self.contacts);
                tokio::spawn(async move {
                    if let Err(e) = sink.record_contact(&record).await {
                        tracing::warn!(customer = %record.customer_id, "Failed to record contact: {}", e);
                    }
                });
                Ok(())
            }
        }
    }

    /// 处理运营群组入站消息
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn handle_operator(
        &self,
        event: OperatorEvent,
    ) -> Result<OperatorOutcome, RelayError> {
        RelayMetrics::incr(&self.metrics.operator_events);
        let text = event.text.trim();
        if text.is_empty() {
            RelayMetrics::incr(&self.metrics.malformed);
            tracing::warn!("Discarding operator event without text");
            return Err(RelayError::MalformedInbound("operator event without text".to_string()));
        }

        if let Some(command) = parse_command(text) {
            return match command {
                OperatorCommand::Close(Some(customer)) => self.close_session(customer).await,
                OperatorCommand::Close(None) => {
                    self.operator_hint("❌ Uso: /cerrar <número>").await;
                    Err(RelayError::UnresolvedHandoff("/cerrar without number".to_string()))
                }
                OperatorCommand::Send(Some((customer, body))) => {
                    self.forward_to_customer(customer, &body, ResolvePath::Prefix).await
                }
                OperatorCommand::Send(None) => {
                    self.operator_hint("❌ Formato: /enviar <número> <mensaje>").await;
                    Err(RelayError::UnresolvedHandoff("malformed /enviar".to_string()))
                }
            };
        }

        if let Some(reply_to) = &event.reply_to {
            if let Some(customer) = self.handoffs.resolve(reply_to).await {
                return self.forward_to_customer(customer, text, ResolvePath::Reply).await;
            }
            if let Some(customer) = event.quoted_text.as_deref().and_then(parse_quoted_customer) {
                return self.forward_to_customer(customer, text, ResolvePath::QuotedText).await;
            }
        }

        if let Some((customer, body)) = parse_prefixed(text) {
            return self.forward_to_customer(customer, &body, ResolvePath::Prefix).await;
        }

        RelayMetrics::incr(&self.metrics.unresolved);
        tracing::warn!(reply_to = ?event.reply_to, "Operator message could not be matched to a customer");
        let usage = self.machine.catalog().operator_usage();
        self.operator_hint(&usage).await;
        Err(RelayError::UnresolvedHandoff(
            "no reply reference or customer prefix".to_string(),
        ))
    }

    /// 运营回复一律（重新）确认人工接管，并刷新计时
    async fn forward_to_customer(
        &self,
        customer: CustomerId,
        body: &str,
        path: ResolvePath,
    ) -> Result<OperatorOutcome, RelayError> {
        self.metrics.record_resolve(path);
        if path.is_degraded() {
            tracing::warn!(customer = %customer, path = path.as_str(), "Operator reply routed via degraded path");
        } else {
            tracing::info!(customer = %customer, path = path.as_str(), "Operator reply routed");
        }

        let _lane = self.lanes.acquire(&customer).await;
        let now = self.clock.now();

        let sent = self.customer.send_to_customer(&customer, body).await;

        let mut session = self
            .sessions
            .get(&customer)
            .await
            .unwrap_or_else(|| Session::new(customer.clone(), now));
        let ack_sent = match session.state {
            ConversationState::Human => session.human_ack_sent,
            _ => true,
        };
        session.enter_human(now, ack_sent);
        session.notified_operator = true;
        self.sessions.put(session).await;

        let delivered = match sent {
            Ok(()) => true,
            Err(e) => {
                RelayMetrics::incr(&self.metrics.transport_failures);
                tracing::warn!(customer = %customer, "Operator reply not delivered: {}", e);
                self.operator_hint(&format!("⚠️ No se pudo entregar el mensaje a +{}: {}", customer, e))
                    .await;
                false
            }
        };

        Ok(OperatorOutcome::Forwarded {
            customer,
            path,
            delivered,
        })
    }

    async fn close_session(&self, customer: CustomerId) -> Result<OperatorOutcome, RelayError> {
        let _lane = self.lanes.acquire(&customer).await;
        let removed = self.sessions.remove(&customer).await.is_some();
        let forgot = self.dedup.forget(&customer);
        tracing::info!(customer = %customer, removed, forgot, "Session closed by operator");
        self.operator_hint(&format!("✅ Sesión cerrada para {}", customer)).await;
        Ok(OperatorOutcome::Closed { customer })
    }

    /// 回传给运营群组的提示，不登记关联
    async fn operator_hint(&self, text: &str) {
        if let Err(e) = self.operator.notify_operator(text).await {
            RelayMetrics::incr(&self.metrics.transport_failures);
            tracing::warn!("Failed to send operator hint: {}", e);
        }
    }

    /// 清理过期去重基线与空闲 lane
    pub fn purge_stale(&self) -> (usize, usize) {
        let baselines = self.dedup.purge(self.clock.now());
        let lanes = self.lanes.prune_idle();
        if baselines + lanes > 0 {
            tracing::debug!(baselines, lanes, "Purged stale relay state");
        }
        (baselines, lanes)
    }
}
