//! 中继端到端流程测试（记录型渠道 + 手动时钟）

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use reky::config::AppConfig;
use reky::core::RelayBuilder;
use reky::integrations::{RecordingCustomerChannel, RecordingOperatorChannel};
use reky::llm::{FailingLlmClient, LlmClient, MockLlmClient};
use reky::observability::ResolvePath;
use reky::relay::{
    Clock, ConversationState, CustomerEvent, CustomerId, ManualClock, MessageRef, OperatorEvent,
    OperatorOutcome, RelayController,
};
use reky::RelayError;

struct Fixture {
    relay: Arc<RelayController>,
    clock: Arc<ManualClock>,
    customer: Arc<RecordingCustomerChannel>,
    operator: Arc<RecordingOperatorChannel>,
}

fn fixture_with(llm: Option<Arc<dyn LlmClient>>) -> Fixture {
    let mut config = AppConfig::default();
    config.relay.human_ttl_secs = 1;

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let customer = Arc::new(RecordingCustomerChannel::new());
    let operator = Arc::new(RecordingOperatorChannel::new());

    let mut builder = RelayBuilder::new(config)
        .with_clock(clock.clone())
        .with_customer_channel(customer.clone())
        .with_operator_channel(operator.clone());
    if let Some(llm) = llm {
        builder = builder.with_llm_client(llm);
    }

    Fixture {
        relay: Arc::new(builder.build().unwrap()),
        clock,
        customer,
        operator,
    }
}

fn fixture() -> Fixture {
    fixture_with(None)
}

impl Fixture {
    async fn say(&self, from: &str, text: &str) -> ConversationState {
        let event = CustomerEvent::new(from, text, self.clock.now());
        self.relay.handle_customer(event).await.unwrap().state
    }

    async fn state_of(&self, from: &str) -> Option<ConversationState> {
        self.relay
            .sessions()
            .get(&CustomerId::new(from))
            .await
            .map(|s| s.state)
    }

    /// 让客户走到 MENU（问候 + 报名字）
    async fn onboard(&self, from: &str, name: &str) {
        self.say(from, "Hola").await;
        let state = self.say(from, &format!("Soy {}", name)).await;
        assert_eq!(state, ConversationState::Menu);
    }
}

const CARLA: &str = "5491122334455";

#[tokio::test]
async fn test_full_handoff_scenario() {
    let f = fixture();
    let carla = CustomerId::new(CARLA);

    // Hola → 问候，等待姓名
    assert_eq!(f.say(CARLA, "Hola").await, ConversationState::AwaitingName);
    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("nombre"));
    assert!(f.operator.posted().is_empty());

    // Soy Carla → 菜单带名字，通知运营一次
    assert_eq!(f.say(CARLA, "Soy Carla").await, ConversationState::Menu);
    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("Carla"));
    assert_eq!(f.operator.posted().len(), 1);

    // 6 → 转人工确认，再通知运营一次
    assert_eq!(f.say(CARLA, "6").await, ConversationState::Human);
    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), 3);
    assert!(sent[2].contains("representante"));
    let posted = f.operator.posted();
    assert_eq!(posted.len(), 2);
    let (handoff_ref, handoff_text) = posted[1].clone();
    assert!(handoff_text.contains(CARLA));

    // 运营回复通知消息 → 客户收到原文，仍为 HUMAN，计时刷新
    f.clock.advance(Duration::milliseconds(800));
    let outcome = f
        .relay
        .handle_operator(OperatorEvent::reply("Ya te contactamos", handoff_ref))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        OperatorOutcome::Forwarded {
            customer: carla.clone(),
            path: ResolvePath::Reply,
            delivered: true,
        }
    );
    assert_eq!(f.customer.sent_to(&carla).last().unwrap(), "Ya te contactamos");
    let session = f.relay.sessions().get(&carla).await.unwrap();
    assert_eq!(session.state, ConversationState::Human);
    assert_eq!(session.mode_entered_at, Some(f.clock.now()));

    // 刷新后未过期：客户消息转给运营
    f.clock.advance(Duration::milliseconds(800));
    assert_eq!(f.say(CARLA, "¿A qué hora vienen?").await, ConversationState::Human);
    assert!(f.operator.texts().last().unwrap().contains("¿A qué hora vienen?"));

    // TTL 到期后 → 到期提示 + 菜单，回到 MENU
    f.clock.advance(Duration::seconds(2));
    let before = f.customer.sent_to(&carla).len();
    assert_eq!(f.say(CARLA, "Gracias").await, ConversationState::Menu);
    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), before + 2);
    assert!(sent[before].contains("inactividad"));
    assert!(sent[before + 1].contains("Elegí una opción"));
}

#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let f = fixture();
    f.say(CARLA, "Hola").await;
    f.say(CARLA, "Soy Carla").await;
    let sent = f.customer.sent().len();
    let posted = f.operator.posted().len();

    // 同一条消息被重投
    let outcome = f
        .relay
        .handle_customer(CustomerEvent::new(CARLA, "Soy Carla", f.clock.now()))
        .await
        .unwrap();
    assert!(outcome.duplicate);
    assert_eq!(outcome.state, ConversationState::Menu);
    assert_eq!(f.customer.sent().len(), sent);
    assert_eq!(f.operator.posted().len(), posted);
    assert_eq!(f.relay.metrics().snapshot().duplicates, 1);

    // 窗口过后同样的文本按新消息处理
    f.clock.advance(Duration::seconds(91));
    let outcome = f
        .relay
        .handle_customer(CustomerEvent::new(CARLA, "Soy Carla", f.clock.now()))
        .await
        .unwrap();
    assert!(!outcome.duplicate);
}

#[tokio::test]
async fn test_human_mode_acknowledges_once() {
    let f = fixture_with(None);
    f.onboard(CARLA, "Carla").await;
    f.say(CARLA, "6").await;
    let carla = CustomerId::new(CARLA);
    let before = f.customer.sent_to(&carla).len();

    f.say(CARLA, "Necesito una enfermera").await;
    f.say(CARLA, "Para mañana").await;
    f.say(CARLA, "En Palermo").await;

    let after = f.customer.sent_to(&carla);
    // 只有一条确认，没有菜单重发
    assert_eq!(after.len(), before + 1);
    assert!(!after[before].contains("Elegí una opción"));
    let relayed: Vec<String> = f
        .operator
        .texts()
        .into_iter()
        .filter(|t| t.starts_with("💬"))
        .collect();
    assert_eq!(relayed.len(), 3);
}

#[tokio::test]
async fn test_operator_reply_is_not_cross_wired() {
    let f = fixture();
    let ana = "5491100000001";
    let beto = "5491100000002";

    f.onboard(ana, "Ana").await;
    f.say(ana, "6").await;
    let ana_ref = f.operator.last_ref_containing(ana).unwrap();

    // 另一位客户在中间发消息并转人工
    f.onboard(beto, "Beto").await;
    f.say(beto, "6").await;
    f.say(beto, "Hola, soy Beto de nuevo").await;

    f.relay
        .handle_operator(OperatorEvent::reply("Hola Ana", ana_ref))
        .await
        .unwrap();

    assert_eq!(
        f.customer.sent_to(&CustomerId::new(ana)).last().unwrap(),
        "Hola Ana"
    );
    assert!(!f
        .customer
        .sent_to(&CustomerId::new(beto))
        .contains(&"Hola Ana".to_string()));
}

#[tokio::test]
async fn test_assistant_failure_falls_back() {
    let f = fixture_with(Some(Arc::new(FailingLlmClient)));
    f.onboard(CARLA, "Carla").await;
    assert_eq!(f.say(CARLA, "7").await, ConversationState::Assistant);

    let carla = CustomerId::new(CARLA);
    let before = f.customer.sent_to(&carla).len();
    assert_eq!(
        f.say(CARLA, "¿En qué zonas trabajan?").await,
        ConversationState::Assistant
    );

    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), before + 1);
    assert!(sent[before].contains("CABA y GBA"));
    assert!(sent[before].contains("menú"));
    assert_eq!(f.relay.metrics().snapshot().assistant_fallbacks, 1);
}

#[tokio::test]
async fn test_assistant_answer_is_sent_with_footer() {
    let f = fixture_with(Some(Arc::new(MockLlmClient)));
    f.onboard(CARLA, "Carla").await;
    f.say(CARLA, "7").await;

    f.say(CARLA, "¿Atienden obras sociales?").await;
    let last = f.customer.sent_to(&CustomerId::new(CARLA)).pop().unwrap();
    assert!(last.starts_with("Echo from Mock:"));
    assert!(last.ends_with("Escribí *M* para volver al menú o *S* para salir."));
    assert_eq!(f.relay.metrics().snapshot().assistant_answers, 1);
}

#[tokio::test]
async fn test_operator_takes_over_menu_session() {
    let f = fixture();
    f.onboard(CARLA, "Carla").await;

    let outcome = f
        .relay
        .handle_operator(OperatorEvent::text(format!("{} Hola Carla, ¿te ayudo?", CARLA)))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        OperatorOutcome::Forwarded { path: ResolvePath::Prefix, delivered: true, .. }
    ));
    assert_eq!(f.state_of(CARLA).await, Some(ConversationState::Human));
    assert_eq!(f.relay.metrics().snapshot().handoff_prefix, 1);

    // 运营主动接管：客户下一条消息直接转给运营，不再补发确认
    let carla = CustomerId::new(CARLA);
    let before = f.customer.sent_to(&carla).len();
    f.say(CARLA, "Sí, gracias").await;
    assert_eq!(f.customer.sent_to(&carla).len(), before);
    assert!(f.operator.texts().last().unwrap().contains("Sí, gracias"));
}

#[tokio::test]
async fn test_quoted_text_resolves_when_registry_misses() {
    let f = fixture();
    let event = OperatorEvent {
        text: "Te llamamos hoy".to_string(),
        reply_to: Some(MessageRef::new("999")),
        quoted_text: Some(format!("💬 Carla (+{}):\nNecesito turno", CARLA)),
        chat_id: "-100123".to_string(),
    };
    let outcome = f.relay.handle_operator(event).await.unwrap();
    assert!(matches!(
        outcome,
        OperatorOutcome::Forwarded { path: ResolvePath::QuotedText, .. }
    ));
    assert_eq!(
        f.customer.sent_to(&CustomerId::new(CARLA)),
        vec!["Te llamamos hoy".to_string()]
    );
}

#[tokio::test]
async fn test_unresolved_operator_message_gets_usage_hint() {
    let f = fixture();
    let result = f
        .relay
        .handle_operator(OperatorEvent::text("¿Alguien vio este caso?"))
        .await;
    assert!(matches!(result, Err(RelayError::UnresolvedHandoff(_))));
    assert!(f.customer.sent().is_empty());
    assert!(f.operator.texts()[0].contains("No pude identificar al cliente"));
    assert_eq!(f.relay.metrics().snapshot().unresolved, 1);
}

#[tokio::test]
async fn test_close_command_resets_session() {
    let f = fixture();
    f.onboard(CARLA, "Carla").await;

    let outcome = f
        .relay
        .handle_operator(OperatorEvent::text(format!("/cerrar +{}", CARLA)))
        .await
        .unwrap();
    assert_eq!(outcome, OperatorOutcome::Closed { customer: CustomerId::new(CARLA) });
    assert_eq!(f.state_of(CARLA).await, None);
    assert!(f.operator.texts().last().unwrap().contains("Sesión cerrada"));

    // 下一条消息从问候重新开始
    f.clock.advance(Duration::seconds(1));
    assert_eq!(f.say(CARLA, "Hola de nuevo").await, ConversationState::AwaitingName);
}

#[tokio::test]
async fn test_close_command_forgets_last_greeting() {
    let f = fixture();
    let carla = CustomerId::new(CARLA);
    f.say(CARLA, "Hola").await;

    f.relay
        .handle_operator(OperatorEvent::text(format!("/cerrar {}", CARLA)))
        .await
        .unwrap();

    // 关闭后窗口期内再发同样的问候也要重新接待
    f.clock.advance(Duration::seconds(20));
    let outcome = f
        .relay
        .handle_customer(CustomerEvent::new(CARLA, "Hola", f.clock.now()))
        .await
        .unwrap();
    assert!(!outcome.duplicate);
    assert_eq!(outcome.state, ConversationState::AwaitingName);
    let sent = f.customer.sent_to(&carla);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("nombre"));
}

#[tokio::test]
async fn test_reply_to_old_notice_after_many_relays() {
    let f = fixture();
    let carla = CustomerId::new(CARLA);
    f.onboard(CARLA, "Carla").await;
    f.say(CARLA, "6").await;
    let first_ref = f.operator.last_ref_containing(CARLA).unwrap();

    for i in 0..70 {
        assert_eq!(
            f.say(CARLA, &format!("Mensaje {}", i)).await,
            ConversationState::Human
        );
    }
    assert!(f.operator.posted().len() > 70);

    let outcome = f
        .relay
        .handle_operator(OperatorEvent::reply("Ya te contactamos", first_ref))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        OperatorOutcome::Forwarded {
            customer: carla.clone(),
            path: ResolvePath::Reply,
            delivered: true,
        }
    );
    assert_eq!(f.customer.sent_to(&carla).last().unwrap(), "Ya te contactamos");
}

#[tokio::test]
async fn test_failed_delivery_is_reported_to_operator() {
    let f = fixture();
    f.customer.set_failing(true);

    let outcome = f
        .relay
        .handle_operator(OperatorEvent::text(format!("/enviar {} Hola", CARLA)))
        .await
        .unwrap();
    assert!(matches!(outcome, OperatorOutcome::Forwarded { delivered: false, .. }));
    assert!(f.operator.texts().last().unwrap().contains("No se pudo entregar"));
    assert_eq!(f.relay.metrics().snapshot().transport_failures, 1);
}

#[tokio::test]
async fn test_failed_send_does_not_roll_back_state() {
    let f = fixture();
    f.customer.set_failing(true);

    let outcome = f
        .relay
        .handle_customer(CustomerEvent::new(CARLA, "Hola", f.clock.now()))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::AwaitingName);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].is_transport());
    assert_eq!(f.state_of(CARLA).await, Some(ConversationState::AwaitingName));
}

#[tokio::test]
async fn test_malformed_events_are_discarded() {
    let f = fixture();
    let result = f
        .relay
        .handle_customer(CustomerEvent::new("", "Hola", f.clock.now()))
        .await;
    assert!(matches!(result, Err(RelayError::MalformedInbound(_))));

    let result = f.relay.handle_operator(OperatorEvent::text("   ")).await;
    assert!(matches!(result, Err(RelayError::MalformedInbound(_))));

    assert!(f.customer.sent().is_empty());
    assert!(f.operator.posted().is_empty());
    assert_eq!(f.relay.metrics().snapshot().malformed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_customers_and_operator_replies() {
    let f = fixture();
    let ids: Vec<String> = (0..20).map(|i| format!("54911000{:05}", i)).collect();

    // 每个客户的消息串行，不同客户并发
    let tasks = ids.iter().cloned().map(|id| {
        let relay = Arc::clone(&f.relay);
        let clock = Arc::clone(&f.clock);
        tokio::spawn(async move {
            for text in ["Hola", "Soy Lucía", "6", "Necesito ayuda"] {
                relay
                    .handle_customer(CustomerEvent::new(id.as_str(), text, clock.now()))
                    .await
                    .unwrap();
            }
        })
    });
    for result in futures_util::future::join_all(tasks).await {
        result.unwrap();
    }

    for id in &ids {
        assert_eq!(f.state_of(id).await, Some(ConversationState::Human));
    }

    // 每位客户的最新关联都能回到本人
    let replies = ids.iter().cloned().map(|id| {
        let relay = Arc::clone(&f.relay);
        let handoffs = Arc::clone(relay.handoffs());
        async move {
            let latest = handoffs.latest_for(&CustomerId::new(&id)).await.unwrap();
            let outcome = relay
                .handle_operator(OperatorEvent::reply(format!("Respuesta para {}", id), latest))
                .await
                .unwrap();
            (id, outcome)
        }
    });
    for (id, outcome) in futures_util::future::join_all(replies).await {
        match outcome {
            OperatorOutcome::Forwarded { customer, path, .. } => {
                assert_eq!(customer.as_str(), id);
                assert_eq!(path, ResolvePath::Reply);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let last = f.customer.sent_to(&CustomerId::new(&id)).pop().unwrap();
        assert_eq!(last, format!("Respuesta para {}", id));
    }
    assert_eq!(f.relay.metrics().snapshot().handoff_reply, ids.len() as u64);
}
