//! HTTP 服务：WhatsApp / Telegram Webhook、健康检查与计数器
//!
//! 两个渠道都要求 Webhook 尽快返回 200，否则判失败并重试。
//! 这里解析后立即返回，中继处理在后台任务中执行。

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::integrations::telegram::{to_operator_event, Update};
use crate::integrations::whatsapp::{extract_events, WebhookPayload, WebhookVerifyQuery};
use crate::observability::MetricsSnapshot;
use crate::relay::RelayController;

/// 服务状态
pub struct AppState {
    pub controller: Arc<RelayController>,
    /// Meta Webhook 校验 token
    pub verify_token: String,
    /// 运营群组 chat_id，其他来源的 Update 一律忽略
    pub operator_chat: String,
}

#[derive(Debug, Serialize)]
struct Health {
    service: &'static str,
    version: &'static str,
    ok: bool,
}

#[derive(Debug, Serialize)]
struct MetricsReport {
    counters: MetricsSnapshot,
    sessions: BTreeMap<&'static str, usize>,
    active_sessions: usize,
    handoff_links: usize,
    assistant_tokens: u64,
}

/// 创建路由
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/metrics", get(metrics))
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .route("/telegram", post(telegram_receive))
        .with_state(state)
}

/// GET / - 健康检查
async fn health() -> Json<Health> {
    Json(Health {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        ok: true,
    })
}

/// GET /metrics - 计数器与各状态会话数
async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsReport> {
    let controller = &state.controller;
    let by_state = controller.sessions().count_by_state().await;
    Json(MetricsReport {
        counters: controller.metrics().snapshot(),
        active_sessions: by_state.values().sum(),
        sessions: by_state.into_iter().map(|(s, n)| (s.as_str(), n)).collect(),
        handoff_links: controller.handoffs().len().await,
        assistant_tokens: controller.assistant().token_usage().2,
    })
}

/// GET /webhook - Meta 验证 Webhook
async fn webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookVerifyQuery>,
) -> Result<String, StatusCode> {
    match query.verify(&state.verify_token) {
        Some(challenge) => {
            tracing::info!("WhatsApp webhook verified");
            Ok(challenge)
        }
        None => {
            tracing::warn!("WhatsApp webhook verification rejected");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// POST /webhook - 接收 WhatsApp 消息
async fn webhook_receive(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let events = extract_events(payload, state.controller.now());
    if events.is_empty() {
        return StatusCode::OK;
    }
    tracing::debug!("WhatsApp webhook: {} message(s)", events.len());

    // 同一请求内的消息按顺序处理
    let controller = Arc::clone(&state.controller);
    let span = tracing::info_span!("whatsapp_webhook", request_id = %Uuid::new_v4());
    tokio::spawn(
        async move {
            for event in events {
                if let Err(e) = controller.handle_customer(event).await {
                    tracing::warn!("Customer event dropped: {}", e);
                }
            }
        }
        .instrument(span),
    );
    StatusCode::OK
}

/// POST /telegram - 接收运营群组 Update
async fn telegram_receive(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Update>,
) -> StatusCode {
    let Some(event) = to_operator_event(update, &state.operator_chat) else {
        return StatusCode::OK;
    };

    let controller = Arc::clone(&state.controller);
    let span = tracing::info_span!("telegram_webhook", request_id = %Uuid::new_v4());
    tokio::spawn(
        async move {
            match controller.handle_operator(event).await {
                Ok(outcome) => tracing::debug!(?outcome, "Operator event handled"),
                Err(e) => tracing::info!("Operator event not forwarded: {}", e),
            }
        }
        .instrument(span),
    );
    StatusCode::OK
}
