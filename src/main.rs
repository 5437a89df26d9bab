//! Reky 中继服务
//!
//! 入口：加载配置、初始化日志、装配中继控制器，启动 Webhook 服务与后台清理任务。
//!
//! 配置：config/default.toml，环境变量 REKY__* 覆盖，例如
//! - REKY__WHATSAPP__ACCESS_TOKEN / REKY__WHATSAPP__PHONE_NUMBER_ID / REKY__WHATSAPP__VERIFY_TOKEN
//! - REKY__TELEGRAM__BOT_TOKEN / REKY__TELEGRAM__CHAT_ID
//! - REKY__ASSISTANT__API_KEY（未设置时只用静态兜底回答）
//!
//! 启动: cargo run

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use reky::config::load_config;
    use reky::core::{RelayBuilder, ShutdownManager};
    use reky::observability;
    use reky::server::{create_router, AppState};

    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let verify_token = config.whatsapp.verify_token.clone().unwrap_or_default();
    if verify_token.is_empty() {
        tracing::warn!("whatsapp.verify_token is not set, webhook verification will be rejected");
    }
    let operator_chat = config.telegram.chat_id.clone().unwrap_or_default();
    let addr = config.server.bind_addr();
    let purge_every = Duration::from_secs(config.server.purge_interval_secs.max(1));

    let controller = Arc::new(
        RelayBuilder::new(config)
            .build()
            .context("Failed to build relay")?,
    );

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    // 后台清理：过期去重基线与空闲 lane
    {
        let controller = Arc::clone(&controller);
        let token = shutdown.token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        controller.purge_stale();
                    }
                }
            }
            tracing::debug!("Purge task stopped");
        });
    }

    let app = create_router(Arc::new(AppState {
        controller,
        verify_token,
        operator_chat,
    }));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Reky relay listening on http://{}", addr);
    tracing::info!("WhatsApp webhook: /webhook, Telegram webhook: /telegram");

    let wait = Arc::clone(&shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { wait.wait_for_shutdown().await })
        .await?;

    tracing::info!("Reky relay stopped");
    Ok(())
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("请使用 --features server 编译: cargo run --features server");
    std::process::exit(1);
}
