/// Notification watcher - Main entry point
use notify_core::push::WsTransport;
use notify_core::{
    badge_label, Config, CookieJar, HttpSnapshotClient, Identity, NotificationSession, SessionDeps,
};
use std::env;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let user_id = config
        .user_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Configuration error: missing user id"))?;

    let credentials = Arc::new(CookieJar::new(config.cookie.clone().unwrap_or_default()));
    let deps = SessionDeps {
        snapshot: Arc::new(HttpSnapshotClient::new(&config, credentials.clone())),
        transport: Arc::new(WsTransport),
        credentials,
    };

    info!("🔔 Starting notification watcher");
    info!("   User: {} ({})", user_id, config.role);
    info!("   API: {}", config.api_base_url);
    info!("   Push: {}", config.push_url(&user_id));

    let session = NotificationSession::start(Identity::new(user_id, config.role), &config, deps).await;
    let mut view = session.handle().watch();

    let watch_task = tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let current = view.borrow_and_update().clone();
            info!(
                "Unread: {} (badge {}), {} notifications, {} unread messages",
                current.unread,
                badge_label(current.unread).unwrap_or_else(|| "-".to_string()),
                current.notifications.len(),
                current.conversation_total()
            );
            if let Some(notice) = &current.notice {
                warn!("{}", notice);
            }
        }
    });

    wait_for_shutdown().await;
    info!("Shutdown signal received, closing session...");

    let stats = session.shutdown().await;
    if let Err(e) = watch_task.await {
        error!("View watcher failed: {}", e);
    }
    if let Some(stats) = stats {
        info!(
            "Push connection: {} opens, {} reconnects, {} delivered, {} dropped",
            stats.open_attempts, stats.reconnects_scheduled, stats.frames_delivered, stats.frames_dropped
        );
    }

    info!("Watcher stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
