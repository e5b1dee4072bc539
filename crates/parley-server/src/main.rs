use std::sync::Arc;

use parley_gateway::persist::{SAVE_INTERVAL, run_autosave};
use parley_gateway::push::{DisabledPush, PushTransport, WebhookPush};
use parley_gateway::sweeper::{SWEEP_INTERVAL, run_sweeper};
use parley_gateway::{Gateway, GatewayConfig, GatewayDeps};
use parley_server::{Config, build_router, shutdown_signal};
use parley_store::{Database, DiskMedia};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let media = Arc::new(DiskMedia::new(config.uploads_dir.clone()).await?);

    let push: Arc<dyn PushTransport> = match &config.push_relay_url {
        Some(url) => {
            info!("Push notifications via {}", url);
            Arc::new(WebhookPush::new(url.clone())?)
        }
        None => {
            warn!("PARLEY_PUSH_RELAY_URL not set, push notifications disabled");
            Arc::new(DisabledPush)
        }
    };
    if config.password.is_none() {
        warn!("PARLEY_PASSWORD not set, the chat is open to anyone who connects");
    }

    let gateway = Gateway::new(
        GatewayConfig {
            password: config.password.clone(),
            vapid_public_key: config.vapid_public_key.clone(),
            ..Default::default()
        },
        GatewayDeps {
            snapshots: Arc::new(db),
            media: media.clone(),
            push,
        },
    );

    let autosave = tokio::spawn(run_autosave(gateway.clone(), SAVE_INTERVAL));
    let sweeper = tokio::spawn(run_sweeper(gateway.clone(), SWEEP_INTERVAL));

    let app = build_router(gateway.clone(), media, &config.static_dir);

    let addr = config.addr()?;
    info!("Parley listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    autosave.abort();
    sweeper.abort();
    gateway.save_all().await;
    info!("State saved, bye");

    Ok(())
}
