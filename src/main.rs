use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use browser_automation::api::{routes::create_router, state::AppState};
use browser_automation::config::Config;
use browser_automation::controller::SessionController;
use browser_automation::host::CdpHostProvider;
use browser_automation::models::Viewport;
use browser_automation::store::{AutomationStore, SqliteAutomationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let store: Arc<dyn AutomationStore> = Arc::new(match &config.db_path {
        Some(path) => SqliteAutomationStore::open(path),
        None => SqliteAutomationStore::open_default(),
    }
    .context("Failed to open automation store")?);

    let hosts = Arc::new(CdpHostProvider::new(config.headless, Viewport::default()));
    let controller = Arc::new(SessionController::new(store, config.engine.clone()));
    let state = Arc::new(AppState::new(controller, hosts.clone()));

    // Build router
    let app = create_router(state);

    // Start server
    let ip = config.host.parse().context("Invalid HOST")?;
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Automation engine starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    hosts.close().await;
    Ok(())
}
