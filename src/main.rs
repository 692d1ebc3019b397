use chama_donations::api::{build_router, AppDependencies, AppState};
use chama_donations::config::{AppConfig, GatewayKind};
use chama_donations::database::memory::{MemoryDonationStore, MemoryReceiptStore};
use chama_donations::database::repository::{DonationStore, ReceiptStore};
use chama_donations::database::{
    donation_repository::DonationRepository, init_pool_from_config,
    receipt_repository::ReceiptRepository, run_migrations,
};
use chama_donations::logging::{init_tracing, secret_prefix};
use chama_donations::payments::factory::GatewayFactory;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting Chama Church donations service"
    );

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration loaded"
    );

    // Donation and receipt stores
    let (store, receipts): (Arc<dyn DonationStore>, Arc<dyn ReceiptStore>) =
        if config.skip_externals {
            info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory store");
            (
                Arc::new(MemoryDonationStore::new()),
                Arc::new(MemoryReceiptStore::new()),
            )
        } else {
            info!("📊 Initializing database connection pool...");
            let pool = init_pool_from_config(&config.database).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Database connection pool initialized"
            );

            info!("🗄️  Running database migrations...");
            run_migrations(&pool).await?;
            info!("✅ Migrations applied");

            (
                Arc::new(DonationRepository::new(pool.clone())),
                Arc::new(ReceiptRepository::new(pool)),
            )
        };

    // Payment gateway
    info!("💳 Initializing payment gateway...");
    let factory = GatewayFactory::new(config.gateway.clone());
    info!(
        available = ?factory.list_available_gateways(),
        selected = ?config.gateway.kind,
        "Gateway backends configured"
    );
    let gateway = factory
        .get_default_gateway()
        .map_err(|e| {
            error!("Failed to initialize payment gateway: {}", e);
            e
        })?;
    let access_token = match config.gateway.kind {
        GatewayKind::MercadoPago => config.gateway.mp_access_token.as_deref(),
        GatewayKind::PagBank => config.gateway.pagbank_token.as_deref(),
    };
    info!(
        gateway = gateway.name(),
        access_token = %secret_prefix(access_token),
        webhook_secret_configured = config.gateway.mp_webhook_secret.is_some(),
        "✅ Payment gateway ready"
    );

    if config.admin.api_token.is_none() {
        warn!("ADMIN_API_TOKEN not set, admin routes will refuse every request");
    }
    if config.receipts.public_base_url.is_none() {
        warn!("RECEIPTS_PUBLIC_BASE_URL not set, receipt links will fail");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        poll_interval_secs = config.reconciliation.poll_interval.as_secs(),
        max_watch_secs = config.reconciliation.max_watch.map(|d| d.as_secs()),
        auto_start = config.reconciliation.auto_start,
        "🔄 PIX reconciliation configured"
    );

    let state = AppState::new(AppDependencies {
        gateway,
        store,
        receipts,
        reconciliation: config.reconciliation.clone(),
        admin: config.admin.clone(),
        receipts_base_url: config.receipts.public_base_url.clone(),
        shutdown_rx,
    })?;
    let poller = state.poller.clone();

    info!("🛣️  Setting up application routes...");
    let app = build_router(state, &config.server.cors_allowed_origins);
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), poller.stop_all())
        .await
        .is_err()
    {
        error!("Timed out waiting for status watches to stop");
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
