//! Venue Session Engine Binary
//!
//! Connects the pricing (and optionally trading) FIX sessions and serves
//! health and metrics until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin venue-session-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required (per session role, `PRICING` and optionally `TRADING`)
//! - `VENUE_<ROLE>_HOST`, `VENUE_<ROLE>_PORT`: Venue address
//! - `VENUE_<ROLE>_SENDER_COMP_ID`, `VENUE_<ROLE>_TARGET_COMP_ID`: Session identity
//!
//! ## Optional
//! - `VENUE_<ROLE>_TLS`: Wrap the socket in TLS (default: true)
//! - `VENUE_<ROLE>_TLS_CA_FILE` / `_TLS_CERT_FILE` / `_TLS_KEY_FILE` / `_TLS_SERVER_NAME`
//! - `VENUE_<ROLE>_HEARTBEAT_INTERVAL_SECS`: HeartBtInt (default: 30)
//! - `VENUE_<ROLE>_RESET_ON_LOGON`: Reset sequence numbers on logon (default: false)
//! - `VENUE_<ROLE>_SEQUENCE_FILE`: Outbound sequence file (default: data/<role>.seq)
//! - `VENUE_<ROLE>_MESSAGE_LOG`: Raw message log path (default: disabled)
//! - `VENUE_<ROLE>_RECONNECT_DELAY_SECS`: Reconnect delay (default: 5)
//! - `VENUE_USERNAME`, `VENUE_PASSWORD`: Logon credentials
//! - `VENUE_LIQUIDITY_PROVIDER`: PartyID for NDF quote requests
//! - `VENUE_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use venue_session_engine::application::services::DEFAULT_REQUEST_TTL;
use venue_session_engine::infrastructure::fix::InboundHandler;
use venue_session_engine::infrastructure::telemetry;
use venue_session_engine::{
    CorrelationRegistry, EngineConfig, ExecutionCallbacks, ExecutionReportHandler,
    FileSequenceStore, HealthServer, HealthServerState, InMemoryPriceStore, InboundDispatcher,
    PriceEntry, PriceFanout, RequestBuilder, SessionController, SessionSettings, VenueGateway, init_metrics,
};

/// Bound on logging out of every session at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often expired correlation entries are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting venue session engine");

    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = EngineConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Inbound side: registry, price fanout, execution reports
    let registry = Arc::new(CorrelationRegistry::new());
    let price_store = Arc::new(InMemoryPriceStore::new());
    let prices = Arc::new(PriceFanout::new(
        price_store,
        Arc::clone(&registry),
        Some(Arc::new(|entry: &PriceEntry| {
            tracing::debug!(
                symbol = %entry.symbol,
                side = ?entry.side,
                settlement = %entry.settlement,
                rate = %entry.rate,
                "Price update"
            );
        })),
    ));
    let executions = Arc::new(ExecutionReportHandler::new(ExecutionCallbacks::default()));
    let dispatcher: Arc<dyn InboundHandler> = Arc::new(InboundDispatcher::new(
        Arc::clone(&registry),
        executions,
        prices,
    ));

    // Sessions
    let pricing = open_session(&config.pricing, &dispatcher, &shutdown_token).await?;
    let trading = match &config.trading {
        Some(settings) => open_session(settings, &dispatcher, &shutdown_token).await?,
        None => Arc::clone(&pricing),
    };

    let gateway = Arc::new(VenueGateway::new(
        pricing,
        trading,
        RequestBuilder::new(config.liquidity_provider.clone()),
        Arc::clone(&registry),
    ));

    // Correlation purge
    tokio::spawn(Arc::clone(&registry).run_purge(
        DEFAULT_REQUEST_TTL,
        PURGE_INTERVAL,
        shutdown_token.clone(),
    ));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&gateway) as _,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Logon
    match &config.credentials {
        Some(credentials) => {
            if let Err(e) = gateway
                .logon(&credentials.username, &credentials.password)
                .await
            {
                tracing::warn!(error = %e, "Initial logon failed, retrying in background");
            }
        }
        None => tracing::warn!("No venue credentials configured, sessions left idle"),
    }

    tracing::info!("Venue session engine ready");

    await_shutdown().await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, gateway.logout()).await {
        Ok(Ok(())) => tracing::info!("Logged out of every session"),
        Ok(Err(e)) => tracing::info!(error = %e, "Logout skipped"),
        Err(_) => {
            tracing::warn!("Logout timed out, disconnecting");
            gateway.disconnect().await;
        }
    }
    shutdown_token.cancel();

    tracing::info!("Venue session engine stopped");
    Ok(())
}

/// Build one session with its file-backed sequence store.
async fn open_session(
    settings: &SessionSettings,
    handler: &Arc<dyn InboundHandler>,
    shutdown: &CancellationToken,
) -> anyhow::Result<Arc<SessionController>> {
    if let Some(parent) = settings.sequence_file.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let store = Arc::new(FileSequenceStore::new(settings.sequence_file.clone()));
    SessionController::new(
        settings.session_config(),
        store,
        Arc::clone(handler),
        shutdown.child_token(),
    )
    .await
    .with_context(|| format!("creating {} session", settings.role.as_str()))
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    for settings in std::iter::once(&config.pricing).chain(config.trading.as_ref()) {
        tracing::info!(
            session = settings.role.as_str(),
            host = %settings.host,
            port = settings.port,
            sender = %settings.sender_comp_id,
            target = %settings.target_comp_id,
            tls = ?settings.tls,
            heartbeat_secs = settings.heartbeat_interval.as_secs(),
            sequence_file = %settings.sequence_file.display(),
            "Session configured"
        );
    }
    tracing::info!(
        shared_trading_session = config.trading.is_none(),
        credentials = config.credentials.is_some(),
        liquidity_provider = ?config.liquidity_provider,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
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
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
