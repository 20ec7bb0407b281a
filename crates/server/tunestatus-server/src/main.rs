use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tunestatus_core::IdentityStore;
use tunestatus_oauth2::AccountLinker;
use tunestatus_server::{
    AppState, Config, JsonFileIdentityStore, NowPlayingSync, SyncScheduler, router,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config);

    match &config.source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults and environment"),
    }

    if config.handshake.generated {
        warn!("No handshake secret configured; in-flight links will not survive a restart");
    }

    let store: Arc<dyn IdentityStore> = Arc::new(
        JsonFileIdentityStore::open(&config.storage.path)
            .await
            .context("Failed to open identity store")?,
    );

    let linker = AccountLinker::new(config.link_config(), Arc::clone(&store))
        .context("Failed to create account linker")?;

    let shutdown = CancellationToken::new();

    let scheduler = if config.sync.enabled {
        let job = NowPlayingSync::new(Arc::clone(&store), config.now_playing_config())
            .context("Failed to create status sync")?;
        Some(SyncScheduler::new(Arc::new(job), config.sync_interval()).spawn(shutdown.clone()))
    } else {
        info!("Status sync disabled");
        None
    };

    let app = router(
        AppState::new(linker, config.server.secure_cookies),
        config.server.static_dir.clone(),
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Tunestatus listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!(error = %e, "Status sync scheduler ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format.to_lowercase().as_str() {
        "json" => registry
            .with(fmt::layer().json().with_target(config.logging.target))
            .init(),
        "compact" => registry
            .with(fmt::layer().compact().with_target(config.logging.target))
            .init(),
        _ => registry
            .with(fmt::layer().pretty().with_target(config.logging.target))
            .init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
