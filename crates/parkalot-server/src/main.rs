mod api;
mod bounded;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parkalot_core::AppConfig;
use parkalot_db::{LocationStore, PgStore, PoolConfig};
use parkalot_inference::{ImageLocator, ImageMode, LocateError};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    scheduler::{Heartbeat, RefreshPipeline},
};

#[derive(Debug, Parser)]
#[command(name = "parkalot-server")]
#[command(about = "Parking availability service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduled jobs and the HTTP API (default)
    Serve,
    /// Run one refresh cycle and print its report
    Refresh,
    /// Advance `last_updated` on every lot once
    Heartbeat,
    /// Show which image a lot resolves to
    Locate { lot_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Arc::new(parkalot_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Refresh => refresh_once(&config).await,
        Commands::Heartbeat => heartbeat_once(&config).await,
        Commands::Locate { lot_id } => locate(&config, &lot_id).await,
    }
}

async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let store = connect_store(&config).await?;
    let store_timeout = Duration::from_secs(config.store_timeout_secs);

    let adapter = parkalot_inference::adapter_from_config(&config)?;
    let refresh = Arc::new(RefreshPipeline::from_config(
        Arc::clone(&store),
        adapter,
        &config,
    ));
    report_image_dir(refresh.locator()).await;
    let heartbeat = Arc::new(Heartbeat::new(Arc::clone(&store), store_timeout));

    let _scheduler = scheduler::build_scheduler(refresh, heartbeat, &config).await?;

    let app = build_app(AppState {
        store,
        store_timeout,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn refresh_once(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let adapter = parkalot_inference::adapter_from_config(config)?;
    let pipeline = RefreshPipeline::from_config(store, adapter, config);
    report_image_dir(pipeline.locator()).await;

    let report = pipeline.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(e) = report.fetch_error {
        anyhow::bail!("refresh could not load parking lots: {e}");
    }
    Ok(())
}

async fn heartbeat_once(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let touched = Heartbeat::new(store, Duration::from_secs(config.store_timeout_secs))
        .touch()
        .await?;
    println!("touched {touched} parking lots");
    Ok(())
}

async fn locate(config: &AppConfig, lot_id: &str) -> anyhow::Result<()> {
    let locator = ImageLocator::from_config(config);
    match locator.locate(lot_id).await {
        Ok(image) => {
            println!("{}", image.name());
            Ok(())
        }
        Err(err) => {
            if let LocateError::NotFound { tried, .. } = &err {
                for path in tried {
                    eprintln!("  tried {}", path.display());
                }
            }
            Err(err.into())
        }
    }
}

/// Connect, migrate, and hand back the shared store.
async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LocationStore>> {
    let store = PgStore::new(
        config.database_url.clone(),
        PoolConfig::from_app_config(config),
        Duration::from_secs(config.db_probe_interval_secs),
    );
    let pool = store.pool().await?;
    parkalot_db::run_migrations(&pool).await?;
    Ok(Arc::new(store))
}

/// Log whether the fixture directory is present. Never creates it.
async fn report_image_dir(locator: &ImageLocator) {
    if locator.mode() != ImageMode::Fixture {
        return;
    }
    let dir = locator.dir();
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {
            tracing::info!(dir = %dir.display(), "using fixture images");
        }
        _ => {
            tracing::warn!(
                dir = %dir.display(),
                "fixture image directory does not exist; every lot will be skipped"
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
