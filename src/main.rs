use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use berth::api;
use berth::config::Config;
use berth::gc::{self, GcOptions};
use berth::reaper::Reaper;
use berth::storage::driver::filesystem::FilesystemStorage;
use berth::utils::cli::{Cli, Command};
use berth::utils::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let config = cli.to_config();

    match cli.command {
        Some(Command::Gc {
            dry_run,
            delete,
            min_age,
        }) => {
            let options = GcOptions {
                // Deleting is opt-in; anything else reports only.
                dry_run: dry_run || !delete,
                min_age: Duration::from_secs(min_age),
            };
            if options.dry_run {
                tracing::info!("running in dry-run mode; pass --delete to reclaim space");
            }
            let storage = FilesystemStorage::new(&config.root_dir);
            let report = gc::run(&storage, &options)
                .await
                .context("garbage collection failed")?;
            println!("{report}");
            Ok(())
        }
        _ => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let reaper = Reaper::spawn(
        state.storage.clone(),
        config.cleanup_interval,
        config.upload_timeout,
    );

    let app = api::create_router(state).layer(TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down...");
}
