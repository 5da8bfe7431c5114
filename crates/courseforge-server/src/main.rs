//! # Courseforge Server
//!
//! Main binary. `serve` (the default) runs in a single process:
//! - REST API (HTTP)
//! - Email dispatcher (background loop queuing scheduled program sends)
//!
//! The other subcommands are operator tools that share the same config.

use chrono::Utc;
use clap::{Parser, Subcommand};
use courseforge_api::{build_router, AppState};
use courseforge_db::Database;
use courseforge_jobs::{
    email_dispatch::{EmailDispatcher, PgProgramStore},
    video::{process_batch, recover_interrupted, HttpRenderer, PgVideoJobStore},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "courseforge", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the API server and background jobs (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Render a video batch in the foreground
    ProcessBatch {
        job_id: Uuid,
    },
    /// Show how a plain-English schedule is interpreted
    Schedule {
        text: String,
        #[arg(long, default_value = "UTC")]
        tz: String,
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..=100))]
        count: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = courseforge_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courseforge=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let db = Database::connect(config).await?;
            db.migrate().await?;
            Ok(())
        }
        Command::ProcessBatch { job_id } => {
            let db = Database::connect(config).await?;
            let renderer = HttpRenderer::from_config(&config.video)?;
            let summary = process_batch(&PgVideoJobStore::new(db), &renderer, job_id).await?;
            println!(
                "{}: {:?} ({} attempted, {} complete, {} failed)",
                summary.job_id, summary.status, summary.attempted, summary.completed, summary.failed
            );
            Ok(())
        }
        Command::Schedule { text, tz, count } => {
            let preview = courseforge_common::schedule::preview(&text, &tz, Utc::now(), usize::from(count))?;
            println!("{} ({})", preview.description, preview.cron);
            for run in preview.next_runs {
                println!("  {}", run.to_rfc3339());
            }
            Ok(())
        }
    }
}

async fn serve(config: &'static courseforge_common::config::AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Courseforge v{}", env!("CARGO_PKG_VERSION"));

    // Connect to database
    let db = Database::connect(config).await?;

    // Run migrations
    db.migrate().await?;

    // Batches a previous process was rendering when it stopped can be re-run
    let reclaimed = recover_interrupted(&PgVideoJobStore::new(db.clone())).await?;
    if reclaimed > 0 {
        tracing::warn!(reclaimed, "Marked interrupted video batches as failed");
    }

    // === Shutdown broadcast ===
    // Background loops subscribe; the HTTP server drains on the same signal.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // === Email dispatcher ===
    let dispatcher = EmailDispatcher::new(
        PgProgramStore::new(db.clone()),
        Duration::from_secs(config.email.dispatch_interval_secs),
    );
    let dispatcher_rx = shutdown_tx.subscribe();
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run(dispatcher_rx).await });

    // === REST API Server ===
    let renderer = HttpRenderer::from_config(&config.video)?;
    let api_router = build_router(AppState::new(db, renderer));
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    tracing::info!("REST API listening on http://{api_addr}");

    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    axum::serve(listener, api_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = dispatcher_handle.await {
        tracing::error!(error = %e, "Email dispatcher task panicked");
    }

    tracing::info!("Courseforge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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
