// baton-server entry point
//
// Startup order: env config, tracing, store + migrations, content provider,
// sweeper task, stdio serve loop. SIGINT/SIGTERM drain the loop and close
// the store last. Exit code 0 on clean shutdown, 1 on startup failure.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use baton_core::FsContentProvider;
use baton_server::config::{ContentBackend, ServerConfig};
use baton_server::{rpc, AppState};
use baton_store::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "baton=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        content = %config.content_path.display(),
        "baton-server starting"
    );

    let provider = match config.backend {
        ContentBackend::Filesystem => {
            Arc::new(FsContentProvider::new(config.content_path.clone()))
        }
        ContentBackend::Database => {
            bail!("the database content backend is not available in this build; use BATON_BACKEND=filesystem")
        }
    };
    if config.seed_db {
        tracing::info!("BATON_SEED_DB set; filesystem backend reads definitions in place, nothing to seed");
    }

    let db = Database::open(&config.db_path)
        .await
        .context("Failed to open database")?;
    let applied = db.migrate().await.context("Failed to apply migrations")?;
    if applied > 0 {
        tracing::info!(applied, "applied pending migrations");
    }

    let state = AppState::new(db.clone(), provider);

    // Advisory timeout sweeper
    let sweeper = state.sweeper.clone();
    let interval = std::time::Duration::from_secs(config.sweep_interval_secs.max(1));
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match sweeper.run_once().await {
                Ok(swept) if !swept.is_empty() => {
                    tracing::info!(count = swept.len(), "sweeper timed out executions");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("sweeper pass failed: {}", e),
            }
        }
    });

    // Graceful shutdown on SIGINT/SIGTERM
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        tracing::warn!("failed to install SIGTERM handler: {}", e);
                        let _ = ctrl_c.await;
                        let _ = shutdown_tx.send(true);
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    rpc::serve(state, tokio::io::stdin(), tokio::io::stdout(), shutdown_rx)
        .await
        .context("Server error")?;

    // Store closes last
    sweep_task.abort();
    db.close().await;
    tracing::info!("baton-server stopped");

    Ok(())
}
