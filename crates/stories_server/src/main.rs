/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use std::sync::Arc;
use stories_core::storage_gc::start_story_reaper;
use stories_core::SocialDb;
use tokio::sync::watch;
use tracing::{info, warn};

mod api;
mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load_config().context("load config")?;
    let db = SocialDb::open(&cfg.db_path, cfg.story.clone())
        .with_context(|| format!("open db {}", cfg.db_path.display()))?;
    let db = Arc::new(db);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = start_story_reaper(cfg.storage.clone(), db.clone(), shutdown_rx);

    let bind = cfg.bind;
    let state = api::AppState {
        db,
        cfg: Arc::new(cfg),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!("stories_server listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        warn!("story reaper join failed: {e}");
    }
    info!("stories_server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl_c handler failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
