// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sibyl serve` command implementation.
//!
//! Builds the full stack, starts the background housekeeping tasks (cache
//! sweeper, session reaper), and parks until a shutdown signal. Inbound
//! questions arrive through the chat-platform adapter, which calls into
//! the orchestrator; this process owns the shared state that adapter
//! instances coordinate through.

use std::time::Duration;

use sibyl_config::SibylConfig;
use sibyl_core::SibylError;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::stack;

/// Run the `sibyl serve` command until interrupted.
pub async fn run_serve(config: SibylConfig) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;

    let cancel = CancellationToken::new();

    let sweeper = tokio::spawn(sibyl_cache::run_sweeper(
        stack.cache.clone(),
        Duration::from_secs(config.cache.sweep_interval_secs),
        cancel.clone(),
    ));
    let reaper = tokio::spawn(sibyl_session::run_reaper(
        stack.sessions.clone(),
        Duration::from_secs(config.session.reap_interval_secs),
        cancel.clone(),
    ));

    info!(
        agent = %config.agent.name,
        db = %config.storage.database_path,
        "sibyl serving; press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await.map_err(|e| {
        SibylError::Internal(format!("failed to listen for shutdown signal: {e}"))
    })?;
    info!("shutdown signal received, stopping background tasks");
    cancel.cancel();

    let _ = sweeper.await;
    let _ = reaper.await;

    // Drop every component holding the database so the single writer can
    // checkpoint and close cleanly.
    let stack::Stack {
        db,
        orchestrator,
        cache,
        sessions,
        audit,
    } = stack;
    drop(orchestrator);
    drop(cache);
    drop(sessions);
    drop(audit);
    match std::sync::Arc::try_unwrap(db) {
        Ok(db) => db.close().await?,
        Err(_) => info!("storage handles still held; skipping WAL checkpoint"),
    }

    info!("sibyl stopped");
    Ok(())
}
