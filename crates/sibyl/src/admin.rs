// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sibyl admin ...` and `sibyl ask` command implementations.
//!
//! Operator tooling over the same stack the server runs: rate-limit
//! resets, cache invalidation, session expiry, user mappings, audit
//! review, and a one-shot question runner for smoke-testing a deployment.

use std::str::FromStr;
use std::time::Duration;

use sibyl_config::SibylConfig;
use sibyl_core::types::{AuditCategory, Principal, Question};
use sibyl_core::SibylError;
use sibyl_orchestrator::progress_channel;
use sibyl_storage::queries::user_mappings;
use sibyl_storage::time::now_iso;
use sibyl_storage::UserMapping;
use tokio_util::sync::CancellationToken;

use crate::stack;

/// Operator identity attached to audited admin actions.
fn operator() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}

/// `sibyl ask <question>` -- run one question through the full pipeline,
/// printing progress and the final answer.
pub async fn run_ask(
    config: SibylConfig,
    principal: String,
    channel: String,
    text: String,
) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;

    let (tx, mut rx) = progress_channel(config.query.progress_buffer);
    let progress_printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            eprintln!("  .. {}", update.stage);
        }
    });

    let answer = stack
        .orchestrator
        .run(
            Question {
                principal: Principal(principal),
                channel_id: channel,
                text,
                thread_id: None,
            },
            tx,
            CancellationToken::new(),
        )
        .await;
    let _ = progress_printer.await;

    println!("status: {}", answer.status);
    if let Some(sql) = &answer.sql {
        println!("sql: {sql}");
    }
    match &answer.error_reason {
        Some(reason) => println!("reason: {reason}"),
        None => {
            println!(
                "rows: {} ({}ms{})",
                answer.rows.len(),
                answer.duration_ms,
                if answer.from_cache { ", cached" } else { "" }
            );
            println!("{}", answer.columns.join(" | "));
            for row in answer.rows.iter().take(20) {
                let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join(" | "));
            }
        }
    }
    Ok(())
}

/// `sibyl admin reset-rate-limit <principal>`
pub async fn run_reset_rate_limit(config: SibylConfig, principal: String) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    let removed = stack
        .orchestrator
        .reset_rate_limit(&Principal(principal.clone()), &operator())
        .await?;
    println!("cleared {removed} counter(s) for {principal}");
    Ok(())
}

/// `sibyl admin invalidate-cache <key> --reason <reason>`
pub async fn run_invalidate_cache(
    config: SibylConfig,
    key: String,
    reason: String,
) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    let existed = stack
        .orchestrator
        .invalidate_cache(&key, &reason, &operator())
        .await?;
    if existed {
        println!("invalidated {key}");
    } else {
        println!("no entry for {key}");
    }
    Ok(())
}

/// `sibyl admin expire-sessions --older-than-secs <n>`
pub async fn run_expire_sessions(config: SibylConfig, older_than_secs: u64) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    match stack
        .orchestrator
        .expire_sessions_older_than(Duration::from_secs(older_than_secs), &operator())
        .await?
    {
        Some(count) => println!("flagged {count} session(s) inactive"),
        None => println!("a sweep is already in flight; nothing done"),
    }
    Ok(())
}

/// `sibyl admin user-add ...` -- create or update a user mapping.
pub async fn run_user_add(
    config: SibylConfig,
    chat_user_id: String,
    principal: String,
    roles: Vec<String>,
    email: Option<String>,
    directory_id: Option<String>,
) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    let mapping = UserMapping {
        chat_user_id: chat_user_id.clone(),
        principal,
        directory_id,
        email,
        full_name: None,
        roles,
        capabilities: vec![],
        active: true,
        created_at: now_iso(),
        updated_at: now_iso(),
    };
    user_mappings::upsert_mapping(&stack.db, &mapping).await?;
    println!("mapping saved for {chat_user_id}");
    Ok(())
}

/// `sibyl admin user-show <chat-user-id>`
pub async fn run_user_show(config: SibylConfig, chat_user_id: String) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    match user_mappings::get_by_chat_user(&stack.db, &chat_user_id).await? {
        Some(mapping) => {
            println!("principal: {}", mapping.principal);
            println!("roles: {}", mapping.roles.join(", "));
            println!("active: {}", mapping.active);
            if let Some(email) = &mapping.email {
                println!("email: {email}");
            }
        }
        None => println!("no mapping for {chat_user_id}"),
    }
    Ok(())
}

/// `sibyl admin audit [--category <c>] [--limit <n>]`
pub async fn run_audit(
    config: SibylConfig,
    category: Option<String>,
    limit: i64,
) -> Result<(), SibylError> {
    let stack = stack::build(&config).await?;
    let category = match category {
        Some(name) => Some(AuditCategory::from_str(&name).map_err(|_| {
            SibylError::Config(format!("unknown audit category `{name}`"))
        })?),
        None => None,
    };
    let entries = stack.audit.recent(category, None, limit).await?;
    for e in entries {
        println!(
            "{} [{}/{}] {} principal={} {}",
            e.created_at,
            e.category,
            e.severity,
            e.event_type,
            e.principal,
            e.payload.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
