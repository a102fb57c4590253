// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sibyl - the session, rate-limiting, caching, and orchestration core of
//! a chat-platform data-question assistant.
//!
//! This is the binary entry point.

mod admin;
mod serve;
mod stack;

use clap::{Parser, Subcommand};
use sibyl_config::SibylConfig;
use tracing_subscriber::EnvFilter;

/// Sibyl - a data-question assistant core.
#[derive(Parser, Debug)]
#[command(name = "sibyl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Sibyl service (background housekeeping + shared state).
    Serve,
    /// Run one question through the pipeline and print the answer.
    Ask {
        /// Question text.
        text: String,
        /// Principal to run as.
        #[arg(long, default_value = "operator")]
        principal: String,
        /// Channel id for the session.
        #[arg(long, default_value = "cli")]
        channel: String,
    },
    /// Operator tooling (every action is audited).
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand, Debug)]
enum AdminCommands {
    /// Clear a principal's rate-limit counters.
    ResetRateLimit { principal: String },
    /// Invalidate a cache entry by key.
    InvalidateCache {
        key: String,
        #[arg(long, default_value = "operator invalidation")]
        reason: String,
    },
    /// Flag sessions idle longer than the given age as inactive.
    ExpireSessions {
        #[arg(long)]
        older_than_secs: u64,
    },
    /// Create or update a chat-user -> principal mapping.
    UserAdd {
        chat_user_id: String,
        principal: String,
        #[arg(long, value_delimiter = ',', default_value = "analyst")]
        roles: Vec<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        directory_id: Option<String>,
    },
    /// Show a user mapping.
    UserShow { chat_user_id: String },
    /// Print recent audit entries.
    Audit {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sibyl={level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config: SibylConfig = match sibyl_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            sibyl_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Ask {
            text,
            principal,
            channel,
        }) => admin::run_ask(config, principal, channel, text).await,
        Some(Commands::Admin(admin_command)) => match admin_command {
            AdminCommands::ResetRateLimit { principal } => {
                admin::run_reset_rate_limit(config, principal).await
            }
            AdminCommands::InvalidateCache { key, reason } => {
                admin::run_invalidate_cache(config, key, reason).await
            }
            AdminCommands::ExpireSessions { older_than_secs } => {
                admin::run_expire_sessions(config, older_than_secs).await
            }
            AdminCommands::UserAdd {
                chat_user_id,
                principal,
                roles,
                email,
                directory_id,
            } => {
                admin::run_user_add(config, chat_user_id, principal, roles, email, directory_id)
                    .await
            }
            AdminCommands::UserShow { chat_user_id } => {
                admin::run_user_show(config, chat_user_id).await
            }
            AdminCommands::Audit { category, limit } => {
                admin::run_audit(config, category, limit).await
            }
        },
        None => {
            println!("sibyl: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("sibyl: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_and_admin_commands() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["sibyl", "admin", "reset-rate-limit", "u1"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Admin(AdminCommands::ResetRateLimit { .. }))
        ));

        let cli = Cli::parse_from([
            "sibyl",
            "ask",
            "what was revenue last month",
            "--principal",
            "jane",
        ]);
        match cli.command {
            Some(Commands::Ask { principal, .. }) => assert_eq!(principal, "jane"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = sibyl_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.agent.name, "sibyl");
    }
}
