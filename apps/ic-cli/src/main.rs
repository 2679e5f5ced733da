//! # ic-cli
//!
//! Command-line interface for IronCurtain.
//!
//! - `ironcurtain start [task]` — run a session (interactive or
//!   single-shot); `--agent <id>` selects container mode, `--resume <id>`
//!   reopens an existing session directory.
//! - `ironcurtain config` — initialize and show the user config.
//! - `ironcurtain escalation-listener` — dashboard over every live
//!   session's pending escalations.
//! - `ironcurtain mediator` — (hidden) serve a mediator on stdio.
//!
//! Exit codes: 0 success; 1 user error or unmet preflight; 2 unexpected
//! internal error.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ic_session::SessionError;

/// IronCurtain — policy-mediated tool access for LLM agents.
#[derive(Parser)]
#[command(name = "ironcurtain", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session: interactive without a task, single-shot with one.
    Start {
        /// The task to run single-shot. Omit for an interactive session.
        task: Option<String>,
        /// External agent id (claude, codex) — runs in container mode.
        #[arg(long)]
        agent: Option<String>,
        /// Reopen an existing session directory.
        #[arg(long)]
        resume: Option<String>,
    },
    /// Initialize and print the user configuration.
    Config,
    /// Watch every live session for pending escalations.
    EscalationListener,
    /// Serve a mediator on stdio (used by container mode and tests).
    #[command(hide = true)]
    Mediator {
        /// Session id to serve.
        #[arg(long)]
        session: String,
    },
}

fn main() -> ExitCode {
    // Logs go to stderr so they never interfere with JSON-RPC on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: failed to start runtime: {error}");
            return ExitCode::from(2);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Start { task, agent, resume } => {
                commands::start::execute(task.as_deref(), agent.as_deref(), resume).await
            }
            Commands::Config => commands::config::execute().await,
            Commands::EscalationListener => commands::listener::execute().await,
            Commands::Mediator { session } => commands::mediator::execute(&session).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(classify(&error))
        }
    }
}

/// 1 for user/configuration problems, 2 for everything unexpected.
fn classify(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(session) = cause.downcast_ref::<SessionError>() {
            return match session {
                SessionError::InvalidSessionId(_)
                | SessionError::UnknownSession(_)
                | SessionError::MalformedConfig { .. }
                | SessionError::SessionClosed(_) => 1,
                _ => 2,
            };
        }
        if cause.downcast_ref::<ic_escalation::EscalationError>().is_some() {
            return 1;
        }
    }
    2
}
