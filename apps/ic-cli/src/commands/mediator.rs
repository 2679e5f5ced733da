// mediator.rs — Serve a mediator on stdio for one session.
//
// Container mode and external MCP clients use this entry point; logs stay
// on stderr because stdout is the JSON-RPC channel.

use std::time::Duration;

use chrono::Utc;

use ic_downstream::DownstreamConfig;
use ic_mediator::{serve_stdio, Mediator, MediatorConfig};
use ic_policy::{AnnotationsFile, CompiledPolicy};
use ic_session::{boot_settings, HomePaths, SessionPaths};

pub async fn execute(session_id: &str) -> anyhow::Result<()> {
    let settings = boot_settings()?;
    let home = HomePaths::new(&settings.home);
    let paths = SessionPaths::for_session(&settings.home, session_id)?;
    paths.create_all()?;

    let annotations = if home.annotations().exists() {
        AnnotationsFile::load(home.annotations())?
    } else {
        AnnotationsFile {
            generated_at: Utc::now(),
            servers: Default::default(),
        }
    };
    let policy = if home.compiled_policy().exists() {
        CompiledPolicy::load(home.compiled_policy())?
    } else {
        CompiledPolicy {
            generated_at: Utc::now(),
            constitution_hash: String::new(),
            input_hash: String::new(),
            rules: Vec::new(),
        }
    };
    let downstream = if home.server_config().exists() {
        DownstreamConfig::load(home.server_config())?
    } else {
        DownstreamConfig::default()
    };

    let mut config = MediatorConfig::for_session(session_id, &paths.root);
    config.escalation_timeout = Duration::from_secs(settings.user.escalation_timeout_seconds);
    config.protected_paths = vec![home.ca_dir(), home.config()];

    let (mediator, start_errors) =
        Mediator::start(config, annotations, policy, downstream, None).await?;
    for (server, error) in &start_errors {
        tracing::warn!(server = %server, error = %error, "downstream server unavailable");
    }

    tracing::info!(session = session_id, "mediator serving on stdio");
    serve_stdio(mediator).await?;
    Ok(())
}
