// start.rs — Run a session, interactive or single-shot.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use ic_container::AgentAdapter;
use ic_session::{boot_settings, AgentChoice, SessionManager, StartOptions};

pub async fn execute(
    task: Option<&str>,
    agent: Option<&str>,
    resume: Option<String>,
) -> anyhow::Result<()> {
    let settings = boot_settings()?;
    let manager = SessionManager::new(settings);

    let agent_choice = match agent {
        None => AgentChoice::Builtin,
        Some(id) => {
            let adapter = AgentAdapter::from_id(id)
                .with_context(|| format!("unknown agent '{id}' (expected: claude, codex)"))?;
            AgentChoice::Container(adapter)
        }
    };

    let label = task.unwrap_or("interactive session").to_string();
    let mut session = manager
        .start(StartOptions {
            session_id: resume,
            label,
            agent: agent_choice,
            chat_api: None,
        })
        .await?;
    eprintln!("session {} ready", session.id());
    eprintln!(
        "escalations pause the agent until approved — run `ironcurtain escalation-listener` \
         in another terminal"
    );

    if let Some(task) = task {
        // Single-shot: one turn, print the reply, keep the directory.
        let reply = session.send_message(task).await?;
        println!("{reply}");
        session.close().await;
        return Ok(());
    }

    // Interactive: one turn per stdin line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match session.send_message(line).await {
            Ok(reply) => println!("{reply}"),
            Err(error) => eprintln!("error: {error}"),
        }
    }

    session.close().await;
    eprintln!("session {} closed", session.id());
    Ok(())
}
