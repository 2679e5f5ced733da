// listener.rs — The escalation dashboard.
//
// One listener per machine (enforced by the lock file). It polls the
// shared session registry, watches every live session's escalation
// directory, prints new requests, and answers `y <id>` / `n <id>` lines
// from stdin. Everything it shows was redacted by the mediator before it
// hit disk.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use ic_escalation::{
    EscalationDir, EscalationWatcher, ListenerLock, ResolveStatus, SessionRegistry,
};
use ic_session::{boot_settings, HomePaths};

pub async fn execute() -> anyhow::Result<()> {
    let settings = boot_settings()?;
    let home = HomePaths::new(&settings.home);

    // Single instance only — two listeners would double-answer.
    let _lock = ListenerLock::acquire(home.listener_lock())?;
    let registry = SessionRegistry::new(home.pty_registry_dir());

    eprintln!("escalation listener running (approve: y <id>, deny: n <id>, quit: q)");

    let mut watchers: HashMap<String, EscalationWatcher> = HashMap::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let live = registry.list_live()?;
                // Pick up new sessions, drop dead ones.
                for registration in &live {
                    watchers.entry(registration.session_id.clone()).or_insert_with(|| {
                        eprintln!("watching session {} ({})", registration.session_id, registration.label);
                        EscalationWatcher::new(EscalationDir::new(&registration.escalation_dir))
                    });
                }
                watchers.retain(|id, _| live.iter().any(|r| &r.session_id == id));

                for (session_id, watcher) in &mut watchers {
                    for request in watcher.poll()? {
                        println!(
                            "[{session_id}] escalation {}\n  tool:   {}/{}\n  args:   {}\n  reason: {}",
                            request.escalation_id,
                            request.server_name,
                            request.tool_name,
                            request.arguments,
                            request.reason,
                        );
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "q" || line == "quit" {
                    break;
                }
                let mut parts = line.split_whitespace();
                let verdict = parts.next();
                let id = parts.next().and_then(|raw| Uuid::parse_str(raw).ok());
                let (Some(verdict @ ("y" | "n")), Some(id)) = (verdict, id) else {
                    eprintln!("usage: y <escalation-id> | n <escalation-id> | q");
                    continue;
                };
                resolve(&mut watchers, id, verdict == "y");
            }
        }
    }

    eprintln!("listener stopped");
    Ok(())
}

fn resolve(watchers: &mut HashMap<String, EscalationWatcher>, id: Uuid, approved: bool) {
    use ic_escalation::EscalationDecision;
    let decision = if approved {
        EscalationDecision::Approved
    } else {
        EscalationDecision::Denied
    };
    for watcher in watchers.values_mut() {
        match watcher.resolve(id, decision) {
            Ok(ResolveStatus::Delivered) => {
                println!("{} {}", if approved { "approved" } else { "denied" }, id);
                return;
            }
            Ok(ResolveStatus::Expired) => {
                println!("escalation {id} expired before the decision landed");
                return;
            }
            Err(_) => continue,
        }
    }
    eprintln!("no pending escalation {id}");
}
