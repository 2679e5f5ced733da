// runtime.rs — Container engine driver.
//
// Everything goes through the engine CLI (docker or podman, whichever is
// on PATH). No daemon API bindings: the CLI surface is stable across both
// engines for the small subset used here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::adapter::AgentAdapter;
use crate::error::ContainerError;

/// In-container loopback ports the agent is pointed at.
const EGRESS_BRIDGE_PORT: u16 = 18443;
const MEDIATOR_BRIDGE_PORT: u16 = 18790;

/// Where the session's sockets directory lands inside the container.
const SOCKETS_MOUNT: &str = "/ironcurtain/sockets";

/// The default agent image. Rebuilt only when this text changes.
pub const DEFAULT_DOCKERFILE: &str = "\
FROM node:22-bookworm-slim\n\
RUN apt-get update \\\n\
 && apt-get install -y --no-install-recommends socat ca-certificates python3 \\\n\
 && rm -rf /var/lib/apt/lists/*\n\
RUN npm install -g @anthropic-ai/claude-code @openai/codex\n\
WORKDIR /workspace\n";

/// The detected container engine.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    engine: PathBuf,
}

/// What to launch.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name (derived from the session id).
    pub name: String,
    /// Image tag to run.
    pub image: String,
    /// Host path of the session's sockets directory.
    pub sockets_dir: PathBuf,
    /// Extra environment (fake provider keys, model selection).
    pub env: HashMap<String, String>,
}

impl ContainerRuntime {
    /// Find docker or podman on PATH.
    pub fn detect() -> Result<Self, ContainerError> {
        for candidate in ["docker", "podman"] {
            if let Ok(engine) = which::which(candidate) {
                tracing::debug!(engine = %engine.display(), "container engine found");
                return Ok(Self { engine });
            }
        }
        Err(ContainerError::NoEngine)
    }

    /// Make sure the agent image exists, building it when the dockerfile
    /// content changed. Returns the tag to run.
    pub async fn ensure_image(&self, dockerfile: &str) -> Result<String, ContainerError> {
        let tag = image_tag(dockerfile);

        // An image with this tag embeds this exact dockerfile.
        let inspect = Command::new(&self.engine)
            .args(["image", "inspect", &tag])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if inspect.success() {
            return Ok(tag);
        }

        tracing::info!(%tag, "building agent image");
        let mut build = Command::new(&self.engine)
            .args([
                "build",
                "-t",
                &tag,
                "--label",
                &format!("io.ironcurtain.input-hash={}", content_hash(dockerfile)),
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(stdin) = build.stdin.as_mut() {
            stdin.write_all(dockerfile.as_bytes()).await?;
        }
        let output = build.wait_with_output().await?;
        if !output.status.success() {
            return Err(ContainerError::CommandFailed {
                command: format!("{} build -t {tag}", self.engine.display()),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(tag)
    }

    /// Launch the agent container and its socket bridges.
    pub async fn start(&self, spec: ContainerSpec) -> Result<ContainerSession, ContainerError> {
        self.run_checked(run_args(&spec)).await?;

        // Bridges: loopback TCP inside the container → mounted sockets.
        for (port, socket) in [
            (EGRESS_BRIDGE_PORT, "egress.sock"),
            (MEDIATOR_BRIDGE_PORT, "mediator.sock"),
        ] {
            self.run_checked(vec![
                "exec".to_string(),
                "-d".to_string(),
                spec.name.clone(),
                "socat".to_string(),
                format!("TCP-LISTEN:{port},fork,reuseaddr,bind=127.0.0.1"),
                format!("UNIX-CONNECT:{SOCKETS_MOUNT}/{socket}"),
            ])
            .await?;
        }

        Ok(ContainerSession {
            runtime: self.clone(),
            name: spec.name,
        })
    }

    async fn run_checked(&self, args: Vec<String>) -> Result<String, ContainerError> {
        let output = Command::new(&self.engine).args(&args).output().await?;
        if !output.status.success() {
            return Err(ContainerError::CommandFailed {
                command: format!("{} {}", self.engine.display(), args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A running agent container.
pub struct ContainerSession {
    runtime: ContainerRuntime,
    name: String,
}

impl ContainerSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver one turn as a single exec and parse the agent's answer.
    pub async fn send_turn(
        &self,
        adapter: AgentAdapter,
        prompt: &str,
    ) -> Result<String, ContainerError> {
        let mut args = vec!["exec".to_string(), self.name.clone()];
        args.extend(adapter.turn_command(prompt));
        let stdout = self.runtime.run_checked(args).await?;
        adapter.parse_output(&stdout)
    }

    /// Kill and remove the container. Idempotent.
    pub async fn teardown(&self) -> Result<(), ContainerError> {
        let _ = self
            .runtime
            .run_checked(vec!["rm".to_string(), "-f".to_string(), self.name.clone()])
            .await;
        Ok(())
    }
}

/// Deterministic image tag for one dockerfile.
fn image_tag(dockerfile: &str) -> String {
    format!("ironcurtain-agent:{}", &content_hash(dockerfile)[..12])
}

fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The `run` argv: detached, no network, sockets mount only.
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--network".to_string(),
        "none".to_string(),
        "-v".to_string(),
        format!("{}:{SOCKETS_MOUNT}", spec.sockets_dir.display()),
    ];
    // Route all HTTPS through the egress bridge and trust the CA that the
    // session layer dropped into the sockets directory.
    let mut env: Vec<(String, String)> = vec![
        (
            "HTTPS_PROXY".to_string(),
            format!("http://127.0.0.1:{EGRESS_BRIDGE_PORT}"),
        ),
        (
            "SSL_CERT_FILE".to_string(),
            format!("{SOCKETS_MOUNT}/ca-cert.pem"),
        ),
        (
            "NODE_EXTRA_CA_CERTS".to_string(),
            format!("{SOCKETS_MOUNT}/ca-cert.pem"),
        ),
        (
            "IRONCURTAIN_MEDIATOR_URL".to_string(),
            format!("http://127.0.0.1:{MEDIATOR_BRIDGE_PORT}"),
        ),
    ];
    env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args.push("sleep".to_string());
    args.push("infinity".to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "ironcurtain-s1".to_string(),
            image: "ironcurtain-agent:abc".to_string(),
            sockets_dir: PathBuf::from("/home/alice/.ironcurtain/sessions/s1/sockets"),
            env: HashMap::from([("ANTHROPIC_API_KEY".to_string(), "sk-ant-fake".to_string())]),
        }
    }

    #[test]
    fn image_tag_is_deterministic() {
        assert_eq!(image_tag(DEFAULT_DOCKERFILE), image_tag(DEFAULT_DOCKERFILE));
        assert_ne!(image_tag(DEFAULT_DOCKERFILE), image_tag("FROM scratch\n"));
    }

    #[test]
    fn run_args_isolate_the_network() {
        let args = run_args(&spec());
        let joined = args.join(" ");
        assert!(joined.contains("--network none"));
        assert!(joined.contains("sockets:/ironcurtain/sockets"));
        assert!(joined.ends_with("sleep infinity"));
    }

    #[test]
    fn run_args_mount_only_the_sockets_dir() {
        let args = run_args(&spec());
        let mounts: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-v")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(mounts.len(), 1);
        assert!(mounts[0].ends_with("/sockets:/ironcurtain/sockets"));
    }

    #[test]
    fn run_args_point_the_agent_at_the_proxy() {
        let joined = run_args(&spec()).join(" ");
        assert!(joined.contains("HTTPS_PROXY=http://127.0.0.1:18443"));
        assert!(joined.contains("SSL_CERT_FILE=/ironcurtain/sockets/ca-cert.pem"));
        assert!(joined.contains("ANTHROPIC_API_KEY=sk-ant-fake"));
    }
}
