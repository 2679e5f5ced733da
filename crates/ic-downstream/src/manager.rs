// manager.rs — Spawn, handshake, aggregate, relay.
//
// One rmcp client per configured server, spawned concurrently. The
// aggregated tool map is built once at startup: tool names unique across
// all servers pass through verbatim; names offered by more than one
// server are exposed as `<server>__<tool>` for every colliding server.

use std::collections::HashMap;

use rmcp::model::{CallToolRequestParams, CallToolResult, Tool};
use rmcp::service::{Peer, RoleClient, RunningService, ServiceError};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use tokio::process::Command;
use tokio::task::JoinSet;

use crate::config::DownstreamConfig;
use crate::error::DownstreamError;
use crate::roots::{RootSet, RootsHandler};

/// Servers that failed to start, keyed by name. Startup failures are
/// reported, not fatal to the healthy servers.
pub type StartErrors = HashMap<String, DownstreamError>;

/// One entry of the aggregated tool map.
#[derive(Debug, Clone)]
pub struct AggregatedTool {
    /// The name the mediator exposes.
    pub exposed_name: String,
    /// The server that owns the tool.
    pub server: String,
    /// The tool's original name on that server.
    pub tool_name: String,
    /// The tool definition, schema untouched.
    pub tool: Tool,
}

struct DownstreamServer {
    peer: Peer<RoleClient>,
    service: RunningService<RoleClient, RootsHandler>,
}

/// Owns every downstream connection for one session.
pub struct DownstreamManager {
    servers: HashMap<String, DownstreamServer>,
    tools: HashMap<String, AggregatedTool>,
    roots: RootSet,
}

impl DownstreamManager {
    /// Spawn every configured server concurrently and aggregate tools.
    pub async fn spawn_all(
        config: DownstreamConfig,
        roots: RootSet,
    ) -> (Self, StartErrors) {
        let mut join_set = JoinSet::new();

        for (name, launch) in config.servers {
            let roots = roots.clone();
            join_set.spawn(async move {
                let result = connect(&name, &launch.command, &launch.args, launch.env.as_ref(), roots).await;
                (name, result)
            });
        }

        let mut servers = HashMap::new();
        let mut tools_by_server: Vec<(String, Vec<Tool>)> = Vec::new();
        let mut errors = StartErrors::new();

        while let Some(joined) = join_set.join_next().await {
            let Ok((name, result)) = joined else {
                continue;
            };
            match result {
                Ok((server, tools)) => {
                    tracing::info!(server = %name, tools = tools.len(), "downstream server ready");
                    servers.insert(name.clone(), server);
                    tools_by_server.push((name, tools));
                }
                Err(error) => {
                    tracing::warn!(server = %name, error = %error, "downstream server failed to start");
                    errors.insert(name, error);
                }
            }
        }

        // Deterministic aggregation independent of join order.
        tools_by_server.sort_by(|a, b| a.0.cmp(&b.0));
        let tools = aggregate_tools(&tools_by_server);

        (
            Self {
                servers,
                tools,
                roots,
            },
            errors,
        )
    }

    /// The aggregated tool list, exposed names substituted in.
    pub fn tools(&self) -> Vec<Tool> {
        let mut entries: Vec<&AggregatedTool> = self.tools.values().collect();
        entries.sort_by(|a, b| a.exposed_name.cmp(&b.exposed_name));
        entries
            .into_iter()
            .map(|entry| {
                let mut tool = entry.tool.clone();
                tool.name = entry.exposed_name.clone().into();
                tool
            })
            .collect()
    }

    /// Resolve an exposed tool name to its owning server.
    pub fn resolve(&self, exposed_name: &str) -> Option<&AggregatedTool> {
        self.tools.get(exposed_name)
    }

    /// Relay a tools/call to the owning server, verbatim.
    pub async fn call(
        &self,
        exposed_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, DownstreamError> {
        let entry = self
            .tools
            .get(exposed_name)
            .ok_or_else(|| DownstreamError::UnknownTool(exposed_name.to_string()))?;
        let server = self
            .servers
            .get(&entry.server)
            .ok_or_else(|| DownstreamError::UnknownTool(exposed_name.to_string()))?;

        server
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: entry.tool_name.clone().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|error| DownstreamError::Call {
                server: entry.server.clone(),
                tool: entry.tool_name.clone(),
                message: extract_service_error(&error),
            })
    }

    /// Register an additional permitted root and tell every server.
    /// Returns false when the directory was already a root.
    pub async fn add_root(&self, dir: std::path::PathBuf) -> bool {
        if !self.roots.add(dir.clone()) {
            return false;
        }
        tracing::info!(root = %dir.display(), "root added");
        for (name, server) in &self.servers {
            if let Err(error) = server.peer.notify_roots_list_changed().await {
                tracing::warn!(server = %name, error = %error, "roots/list_changed notify failed");
            }
        }
        true
    }

    /// The current roots snapshot.
    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Names of the servers that are up.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cooperative shutdown: cancel every client, which closes stdin and
    /// reaps the subprocess.
    pub async fn shutdown(self) {
        for (name, server) in self.servers {
            if let Err(error) = server.service.cancel().await {
                tracing::warn!(server = %name, error = ?error, "downstream shutdown error");
            }
        }
    }
}

/// Spawn one server, handshake, and list its tools.
async fn connect(
    name: &str,
    command: &str,
    args: &[String],
    env: Option<&std::collections::HashMap<String, String>>,
    roots: RootSet,
) -> Result<(DownstreamServer, Vec<Tool>), DownstreamError> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    if let Some(env) = env {
        cmd.envs(env);
    }

    let transport = TokioChildProcess::new(cmd).map_err(|e| DownstreamError::Spawn {
        server: name.to_string(),
        message: e.to_string(),
    })?;

    let service = RootsHandler::new(roots)
        .serve(transport)
        .await
        .map_err(|e| DownstreamError::Connect {
            server: name.to_string(),
            message: e.to_string(),
        })?;

    let tools = service
        .list_tools(None)
        .await
        .map_err(|e| DownstreamError::ListTools {
            server: name.to_string(),
            message: extract_service_error(&e),
        })?
        .tools;

    let peer = service.peer().clone();
    Ok((DownstreamServer { peer, service }, tools))
}

/// Build the exposed-name map. Collisions get a `<server>__<tool>` prefix
/// on every colliding server; unique names pass through.
fn aggregate_tools(tools_by_server: &[(String, Vec<Tool>)]) -> HashMap<String, AggregatedTool> {
    let mut name_count: HashMap<&str, usize> = HashMap::new();
    for (_, tools) in tools_by_server {
        for tool in tools {
            *name_count.entry(tool.name.as_ref()).or_default() += 1;
        }
    }

    let mut aggregated = HashMap::new();
    for (server, tools) in tools_by_server {
        for tool in tools {
            let collides = name_count.get(tool.name.as_ref()).copied().unwrap_or(0) > 1;
            let exposed_name = if collides {
                format!("{server}__{}", tool.name)
            } else {
                tool.name.to_string()
            };
            aggregated.insert(
                exposed_name.clone(),
                AggregatedTool {
                    exposed_name,
                    server: server.clone(),
                    tool_name: tool.name.to_string(),
                    tool: tool.clone(),
                },
            );
        }
    }
    aggregated
}

/// Extract the server-side message out of a relayed JSON-RPC failure.
fn extract_service_error(error: &ServiceError) -> String {
    match error {
        ServiceError::McpError(data) => {
            // Downstream validators sometimes bury the real message in the
            // error's data payload.
            if let Some(embedded) = data
                .data
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(|m| m.as_str())
            {
                embedded.to_string()
            } else {
                data.message.to_string()
            }
        }
        // Schema-validation failures arrive as opaque text; dig the
        // server's own message out rather than relaying validator noise.
        other => extract_server_message(&other.to_string()),
    }
}

/// Extract a human-readable server message from raw error text — used for
/// output-schema validation failures whose Display form wraps the real
/// message in validator noise.
pub fn extract_server_message(raw: &str) -> String {
    // Prefer an embedded JSON "message" field.
    if let Some(start) = raw.find("\"message\"") {
        let rest = &raw[start + "\"message\"".len()..];
        if let Some(colon) = rest.find(':') {
            let value = rest[colon + 1..].trim_start();
            if let Some(stripped) = value.strip_prefix('"') {
                if let Some(end) = stripped.find('"') {
                    return stripped[..end].to_string();
                }
            }
        }
    }
    raw.to_string()
}
