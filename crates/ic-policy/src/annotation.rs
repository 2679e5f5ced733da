// annotation.rs — Tool annotations produced by the offline pipeline.
//
// `tool-annotations.json` describes, per downstream server, every tool the
// policy engine is willing to reason about and which role(s) each argument
// plays. A tool absent from this file is structurally denied.
//
// Wire fields are camelCase — the artifacts are shared with the
// compilation pipeline, which fixes the schema.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ic_roles::ArgumentRole;

use crate::error::PolicyError;

/// One tool's annotation: what it does and which roles its arguments play.
///
/// An argument may carry several roles (a move's `source` is both
/// `read-path` and `delete-path`); each is evaluated independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotation {
    pub server_name: String,
    pub tool_name: String,
    /// Pipeline-written description of what the tool does.
    pub comment: String,
    /// Whether calling the tool can change the world.
    pub side_effects: bool,
    /// argument name → roles it plays.
    #[serde(default)]
    pub args: BTreeMap<String, Vec<ArgumentRole>>,
}

/// Annotations for one downstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAnnotations {
    /// Hash of the pipeline input that produced these annotations.
    pub input_hash: String,
    pub tools: Vec<ToolAnnotation>,
}

/// The `tool-annotations.json` artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsFile {
    pub generated_at: DateTime<Utc>,
    /// server name → that server's annotations.
    pub servers: BTreeMap<String, ServerAnnotations>,
}

impl AnnotationsFile {
    /// Load and validate an annotations artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let file: AnnotationsFile =
            serde_json::from_str(&raw).map_err(|source| PolicyError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        file.validate()?;
        Ok(file)
    }

    /// Structural validation: no duplicate tools within a server, and every
    /// annotation's serverName agrees with the server it is filed under.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (server, annotations) in &self.servers {
            let mut seen = std::collections::BTreeSet::new();
            for tool in &annotations.tools {
                if tool.server_name != *server {
                    return Err(PolicyError::ServerNameMismatch {
                        server: server.clone(),
                        claimed: tool.server_name.clone(),
                        tool: tool.tool_name.clone(),
                    });
                }
                if !seen.insert(tool.tool_name.clone()) {
                    return Err(PolicyError::DuplicateToolAnnotation {
                        server: server.clone(),
                        tool: tool.tool_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
