// error.rs — Error types for the policy subsystem.
//
// Everything here is a *configuration* error: it can only surface while
// loading the generated artifacts at mediator start. Per-call conditions
// (unknown tool, normalization failure) are decisions, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating policy artifacts.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// An artifact file could not be read.
    #[error("failed to read policy artifact at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An artifact file is not valid JSON for its schema. Unknown roles
    /// surface here with the offending role named.
    #[error("malformed policy artifact at {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Two rules share a name — rule order would become ambiguous.
    #[error("duplicate rule name '{0}'")]
    DuplicateRuleName(String),

    /// A rule tried to claim a reserved name. `structural-*`,
    /// `default-deny`, and `path-normalization-failed` belong to the
    /// engine.
    #[error("rule name '{0}' is reserved for structural invariants")]
    ReservedRuleName(String),

    /// A `paths.within` constraint is not absolute.
    #[error("rule '{rule}': paths.within '{within}' is not an absolute path")]
    RelativeWithin { rule: String, within: PathBuf },

    /// A server annotates the same tool twice.
    #[error("server '{server}' annotates tool '{tool}' more than once")]
    DuplicateToolAnnotation { server: String, tool: String },

    /// An annotation's serverName disagrees with the server it is filed
    /// under.
    #[error("annotation for '{tool}' claims server '{claimed}' but is filed under '{server}'")]
    ServerNameMismatch {
        server: String,
        claimed: String,
        tool: String,
    },

    /// A configured protected path is not absolute.
    #[error("protected path '{0}' is not absolute")]
    RelativeProtectedPath(PathBuf),
}
