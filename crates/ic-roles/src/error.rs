// error.rs — Error types for the role subsystem.

use thiserror::Error;

/// Errors that can occur while resolving roles or normalizing values.
#[derive(Debug, Error)]
pub enum RoleError {
    /// An annotation or rule referenced a role this registry does not know.
    #[error("unknown argument role '{0}'")]
    UnknownRole(String),

    /// `~` could not be expanded because no home directory is available.
    #[error("cannot expand '~': no home directory for the current user")]
    NoHomeDirectory,

    /// The current working directory could not be determined for
    /// absolutizing a relative path.
    #[error("cannot resolve relative path '{path}': {source}")]
    NoWorkingDirectory {
        path: String,
        source: std::io::Error,
    },

    /// An existing ancestor of the path could not be resolved.
    #[error("failed to resolve '{path}': {source}")]
    ResolveFailed {
        path: String,
        source: std::io::Error,
    },
}
