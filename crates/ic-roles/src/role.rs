// role.rs — The closed argument-role registry.
//
// A role tags how the policy engine should interpret one tool argument.
// One argument may carry several roles (a move's `source` is both a
// read-path and a delete-path); each role is evaluated independently and
// the strictest outcome wins for that argument.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RoleError;
use crate::path::normalize_path;

/// How the policy engine interprets a tool argument.
///
/// The set is closed at compile time. Wire names are kebab-case
/// (`read-path`, `write-path`, `delete-path`, `github-owner`, `none`);
/// anything else fails deserialization with [`RoleError::UnknownRole`]
/// surfaced through serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentRole {
    /// The argument names a filesystem location the tool will read.
    ReadPath,
    /// The argument names a filesystem location the tool will create or
    /// overwrite.
    WritePath,
    /// The argument names a filesystem location the tool will remove.
    DeletePath,
    /// The argument names a GitHub owner (user or organization).
    GithubOwner,
    /// The argument carries no policy-relevant meaning.
    None,
}

impl ArgumentRole {
    /// Every role in registry order.
    pub const ALL: [ArgumentRole; 5] = [
        ArgumentRole::ReadPath,
        ArgumentRole::WritePath,
        ArgumentRole::DeletePath,
        ArgumentRole::GithubOwner,
        ArgumentRole::None,
    ];

    /// The wire name of this role.
    pub fn name(&self) -> &'static str {
        match self {
            ArgumentRole::ReadPath => "read-path",
            ArgumentRole::WritePath => "write-path",
            ArgumentRole::DeletePath => "delete-path",
            ArgumentRole::GithubOwner => "github-owner",
            ArgumentRole::None => "none",
        }
    }

    /// Human description used in escalation prompts and diagnostics.
    pub fn description(&self) -> &'static str {
        match self {
            ArgumentRole::ReadPath => "a filesystem path the tool reads from",
            ArgumentRole::WritePath => "a filesystem path the tool writes to",
            ArgumentRole::DeletePath => "a filesystem path the tool deletes",
            ArgumentRole::GithubOwner => "a GitHub user or organization name",
            ArgumentRole::None => "not policy-relevant",
        }
    }

    /// Whether values with this role identify a concrete resource.
    pub fn is_resource_identifier(&self) -> bool {
        !matches!(self, ArgumentRole::None)
    }

    /// Whether this role is one of the filesystem-path roles.
    pub fn is_path(&self) -> bool {
        matches!(
            self,
            ArgumentRole::ReadPath | ArgumentRole::WritePath | ArgumentRole::DeletePath
        )
    }

    /// Normalize a raw argument value according to this role.
    ///
    /// Path roles run full path normalization; `github-owner` lowercases;
    /// `none` is the identity.
    pub fn normalize(&self, raw: &str) -> Result<String, RoleError> {
        match self {
            ArgumentRole::ReadPath | ArgumentRole::WritePath | ArgumentRole::DeletePath => {
                Ok(normalize_path(raw)?.to_string_lossy().into_owned())
            }
            ArgumentRole::GithubOwner => Ok(raw.to_ascii_lowercase()),
            ArgumentRole::None => Ok(raw.to_string()),
        }
    }
}

impl fmt::Display for ArgumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArgumentRole {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-path" => Ok(ArgumentRole::ReadPath),
            "write-path" => Ok(ArgumentRole::WritePath),
            "delete-path" => Ok(ArgumentRole::DeletePath),
            "github-owner" => Ok(ArgumentRole::GithubOwner),
            "none" => Ok(ArgumentRole::None),
            other => Err(RoleError::UnknownRole(other.to_string())),
        }
    }
}

// Serialize/Deserialize go through the wire name so unknown roles fail
// loading with a message naming the bad role instead of a serde variant
// listing.
impl Serialize for ArgumentRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ArgumentRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for role in ArgumentRole::ALL {
            let json = serde_json::to_string(&role).unwrap();
            let back: ArgumentRole = serde_json::from_str(&json).unwrap();
            assert_eq!(role, back);
        }
    }

    #[test]
    fn unknown_role_names_the_role() {
        let err = serde_json::from_str::<ArgumentRole>("\"exec-path\"").unwrap_err();
        assert!(err.to_string().contains("unknown argument role 'exec-path'"));
    }

    #[test]
    fn path_roles_are_resource_identifiers() {
        assert!(ArgumentRole::ReadPath.is_resource_identifier());
        assert!(ArgumentRole::WritePath.is_resource_identifier());
        assert!(ArgumentRole::DeletePath.is_resource_identifier());
        assert!(ArgumentRole::GithubOwner.is_resource_identifier());
        assert!(!ArgumentRole::None.is_resource_identifier());
    }

    #[test]
    fn github_owner_lowercases() {
        assert_eq!(
            ArgumentRole::GithubOwner.normalize("OctoCat").unwrap(),
            "octocat"
        );
    }

    #[test]
    fn none_is_identity() {
        assert_eq!(ArgumentRole::None.normalize("AnyThing ").unwrap(), "AnyThing ");
    }

    #[test]
    fn path_role_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!("{}/a/../b.txt", dir.path().display());
        let normalized = ArgumentRole::ReadPath.normalize(&raw).unwrap();
        assert!(normalized.ends_with("/b.txt"));
        assert!(!normalized.contains(".."));
    }
}
