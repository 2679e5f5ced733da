// rule.rs — The compiled-policy artifact model.
//
// `compiled-policy.json` is produced offline from the operator's
// natural-language constitution. Rule order is significant: for each
// (argument, role) pair the first rule whose `if` matches wins. Absent
// constraints are wildcards.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ic_roles::ArgumentRole;

use crate::error::PolicyError;

/// The outcome a rule (or structural invariant) prescribes.
///
/// Variant order defines strictness: `Deny > Escalate > Allow`, which is
/// the tie-break across (argument, role) outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Escalate,
    Deny,
}

/// Path constraint inside a rule condition: the argument must play one of
/// the named roles AND its normalized value must be contained in `within`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathConstraint {
    pub roles: Vec<ArgumentRole>,
    pub within: PathBuf,
}

/// Conjunction of optional constraints. Absent constraint = wildcard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// The (argument, role) pair's role must be any of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<ArgumentRole>>,
    /// The call's server must be any of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Vec<String>>,
    /// The call's tool must be any of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Vec<String>>,
    /// The tool's sideEffects flag must equal this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<bool>,
    /// Containment constraint on the normalized argument value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathConstraint>,
}

impl RuleCondition {
    /// True when every present constraint holds for this (argument, role)
    /// pair of the given call.
    pub fn matches(
        &self,
        server: &str,
        tool: &str,
        side_effects: bool,
        role: ArgumentRole,
        normalized_value: &Path,
    ) -> bool {
        if let Some(roles) = &self.roles {
            if !roles.contains(&role) {
                return false;
            }
        }
        if let Some(servers) = &self.server {
            if !servers.iter().any(|s| s == server) {
                return false;
            }
        }
        if let Some(tools) = &self.tool {
            if !tools.iter().any(|t| t == tool) {
                return false;
            }
        }
        if let Some(expected) = self.side_effects {
            if side_effects != expected {
                return false;
            }
        }
        if let Some(paths) = &self.paths {
            if !paths.roles.contains(&role) {
                return false;
            }
            if !ic_roles::is_contained(normalized_value, &paths.within) {
                return false;
            }
        }
        true
    }
}

/// One compiled rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompiledRule {
    pub name: String,
    pub description: String,
    /// The constitution principle this rule implements.
    pub principle: String,
    #[serde(rename = "if")]
    pub condition: RuleCondition,
    pub then: Decision,
    pub reason: String,
}

/// The `compiled-policy.json` artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPolicy {
    pub generated_at: DateTime<Utc>,
    /// SHA-256 hex of the authoritative constitution text.
    pub constitution_hash: String,
    pub input_hash: String,
    /// Ordered — first match per (argument, role) wins.
    pub rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    /// Load and validate a compiled policy artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let policy: CompiledPolicy =
            serde_json::from_str(&raw).map_err(|source| PolicyError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Validation: unique rule names, no reserved names, absolute
    /// `paths.within` everywhere.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut names = std::collections::BTreeSet::new();
        for rule in &self.rules {
            if rule.name.starts_with("structural-")
                || rule.name == "default-deny"
                || rule.name == "path-normalization-failed"
            {
                return Err(PolicyError::ReservedRuleName(rule.name.clone()));
            }
            if !names.insert(rule.name.clone()) {
                return Err(PolicyError::DuplicateRuleName(rule.name.clone()));
            }
            if let Some(paths) = &rule.condition.paths {
                if !paths.within.is_absolute() {
                    return Err(PolicyError::RelativeWithin {
                        rule: rule.name.clone(),
                        within: paths.within.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every directory named by a `paths.within` constraint, in rule order.
    /// The downstream manager seeds its roots set from these.
    pub fn within_dirs(&self) -> Vec<PathBuf> {
        self.rules
            .iter()
            .filter_map(|r| r.condition.paths.as_ref().map(|p| p.within.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, condition: RuleCondition, then: Decision) -> CompiledRule {
        CompiledRule {
            name: name.to_string(),
            description: String::new(),
            principle: String::new(),
            condition,
            then,
            reason: format!("rule {name}"),
        }
    }

    fn policy(rules: Vec<CompiledRule>) -> CompiledPolicy {
        CompiledPolicy {
            generated_at: Utc::now(),
            constitution_hash: "c".repeat(64),
            input_hash: "i".repeat(64),
            rules,
        }
    }

    #[test]
    fn decision_strictness_order() {
        assert!(Decision::Deny > Decision::Escalate);
        assert!(Decision::Escalate > Decision::Allow);
    }

    #[test]
    fn decision_wire_names() {
        assert_eq!(serde_json::to_string(&Decision::Escalate).unwrap(), "\"escalate\"");
        let parsed: Decision = serde_json::from_str("\"deny\"").unwrap();
        assert_eq!(parsed, Decision::Deny);
    }

    #[test]
    fn if_field_round_trips() {
        let r = rule(
            "allow-reads-in-tmp",
            RuleCondition {
                roles: Some(vec![ArgumentRole::ReadPath]),
                paths: Some(PathConstraint {
                    roles: vec![ArgumentRole::ReadPath],
                    within: PathBuf::from("/tmp"),
                }),
                ..RuleCondition::default()
            },
            Decision::Allow,
        );
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"if\""));
        let back: CompiledRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn absent_constraints_are_wildcards() {
        let condition = RuleCondition::default();
        assert!(condition.matches(
            "fs",
            "read_file",
            true,
            ArgumentRole::DeletePath,
            Path::new("/anywhere")
        ));
    }

    #[test]
    fn paths_constraint_requires_role_and_containment() {
        let condition = RuleCondition {
            paths: Some(PathConstraint {
                roles: vec![ArgumentRole::WritePath],
                within: PathBuf::from("/srv/data"),
            }),
            ..RuleCondition::default()
        };
        assert!(condition.matches(
            "fs", "write_file", true,
            ArgumentRole::WritePath,
            Path::new("/srv/data/out.txt")
        ));
        // Wrong role.
        assert!(!condition.matches(
            "fs", "write_file", true,
            ArgumentRole::ReadPath,
            Path::new("/srv/data/out.txt")
        ));
        // Outside the directory.
        assert!(!condition.matches(
            "fs", "write_file", true,
            ArgumentRole::WritePath,
            Path::new("/srv/database/out.txt")
        ));
    }

    #[test]
    fn duplicate_names_rejected() {
        let p = policy(vec![
            rule("r1", RuleCondition::default(), Decision::Allow),
            rule("r1", RuleCondition::default(), Decision::Deny),
        ]);
        assert!(matches!(p.validate(), Err(PolicyError::DuplicateRuleName(_))));
    }

    #[test]
    fn reserved_names_rejected() {
        for name in ["structural-protected-path", "default-deny", "path-normalization-failed"] {
            let p = policy(vec![rule(name, RuleCondition::default(), Decision::Allow)]);
            assert!(matches!(p.validate(), Err(PolicyError::ReservedRuleName(_))), "{name}");
        }
    }

    #[test]
    fn relative_within_rejected() {
        let p = policy(vec![rule(
            "r1",
            RuleCondition {
                paths: Some(PathConstraint {
                    roles: vec![ArgumentRole::ReadPath],
                    within: PathBuf::from("srv/data"),
                }),
                ..RuleCondition::default()
            },
            Decision::Allow,
        )]);
        assert!(matches!(p.validate(), Err(PolicyError::RelativeWithin { .. })));
    }

    #[test]
    fn within_dirs_collected_in_order() {
        let p = policy(vec![
            rule(
                "r1",
                RuleCondition {
                    paths: Some(PathConstraint {
                        roles: vec![ArgumentRole::ReadPath],
                        within: PathBuf::from("/etc"),
                    }),
                    ..RuleCondition::default()
                },
                Decision::Allow,
            ),
            rule("r2", RuleCondition::default(), Decision::Deny),
            rule(
                "r3",
                RuleCondition {
                    paths: Some(PathConstraint {
                        roles: vec![ArgumentRole::WritePath],
                        within: PathBuf::from("/srv"),
                    }),
                    ..RuleCondition::default()
                },
                Decision::Escalate,
            ),
        ]);
        assert_eq!(p.within_dirs(), vec![PathBuf::from("/etc"), PathBuf::from("/srv")]);
    }
}
