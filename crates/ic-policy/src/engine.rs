// engine.rs — Two-phase policy evaluation.
//
// Every tool call flows through `evaluate()`:
//
// Phase 1 — structural invariants, non-overridable, in order:
//   1. Tool not annotated → Deny (structural-unknown-tool)
//   2. Any resource-path argument at/under a protected path → Deny
//      (structural-protected-path)
//   3. Any path argument that failed normalization → Escalate
//      (path-normalization-failed) — an unresolvable path can never be
//      proven safe, so it is never allowed structurally
//   4. sideEffects=false → Allow (structural-side-effect-free)
//   5. Only read/write path arguments, all inside the sandbox → Allow
//      (structural-sandbox-allow). Delete roles are never auto-allowed,
//      sandbox or not.
//
// Phase 2 — compiled rules: each (argument, role ≠ none) pair walks the
// ordered rule list; the first matching rule decides the pair; the
// strictest pair outcome (deny > escalate > allow) decides the call.
// A pair no rule matches contributes default-deny.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ic_roles::{is_contained, ArgumentRole};

use crate::annotation::{AnnotationsFile, ToolAnnotation};
use crate::error::PolicyError;
use crate::rule::{CompiledPolicy, CompiledRule, Decision};

/// The result of evaluating one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyEvaluation {
    pub decision: Decision,
    /// Name of the rule that decided.
    pub rule: String,
    pub reason: String,
}

impl PolicyEvaluation {
    fn new(decision: Decision, rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decision,
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// One (argument, role) pair with its normalized value.
struct RolePair {
    arg: String,
    role: ArgumentRole,
    normalized: String,
}

/// The policy engine — immutable after construction.
pub struct PolicyEngine {
    annotations: HashMap<(String, String), ToolAnnotation>,
    rules: Vec<CompiledRule>,
    protected_paths: Vec<PathBuf>,
    sandbox_dir: PathBuf,
}

impl PolicyEngine {
    /// Build an engine from validated artifacts.
    ///
    /// All validation failures are fatal configuration errors; nothing here
    /// is reported per-call.
    pub fn new(
        annotations: AnnotationsFile,
        policy: CompiledPolicy,
        protected_paths: Vec<PathBuf>,
        sandbox_dir: PathBuf,
    ) -> Result<Self, PolicyError> {
        annotations.validate()?;
        policy.validate()?;
        for path in &protected_paths {
            if !path.is_absolute() {
                return Err(PolicyError::RelativeProtectedPath(path.clone()));
            }
        }

        let mut map = HashMap::new();
        for (server, server_annotations) in annotations.servers {
            for tool in server_annotations.tools {
                map.insert((server.clone(), tool.tool_name.clone()), tool);
            }
        }

        Ok(Self {
            annotations: map,
            rules: policy.rules,
            protected_paths,
            sandbox_dir,
        })
    }

    /// Look up the annotation for a tool, if it has one.
    pub fn annotation(&self, server: &str, tool: &str) -> Option<&ToolAnnotation> {
        self.annotations
            .get(&(server.to_string(), tool.to_string()))
    }

    /// The sandbox directory this engine was configured with.
    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    /// Evaluate a tool call. This is the single chokepoint — the mediator
    /// calls it for every `tools/call` before anything reaches a
    /// downstream server.
    pub fn evaluate(
        &self,
        server: &str,
        tool: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> PolicyEvaluation {
        // Step 1: unknown tool.
        let Some(annotation) = self.annotation(server, tool) else {
            return PolicyEvaluation::new(
                Decision::Deny,
                "structural-unknown-tool",
                format!("tool '{server}/{tool}' is not annotated"),
            );
        };

        // Normalize every (argument, role) pair up front. Failures are
        // collected rather than returned immediately: a protected-path hit
        // on another argument is stricter and must win.
        let mut pairs: Vec<RolePair> = Vec::new();
        let mut failures: Vec<(String, String)> = Vec::new();
        for (arg_name, roles) in &annotation.args {
            let Some(value) = arguments.get(arg_name) else {
                continue;
            };
            for role in roles {
                if *role == ArgumentRole::None {
                    continue;
                }
                match value.as_str() {
                    Some(raw) => match role.normalize(raw) {
                        Ok(normalized) => pairs.push(RolePair {
                            arg: arg_name.clone(),
                            role: *role,
                            normalized,
                        }),
                        Err(err) => failures.push((arg_name.clone(), err.to_string())),
                    },
                    None if role.is_path() => failures.push((
                        arg_name.clone(),
                        format!("value is not a string: {value}"),
                    )),
                    None => pairs.push(RolePair {
                        arg: arg_name.clone(),
                        role: *role,
                        normalized: value.to_string(),
                    }),
                }
            }
        }

        // Step 2: protected paths. Matched after normalization, never by
        // substring.
        for pair in pairs.iter().filter(|p| p.role.is_path()) {
            let value = Path::new(&pair.normalized);
            for protected in &self.protected_paths {
                if is_contained(value, protected) {
                    return PolicyEvaluation::new(
                        Decision::Deny,
                        "structural-protected-path",
                        format!(
                            "argument '{}' resolves to '{}', under protected path '{}'",
                            pair.arg,
                            pair.normalized,
                            protected.display()
                        ),
                    );
                }
            }
        }

        // Step 3: unresolvable paths escalate.
        if let Some((arg, err)) = failures.first() {
            return PolicyEvaluation::new(
                Decision::Escalate,
                "path-normalization-failed",
                format!("could not normalize argument '{arg}': {err}"),
            );
        }

        // Step 4: side-effect-free tools are structurally allowed.
        if !annotation.side_effects {
            return PolicyEvaluation::new(
                Decision::Allow,
                "structural-side-effect-free",
                format!("tool '{tool}' declares no side effects"),
            );
        }

        // Step 5: sandbox shortcut. Read/write only — a delete role (or any
        // non-path resource role) always falls through to the rules.
        let read_write_only = !pairs.is_empty()
            && pairs.iter().all(|p| {
                matches!(p.role, ArgumentRole::ReadPath | ArgumentRole::WritePath)
            });
        if read_write_only
            && pairs
                .iter()
                .all(|p| is_contained(Path::new(&p.normalized), &self.sandbox_dir))
        {
            return PolicyEvaluation::new(
                Decision::Allow,
                "structural-sandbox-allow",
                format!(
                    "all path arguments inside sandbox '{}'",
                    self.sandbox_dir.display()
                ),
            );
        }

        // Phase 2: compiled rules, strictest pair outcome wins.
        let mut outcome: Option<PolicyEvaluation> = None;
        for pair in &pairs {
            let evaluation = self.evaluate_pair(annotation, server, tool, pair);
            let stricter = match &outcome {
                None => true,
                Some(current) => evaluation.decision > current.decision,
            };
            if stricter {
                outcome = Some(evaluation);
            }
        }

        outcome.unwrap_or_else(|| {
            PolicyEvaluation::new(
                Decision::Deny,
                "default-deny",
                format!("no compiled rule matched tool '{server}/{tool}'"),
            )
        })
    }

    /// First matching rule in file order decides the pair.
    fn evaluate_pair(
        &self,
        annotation: &ToolAnnotation,
        server: &str,
        tool: &str,
        pair: &RolePair,
    ) -> PolicyEvaluation {
        let value = Path::new(&pair.normalized);
        for rule in &self.rules {
            if rule
                .condition
                .matches(server, tool, annotation.side_effects, pair.role, value)
            {
                return PolicyEvaluation::new(rule.then, rule.name.clone(), rule.reason.clone());
            }
        }
        PolicyEvaluation::new(
            Decision::Deny,
            "default-deny",
            format!(
                "no compiled rule matched argument '{}' as {}",
                pair.arg, pair.role
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::ServerAnnotations;
    use crate::rule::{PathConstraint, RuleCondition};
    use chrono::Utc;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeMap;

    const SERVER: &str = "filesystem";

    /// Helper: build a ToolAnnotation for the test server.
    fn tool(name: &str, side_effects: bool, args: &[(&str, &[ArgumentRole])]) -> ToolAnnotation {
        let mut map = BTreeMap::new();
        for (arg, roles) in args {
            map.insert(arg.to_string(), roles.to_vec());
        }
        ToolAnnotation {
            server_name: SERVER.to_string(),
            tool_name: name.to_string(),
            comment: String::new(),
            side_effects,
            args: map,
        }
    }

    fn annotations(tools: Vec<ToolAnnotation>) -> AnnotationsFile {
        let mut servers = BTreeMap::new();
        servers.insert(
            SERVER.to_string(),
            ServerAnnotations {
                input_hash: "h".repeat(64),
                tools,
            },
        );
        AnnotationsFile {
            generated_at: Utc::now(),
            servers,
        }
    }

    fn rule(name: &str, condition: RuleCondition, then: Decision) -> CompiledRule {
        CompiledRule {
            name: name.to_string(),
            description: String::new(),
            principle: String::new(),
            condition,
            then,
            reason: format!("per rule {name}"),
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

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    /// The standard fixture: a sandbox in a tempdir, file tools, and a
    /// small realistic rule set.
    struct Fixture {
        engine: PolicyEngine,
        sandbox: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn fixture(protected: Vec<PathBuf>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = dir.path().canonicalize().unwrap().join("sandbox");
        std::fs::create_dir_all(&sandbox).unwrap();

        let tools = vec![
            tool("read_file", true, &[("path", &[ArgumentRole::ReadPath])]),
            tool("write_file", true, &[("path", &[ArgumentRole::WritePath])]),
            tool("delete_file", true, &[("path", &[ArgumentRole::DeletePath])]),
            tool(
                "move_file",
                true,
                &[
                    ("source", &[ArgumentRole::ReadPath, ArgumentRole::DeletePath]),
                    ("destination", &[ArgumentRole::WritePath]),
                ],
            ),
            tool("list_allowed_directories", false, &[]),
            tool(
                "create_issue",
                true,
                &[("owner", &[ArgumentRole::GithubOwner])],
            ),
        ];

        let rules = vec![
            rule(
                "allow-delete-inside-sandbox",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::DeletePath]),
                    paths: Some(PathConstraint {
                        roles: vec![ArgumentRole::DeletePath],
                        within: sandbox.clone(),
                    }),
                    ..RuleCondition::default()
                },
                Decision::Allow,
            ),
            rule(
                "allow-write-inside-sandbox",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::WritePath]),
                    paths: Some(PathConstraint {
                        roles: vec![ArgumentRole::WritePath],
                        within: sandbox.clone(),
                    }),
                    ..RuleCondition::default()
                },
                Decision::Allow,
            ),
            rule(
                "deny-delete-outside-permitted-areas",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::DeletePath]),
                    ..RuleCondition::default()
                },
                Decision::Deny,
            ),
            rule(
                "escalate-read-outside-sandbox",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::ReadPath]),
                    ..RuleCondition::default()
                },
                Decision::Escalate,
            ),
            rule(
                "escalate-github-writes",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::GithubOwner]),
                    ..RuleCondition::default()
                },
                Decision::Escalate,
            ),
        ];

        let engine = PolicyEngine::new(
            annotations(tools),
            policy(rules),
            protected,
            sandbox.clone(),
        )
        .unwrap();

        Fixture {
            engine,
            sandbox,
            _dir: dir,
        }
    }

    #[test]
    fn sandbox_read_is_structurally_allowed() {
        let f = fixture(vec![]);
        let path = f.sandbox.join("hello.txt").display().to_string();
        let eval = f.engine.evaluate(SERVER, "read_file", &args(&[("path", &path)]));
        assert_eq!(eval.decision, Decision::Allow);
        assert_eq!(eval.rule, "structural-sandbox-allow");
    }

    #[test]
    fn sandbox_write_is_structurally_allowed() {
        let f = fixture(vec![]);
        let path = f.sandbox.join("new.txt").display().to_string();
        let eval = f.engine.evaluate(SERVER, "write_file", &args(&[("path", &path)]));
        assert_eq!(eval.decision, Decision::Allow);
        assert_eq!(eval.rule, "structural-sandbox-allow");
    }

    #[test]
    fn read_outside_sandbox_escalates() {
        let f = fixture(vec![]);
        let eval = f
            .engine
            .evaluate(SERVER, "read_file", &args(&[("path", "/etc/hostname")]));
        assert_eq!(eval.decision, Decision::Escalate);
        assert_eq!(eval.rule, "escalate-read-outside-sandbox");

        // With no root expansion the next read under /etc escalates again —
        // the engine is stateless.
        let again = f
            .engine
            .evaluate(SERVER, "read_file", &args(&[("path", "/etc/passwd")]));
        assert_eq!(again.decision, Decision::Escalate);
    }

    #[test]
    fn delete_outside_is_denied_by_named_rule() {
        let f = fixture(vec![]);
        let eval = f.engine.evaluate(
            SERVER,
            "delete_file",
            &args(&[("path", "/tmp/outside/file.txt")]),
        );
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "deny-delete-outside-permitted-areas");
    }

    #[test]
    fn delete_inside_sandbox_needs_an_explicit_rule() {
        // The sandbox shortcut must not fire for delete roles; the explicit
        // allow-delete-inside-sandbox rule decides instead.
        let f = fixture(vec![]);
        let path = f.sandbox.join("scratch.txt").display().to_string();
        let eval = f.engine.evaluate(SERVER, "delete_file", &args(&[("path", &path)]));
        assert_eq!(eval.decision, Decision::Allow);
        assert_eq!(eval.rule, "allow-delete-inside-sandbox");
    }

    #[test]
    fn move_from_outside_denies_via_delete_role() {
        let f = fixture(vec![]);
        let dest = f.sandbox.join("b").display().to_string();
        let eval = f.engine.evaluate(
            SERVER,
            "move_file",
            &args(&[("source", "/tmp/outside/a"), ("destination", &dest)]),
        );
        // source plays read-path (escalate) and delete-path (deny); the
        // strictest wins.
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "deny-delete-outside-permitted-areas");
    }

    #[test]
    fn protected_path_denies_regardless_of_rules() {
        let f = fixture(vec![PathBuf::from("/etc")]);
        let eval = f
            .engine
            .evaluate(SERVER, "read_file", &args(&[("path", "/etc/shadow")]));
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "structural-protected-path");
    }

    #[test]
    fn protected_path_beats_side_effect_free() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = dir.path().to_path_buf();
        let tools = vec![tool(
            "peek_file",
            false,
            &[("path", &[ArgumentRole::ReadPath])],
        )];
        let engine = PolicyEngine::new(
            annotations(tools),
            policy(vec![]),
            vec![PathBuf::from("/etc")],
            sandbox,
        )
        .unwrap();
        let eval = engine.evaluate(SERVER, "peek_file", &args(&[("path", "/etc/shadow")]));
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "structural-protected-path");
    }

    #[test]
    fn protected_match_is_not_substring_based() {
        let f = fixture(vec![PathBuf::from("/etc")]);
        // /etcetera is not under /etc.
        let eval = f
            .engine
            .evaluate(SERVER, "read_file", &args(&[("path", "/etcetera/notes")]));
        assert_ne!(eval.rule, "structural-protected-path");
    }

    #[test]
    fn side_effect_free_tool_allowed() {
        let f = fixture(vec![]);
        let eval = f
            .engine
            .evaluate(SERVER, "list_allowed_directories", &Map::new());
        assert_eq!(eval.decision, Decision::Allow);
        assert_eq!(eval.rule, "structural-side-effect-free");
    }

    #[test]
    fn unknown_tool_denied() {
        let f = fixture(vec![]);
        let eval = f.engine.evaluate(SERVER, "format_disk", &Map::new());
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "structural-unknown-tool");
    }

    #[test]
    fn unmatched_side_effect_tool_default_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tools = vec![tool("reboot", true, &[])];
        let engine = PolicyEngine::new(
            annotations(tools),
            policy(vec![]),
            vec![],
            dir.path().to_path_buf(),
        )
        .unwrap();
        let eval = engine.evaluate(SERVER, "reboot", &Map::new());
        assert_eq!(eval.decision, Decision::Deny);
        assert_eq!(eval.rule, "default-deny");
    }

    #[test]
    fn non_string_path_value_escalates() {
        let f = fixture(vec![]);
        let mut call_args = Map::new();
        call_args.insert("path".to_string(), json!(42));
        let eval = f.engine.evaluate(SERVER, "read_file", &call_args);
        assert_eq!(eval.decision, Decision::Escalate);
        assert_eq!(eval.rule, "path-normalization-failed");
    }

    #[test]
    fn github_owner_is_normalized_before_matching() {
        let f = fixture(vec![]);
        let eval = f
            .engine
            .evaluate(SERVER, "create_issue", &args(&[("owner", "OctoCat")]));
        assert_eq!(eval.decision, Decision::Escalate);
        assert_eq!(eval.rule, "escalate-github-writes");
    }

    #[test]
    fn rule_order_decides_first_match() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = dir.path().to_path_buf();
        let tools = vec![tool("read_file", true, &[("path", &[ArgumentRole::ReadPath])])];
        // An early escalate shadows a later allow for the same condition.
        let rules = vec![
            rule(
                "escalate-reads",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::ReadPath]),
                    ..RuleCondition::default()
                },
                Decision::Escalate,
            ),
            rule(
                "allow-reads",
                RuleCondition {
                    roles: Some(vec![ArgumentRole::ReadPath]),
                    ..RuleCondition::default()
                },
                Decision::Allow,
            ),
        ];
        let engine =
            PolicyEngine::new(annotations(tools), policy(rules), vec![], sandbox).unwrap();
        let eval = engine.evaluate(SERVER, "read_file", &args(&[("path", "/srv/data.txt")]));
        assert_eq!(eval.rule, "escalate-reads");
    }

    #[test]
    fn absent_arguments_are_skipped() {
        let f = fixture(vec![]);
        // move_file with no source argument at all: only destination is
        // evaluated.
        let dest = f.sandbox.join("b").display().to_string();
        let eval = f
            .engine
            .evaluate(SERVER, "move_file", &args(&[("destination", &dest)]));
        assert_eq!(eval.decision, Decision::Allow);
        assert_eq!(eval.rule, "structural-sandbox-allow");
    }
}
