// adapter.rs — Per-agent exec command and stdout parsing.
//
// Each supported external agent has a CLI shape of its own; an adapter
// knows how to issue one turn as a single exec and how to pull the final
// assistant text out of whatever the CLI printed.

use serde_json::Value;

use crate::error::ContainerError;

/// The supported external agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAdapter {
    /// `claude -p <prompt> --output-format json`
    ClaudeCli,
    /// `codex exec --json <prompt>`
    CodexCli,
}

impl AgentAdapter {
    /// Parse an adapter id from config/CLI.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "claude" | "claude-code" => Some(AgentAdapter::ClaudeCli),
            "codex" => Some(AgentAdapter::CodexCli),
            _ => None,
        }
    }

    /// The argv to exec inside the container for one turn.
    pub fn turn_command(&self, prompt: &str) -> Vec<String> {
        match self {
            AgentAdapter::ClaudeCli => vec![
                "claude".to_string(),
                "-p".to_string(),
                prompt.to_string(),
                "--output-format".to_string(),
                "json".to_string(),
            ],
            AgentAdapter::CodexCli => vec![
                "codex".to_string(),
                "exec".to_string(),
                "--json".to_string(),
                prompt.to_string(),
            ],
        }
    }

    /// Extract the final assistant text from the exec's stdout.
    pub fn parse_output(&self, stdout: &str) -> Result<String, ContainerError> {
        match self {
            AgentAdapter::ClaudeCli => {
                let value: Value = serde_json::from_str(stdout.trim())
                    .map_err(|e| ContainerError::BadAgentOutput(e.to_string()))?;
                value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ContainerError::BadAgentOutput("no 'result' field in output".to_string())
                    })
            }
            AgentAdapter::CodexCli => {
                // JSON-lines stream; the final agent message wins.
                let mut last_message = None;
                for line in stdout.lines() {
                    let Ok(value) = serde_json::from_str::<Value>(line) else {
                        continue;
                    };
                    if let Some(text) = value
                        .pointer("/msg/message")
                        .or_else(|| value.pointer("/msg/last_agent_message"))
                        .and_then(Value::as_str)
                    {
                        last_message = Some(text.to_string());
                    }
                }
                last_message.ok_or_else(|| {
                    ContainerError::BadAgentOutput("no agent message in output".to_string())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_ids_resolve() {
        assert_eq!(AgentAdapter::from_id("claude"), Some(AgentAdapter::ClaudeCli));
        assert_eq!(AgentAdapter::from_id("claude-code"), Some(AgentAdapter::ClaudeCli));
        assert_eq!(AgentAdapter::from_id("codex"), Some(AgentAdapter::CodexCli));
        assert_eq!(AgentAdapter::from_id("mystery"), None);
    }

    #[test]
    fn claude_output_parses_result_field() {
        let stdout = r#"{"type":"result","result":"Done: wrote 3 files.","cost_usd":0.01}"#;
        assert_eq!(
            AgentAdapter::ClaudeCli.parse_output(stdout).unwrap(),
            "Done: wrote 3 files."
        );
    }

    #[test]
    fn claude_output_without_result_errors() {
        let err = AgentAdapter::ClaudeCli.parse_output(r#"{"type":"noise"}"#).unwrap_err();
        assert!(matches!(err, ContainerError::BadAgentOutput(_)));
    }

    #[test]
    fn codex_output_takes_last_agent_message() {
        let stdout = "\
{\"msg\":{\"type\":\"agent_message\",\"message\":\"thinking...\"}}\n\
not json at all\n\
{\"msg\":{\"type\":\"agent_message\",\"message\":\"final answer\"}}\n";
        assert_eq!(
            AgentAdapter::CodexCli.parse_output(stdout).unwrap(),
            "final answer"
        );
    }

    #[test]
    fn turn_commands_embed_the_prompt() {
        let argv = AgentAdapter::ClaudeCli.turn_command("fix the bug");
        assert_eq!(argv[0], "claude");
        assert!(argv.contains(&"fix the bug".to_string()));
    }
}
