// agent.rs — The built-in agent loop.
//
// model → script → isolate → outcome → model, until the model answers
// without a script block (done), the budget runs out, or the loop
// detector blocks. The model only ever reaches the world through the
// isolate's tool functions, which all route through the mediator.

use std::sync::{Arc, Mutex};

use ic_provider::{ChatApi, ChatMessage, ChatRequest};

use crate::budget::{BudgetDimension, BudgetStatus, BudgetTracker};
use crate::error::AgentError;
use crate::isolate::Isolate;
use crate::loopcheck::{LoopDetector, LoopThresholds, LoopVerdict, StepClass};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an engineering agent. To act, reply with exactly one fenced code \
block of rhai script (```rhai ... ```); the registered tool functions are \
your only way to read or change anything. Call them with a map argument, \
e.g. read_file(#{path: \"...\"}). Script output comes back in the next \
message. When the task is complete, reply in plain prose with no code \
block. If a tool call is denied by policy, do not retry it and do not try \
to work around the denial.";

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model_id: String,
    pub max_tokens: u32,
    /// Override the default system prompt (tests, specialty agents).
    pub system_prompt: Option<String>,
    pub loop_thresholds: LoopThresholds,
    pub usd_per_input_token: f64,
    pub usd_per_output_token: f64,
}

impl AgentConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            max_tokens: 4096,
            system_prompt: None,
            loop_thresholds: LoopThresholds::default(),
            usd_per_input_token: 0.0,
            usd_per_output_token: 0.0,
        }
    }
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without a script block.
    Completed,
    /// A resource limit ran out.
    BudgetExhausted(BudgetDimension),
    /// The loop detector hard-blocked.
    LoopBlocked(StepClass),
}

/// The result of one `send_message` turn.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub text: String,
    pub stop: StopReason,
    pub steps: u32,
}

/// The built-in code-interpreter agent.
pub struct CodeAgent {
    api: Arc<dyn ChatApi>,
    config: AgentConfig,
    isolate: Arc<Mutex<Isolate>>,
    detector: LoopDetector,
    budget: BudgetTracker,
    transcript: Vec<ChatMessage>,
}

impl CodeAgent {
    pub fn new(
        api: Arc<dyn ChatApi>,
        config: AgentConfig,
        isolate: Isolate,
        budget: BudgetTracker,
    ) -> Self {
        let detector = LoopDetector::new(config.loop_thresholds);
        Self {
            api,
            config,
            isolate: Arc::new(Mutex::new(isolate)),
            detector,
            budget,
            transcript: Vec::new(),
        }
    }

    /// Conversation so far, for `get_history`.
    pub fn history(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Budget snapshot, for `get_budget_status`.
    pub fn budget_status(&self) -> BudgetStatus {
        self.budget.status()
    }

    /// Run one full agent turn.
    pub async fn run_turn(&mut self, user_text: &str) -> Result<AgentTurn, AgentError> {
        self.transcript.push(ChatMessage::user(user_text));
        let mut steps = 0u32;

        loop {
            if let Some(dimension) = self.budget.exceeded() {
                tracing::warn!(%dimension, "budget exhausted, stopping turn");
                return Ok(AgentTurn {
                    text: format!("Stopped: {dimension} budget exhausted."),
                    stop: StopReason::BudgetExhausted(dimension),
                    steps,
                });
            }

            let request = ChatRequest {
                model: self.config.model_id.clone(),
                system: Some(
                    self.config
                        .system_prompt
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                ),
                messages: self.transcript.clone(),
                max_tokens: self.config.max_tokens,
            };
            let api = self.api.clone();
            let response = tokio::task::spawn_blocking(move || api.complete(&request))
                .await
                .map_err(|error| AgentError::Task(error.to_string()))??;
            self.budget
                .charge_tokens(response.input_tokens, response.output_tokens);
            self.transcript
                .push(ChatMessage::assistant(response.text.clone()));

            let Some(code) = extract_script(&response.text) else {
                return Ok(AgentTurn {
                    text: response.text,
                    stop: StopReason::Completed,
                    steps,
                });
            };

            let isolate = self.isolate.clone();
            let script = code.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                isolate
                    .lock()
                    .map_err(|_| AgentError::Task("isolate lock poisoned".to_string()))?
                    .run(&script)
            })
            .await
            .map_err(|error| AgentError::Task(error.to_string()))?;
            let outcome_text = match outcome {
                Ok(output) if output.is_empty() => "(no output)".to_string(),
                Ok(output) => output,
                Err(error) => format!("error: {error}"),
            };
            self.budget.add_step();
            steps += 1;

            let (class, verdict) = self.detector.observe(&code, &outcome_text);
            let feedback = match verdict {
                LoopVerdict::Block { streak, .. } => {
                    tracing::warn!(?class, streak, "loop detector blocked the turn");
                    return Ok(AgentTurn {
                        text: format!(
                            "Stopped: no progress after {streak} repeated steps ({class:?})."
                        ),
                        stop: StopReason::LoopBlocked(class),
                        steps,
                    });
                }
                LoopVerdict::Warn { streak, .. } => format!(
                    "{outcome_text}\n\n[warning: {streak} steps without progress — change \
                     approach or finish]"
                ),
                LoopVerdict::Proceed => outcome_text,
            };

            self.transcript
                .push(ChatMessage::user(format!("Script output:\n{feedback}")));
        }
    }
}

/// Pull the first fenced script block out of a model reply.
fn extract_script(text: &str) -> Option<String> {
    let fence_start = text.find("```")?;
    let after = &text[fence_start + 3..];
    let body_start = after.find('\n')? + 1;
    let language = after[..body_start - 1].trim();
    if !(language.is_empty() || language == "rhai" || language == "rust") {
        return None;
    }
    let body = &after[body_start..];
    let fence_end = body.find("```")?;
    let script = body[..fence_end].trim();
    (!script.is_empty()).then(|| script.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ResourceBudget;
    use crate::isolate::{IsolateConfig, ToolFn};
    use ic_provider::{ChatResponse, ProviderError};

    /// A scripted model: plays its replies in order, repeating the last
    /// one forever.
    struct Scripted {
        replies: Vec<String>,
        cursor: std::sync::Mutex<usize>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.iter().map(|s| s.to_string()).collect(),
                cursor: std::sync::Mutex::new(0),
            })
        }
    }

    impl ChatApi for Scripted {
        fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let mut cursor = self.cursor.lock().unwrap();
            let index = (*cursor).min(self.replies.len() - 1);
            *cursor += 1;
            Ok(ChatResponse {
                text: self.replies[index].clone(),
                input_tokens: 100,
                output_tokens: 50,
            })
        }
    }

    fn test_isolate() -> Isolate {
        let echo: (String, ToolFn) = (
            "echo".to_string(),
            Box::new(|args| Ok(format!("echo:{}", serde_json::Value::Object(args)))),
        );
        Isolate::new(IsolateConfig::default(), vec![echo])
    }

    fn agent(api: Arc<dyn ChatApi>, budget: ResourceBudget) -> CodeAgent {
        let mut config = AgentConfig::new("test-model");
        config.loop_thresholds = LoopThresholds {
            warn_after: 2,
            block_after: 3,
        };
        CodeAgent::new(api, config, test_isolate(), BudgetTracker::new(budget, 0.0, 0.0))
    }

    #[test]
    fn extract_script_finds_fenced_block() {
        let text = "Let me check.\n```rhai\necho(#{path: \"/x\"})\n```\nDone.";
        assert_eq!(extract_script(text).unwrap(), "echo(#{path: \"/x\"})");
    }

    #[test]
    fn extract_script_ignores_other_languages() {
        assert_eq!(extract_script("```python\nprint(1)\n```"), None);
        assert_eq!(extract_script("no code here"), None);
    }

    #[test]
    fn extract_script_accepts_bare_fences() {
        assert_eq!(extract_script("```\n1 + 1\n```").unwrap(), "1 + 1");
    }

    #[tokio::test]
    async fn turn_completes_when_model_answers_in_prose() {
        let api = Scripted::new(&[
            "```rhai\nprint(\"working\");\n```",
            "All done: the answer is 42.",
        ]);
        let mut agent = agent(api, ResourceBudget::default());

        let turn = agent.run_turn("what is the answer?").await.unwrap();
        assert_eq!(turn.stop, StopReason::Completed);
        assert_eq!(turn.steps, 1);
        assert!(turn.text.contains("42"));
        // user, assistant(code), user(output), assistant(final)
        assert_eq!(agent.history().len(), 4);
    }

    #[tokio::test]
    async fn step_budget_stops_the_loop() {
        let api = Scripted::new(&["```rhai\nprint(\"again\");\n```"]);
        let mut agent = agent(
            api,
            ResourceBudget {
                max_steps: Some(2),
                ..ResourceBudget::default()
            },
        );

        let turn = agent.run_turn("loop forever").await.unwrap();
        assert_eq!(
            turn.stop,
            StopReason::BudgetExhausted(BudgetDimension::Steps)
        );
        assert_eq!(turn.steps, 2);
    }

    #[tokio::test]
    async fn stagnating_model_is_blocked() {
        // Same code and same outcome every step.
        let api = Scripted::new(&["```rhai\n1 + 1\n```"]);
        let mut agent = agent(api, ResourceBudget::default());

        let turn = agent.run_turn("do something").await.unwrap();
        assert!(matches!(turn.stop, StopReason::LoopBlocked(_)));
        // First step is FullProgress; then three stagnation steps.
        assert_eq!(turn.steps, 4);
    }

    #[tokio::test]
    async fn token_budget_counts_model_usage() {
        let api = Scripted::new(&["plain answer"]);
        let mut agent = agent(
            api,
            ResourceBudget {
                max_input_tokens: Some(1000),
                ..ResourceBudget::default()
            },
        );
        agent.run_turn("hello").await.unwrap();
        let status = agent.budget_status();
        assert_eq!(status.input_tokens, 100);
        assert_eq!(status.output_tokens, 50);
    }
}
