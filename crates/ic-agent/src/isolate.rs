// isolate.rs — The rhai isolate.
//
// The engine starts with no filesystem, network, or process surface; the
// only world-touching functions are the registered tools. Two brakes stop
// runaway scripts: an operation ceiling and a wall-clock deadline checked
// from the progress callback. Hitting either surfaces as a script error,
// which the agent loop feeds back to the model.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult};

use crate::error::AgentError;
use crate::truncate::truncate_middle;

/// A tool implementation: JSON arguments in, rendered text out. Errors are
/// plain strings and become script runtime errors.
pub type ToolFn = Box<
    dyn Fn(serde_json::Map<String, serde_json::Value>) -> Result<String, String> + Send + Sync,
>;

/// Isolate tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct IsolateConfig {
    /// rhai operation ceiling per run.
    pub max_operations: u64,
    /// Tool results above this many bytes are middle-truncated.
    pub tool_result_limit: usize,
    /// Wall-clock bound per run.
    pub step_timeout: Duration,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            tool_result_limit: 32 * 1024,
            step_timeout: Duration::from_secs(120),
        }
    }
}

/// One agent's script sandbox.
pub struct Isolate {
    engine: Engine,
    config: IsolateConfig,
    deadline: Arc<Mutex<Instant>>,
    prints: Arc<Mutex<Vec<String>>>,
}

impl Isolate {
    /// Build an isolate exposing exactly the given tools.
    pub fn new(config: IsolateConfig, tools: Vec<(String, ToolFn)>) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(config.max_operations);

        // Deadline cell, re-armed by every run().
        let deadline = Arc::new(Mutex::new(Instant::now() + config.step_timeout));
        {
            let deadline = deadline.clone();
            engine.on_progress(move |_operations| {
                let expired = deadline
                    .lock()
                    .map(|at| Instant::now() >= *at)
                    .unwrap_or(true);
                if expired {
                    Some(Dynamic::from("step deadline exceeded"))
                } else {
                    None
                }
            });
        }

        // print()/debug() feed the captured output, not stdio.
        let prints = Arc::new(Mutex::new(Vec::new()));
        {
            let prints = prints.clone();
            engine.on_print(move |text| {
                if let Ok(mut prints) = prints.lock() {
                    prints.push(text.to_string());
                }
            });
        }

        for (name, tool) in tools {
            let tool = Arc::new(tool);
            let limit = config.tool_result_limit;
            {
                let tool = tool.clone();
                engine.register_fn(
                    name.as_str(),
                    move |args: rhai::Map| -> Result<Dynamic, Box<EvalAltResult>> {
                        let dynamic: Dynamic = args.into();
                        let json: serde_json::Value = rhai::serde::from_dynamic(&dynamic)?;
                        let object = json.as_object().cloned().unwrap_or_default();
                        match tool(object) {
                            Ok(text) => Ok(truncate_middle(&text, limit).into()),
                            Err(message) => Err(message.into()),
                        }
                    },
                );
            }
            // Zero-argument convenience overload.
            engine.register_fn(
                name.as_str(),
                move || -> Result<Dynamic, Box<EvalAltResult>> {
                    match tool(serde_json::Map::new()) {
                        Ok(text) => Ok(truncate_middle(&text, limit).into()),
                        Err(message) => Err(message.into()),
                    }
                },
            );
        }

        Self {
            engine,
            config,
            deadline,
            prints,
        }
    }

    /// Execute one script. Returns captured prints plus the final value.
    pub fn run(&self, code: &str) -> Result<String, AgentError> {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = Instant::now() + self.config.step_timeout;
        }
        if let Ok(mut prints) = self.prints.lock() {
            prints.clear();
        }

        let result = self
            .engine
            .eval::<Dynamic>(code)
            .map_err(|error| AgentError::Isolate(error.to_string()))?;

        let mut output = self
            .prints
            .lock()
            .map(|prints| prints.join("\n"))
            .unwrap_or_default();
        if !result.is_unit() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&result.to_string());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> (String, ToolFn) {
        (
            "echo".to_string(),
            Box::new(|args| {
                Ok(format!(
                    "echo:{}",
                    serde_json::Value::Object(args)
                ))
            }),
        )
    }

    fn isolate_with(tools: Vec<(String, ToolFn)>) -> Isolate {
        Isolate::new(
            IsolateConfig {
                max_operations: 100_000,
                tool_result_limit: 64,
                step_timeout: Duration::from_millis(500),
            },
            tools,
        )
    }

    #[test]
    fn evaluates_expressions() {
        let isolate = isolate_with(vec![]);
        assert_eq!(isolate.run("1 + 1").unwrap(), "2");
    }

    #[test]
    fn captures_print_output() {
        let isolate = isolate_with(vec![]);
        let out = isolate.run(r#"print("hello"); print("world");"#).unwrap();
        assert_eq!(out, "hello\nworld");
    }

    #[test]
    fn tools_are_callable_with_map_arguments() {
        let isolate = isolate_with(vec![echo_tool()]);
        let out = isolate.run(r#"echo(#{path: "/tmp/x"})"#).unwrap();
        assert_eq!(out, r#"echo:{"path":"/tmp/x"}"#);
    }

    #[test]
    fn tools_are_callable_without_arguments() {
        let isolate = isolate_with(vec![echo_tool()]);
        assert_eq!(isolate.run("echo()").unwrap(), "echo:{}");
    }

    #[test]
    fn tool_errors_become_script_errors() {
        let failing: (String, ToolFn) = (
            "always_fails".to_string(),
            Box::new(|_| Err("denied by policy".to_string())),
        );
        let isolate = isolate_with(vec![failing]);
        let err = isolate.run("always_fails()").unwrap_err();
        assert!(err.to_string().contains("denied by policy"));
    }

    #[test]
    fn oversized_tool_results_are_truncated() {
        let big: (String, ToolFn) = (
            "blob".to_string(),
            Box::new(|_| Ok("x".repeat(10_000))),
        );
        let isolate = isolate_with(vec![big]);
        let out = isolate.run("blob()").unwrap();
        assert!(out.contains("[... truncated"));
        assert!(out.len() < 10_000);
    }

    #[test]
    fn unknown_functions_error() {
        let isolate = isolate_with(vec![]);
        assert!(isolate.run(r#"open_file("/etc/passwd")"#).is_err());
    }

    #[test]
    fn runaway_scripts_hit_the_operation_ceiling() {
        let isolate = isolate_with(vec![]);
        let err = isolate.run("let x = 0; loop { x += 1; }").unwrap_err();
        // Either brake may fire first; both abort the script.
        let text = err.to_string();
        assert!(
            text.contains("operations") || text.contains("deadline") || text.contains("Terminated"),
            "unexpected error: {text}"
        );
    }
}
