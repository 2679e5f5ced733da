//! # ic-agent
//!
//! The built-in IronCurtain agent: a sandboxed code interpreter.
//!
//! Agent-authored scripts run in a [rhai] isolate with no filesystem,
//! network, or process capability — the only functions registered are the
//! mediator's tools, each of which packages its arguments as a JSON-RPC
//! `tools/call` and blocks until the mediator answers. Everything the
//! script can do is therefore policy-checked and audited.
//!
//! Around the isolate sit three safety nets:
//! - every tool result above a size limit is middle-truncated
//!   ([`truncate_middle`]),
//! - a [`LoopDetector`] classifies each `(code, outcome)` pair and blocks
//!   stuck/stagnating agents,
//! - a [`BudgetTracker`] stops the loop when tokens, steps, wall clock, or
//!   estimated spend run out.

mod agent;
mod budget;
mod error;
mod isolate;
mod loopcheck;
mod tools;
mod truncate;

pub use agent::{AgentConfig, AgentTurn, CodeAgent, StopReason};
pub use budget::{BudgetDimension, BudgetStatus, BudgetTracker, ResourceBudget};
pub use error::AgentError;
pub use isolate::{Isolate, IsolateConfig, ToolFn};
pub use loopcheck::{LoopDetector, LoopThresholds, LoopVerdict, StepClass};
pub use tools::mediator_tools;
pub use truncate::truncate_middle;
