//! # ic-policy
//!
//! Compiled-policy engine for IronCurtain.
//!
//! Implements the "default deny" security boundary: a tool call may only
//! proceed if a structural invariant or a compiled rule explicitly allows
//! it. Evaluation is two-phase:
//!
//! 1. **Structural invariants** (non-overridable): unknown tools and
//!    protected paths are denied, side-effect-free tools and
//!    sandbox-contained read/write calls are allowed.
//! 2. **Compiled rules**: each (argument, role) pair walks the ordered rule
//!    list from the compiled policy artifact; the first matching rule
//!    decides that pair, and the strictest pair outcome
//!    (deny > escalate > allow) decides the call.
//!
//! Annotations and the compiled policy are produced by an offline
//! compilation pipeline and validated once at mediator start; every
//! validation failure is fatal there, never per-call.

mod annotation;
mod engine;
mod error;
mod rule;

pub use annotation::{AnnotationsFile, ServerAnnotations, ToolAnnotation};
pub use engine::{PolicyEngine, PolicyEvaluation};
pub use error::PolicyError;
pub use rule::{CompiledPolicy, CompiledRule, Decision, PathConstraint, RuleCondition};
