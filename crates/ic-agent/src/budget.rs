// budget.rs — Per-session resource accounting.
//
// Four dimensions: tokens (in/out), steps, wall clock, estimated USD.
// When any limit is crossed, the agent loop's stop condition fires and the
// session surfaces BudgetExhausted. Absent limits are unlimited.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Operator-configured limits. All optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceBudget {
    pub max_input_tokens: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub max_steps: Option<u32>,
    pub max_wall_clock_seconds: Option<u64>,
    pub max_usd: Option<f64>,
}

/// Which limit ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDimension {
    InputTokens,
    OutputTokens,
    Steps,
    WallClock,
    Usd,
}

impl std::fmt::Display for BudgetDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetDimension::InputTokens => write!(f, "input tokens"),
            BudgetDimension::OutputTokens => write!(f, "output tokens"),
            BudgetDimension::Steps => write!(f, "steps"),
            BudgetDimension::WallClock => write!(f, "wall clock"),
            BudgetDimension::Usd => write!(f, "estimated USD"),
        }
    }
}

/// A serializable snapshot for `get_budget_status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub steps: u32,
    pub elapsed_seconds: u64,
    pub estimated_usd: f64,
    pub exhausted: Option<BudgetDimension>,
}

/// Accumulates usage against a budget.
pub struct BudgetTracker {
    budget: ResourceBudget,
    usd_per_input_token: f64,
    usd_per_output_token: f64,
    input_tokens: u64,
    output_tokens: u64,
    steps: u32,
    started: Instant,
}

impl BudgetTracker {
    pub fn new(budget: ResourceBudget, usd_per_input_token: f64, usd_per_output_token: f64) -> Self {
        Self {
            budget,
            usd_per_input_token,
            usd_per_output_token,
            input_tokens: 0,
            output_tokens: 0,
            steps: 0,
            started: Instant::now(),
        }
    }

    pub fn charge_tokens(&mut self, input: u64, output: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn add_step(&mut self) {
        self.steps += 1;
    }

    pub fn estimated_usd(&self) -> f64 {
        self.input_tokens as f64 * self.usd_per_input_token
            + self.output_tokens as f64 * self.usd_per_output_token
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The first exhausted dimension, if any.
    pub fn exceeded(&self) -> Option<BudgetDimension> {
        if let Some(max) = self.budget.max_input_tokens {
            if self.input_tokens >= max {
                return Some(BudgetDimension::InputTokens);
            }
        }
        if let Some(max) = self.budget.max_output_tokens {
            if self.output_tokens >= max {
                return Some(BudgetDimension::OutputTokens);
            }
        }
        if let Some(max) = self.budget.max_steps {
            if self.steps >= max {
                return Some(BudgetDimension::Steps);
            }
        }
        if let Some(max) = self.budget.max_wall_clock_seconds {
            if self.elapsed() >= Duration::from_secs(max) {
                return Some(BudgetDimension::WallClock);
            }
        }
        if let Some(max) = self.budget.max_usd {
            if self.estimated_usd() >= max {
                return Some(BudgetDimension::Usd);
            }
        }
        None
    }

    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            steps: self.steps,
            elapsed_seconds: self.elapsed().as_secs(),
            estimated_usd: self.estimated_usd(),
            exhausted: self.exceeded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_exceeds() {
        let mut tracker = BudgetTracker::new(ResourceBudget::default(), 0.0, 0.0);
        tracker.charge_tokens(1_000_000, 1_000_000);
        for _ in 0..1000 {
            tracker.add_step();
        }
        assert_eq!(tracker.exceeded(), None);
    }

    #[test]
    fn token_limits_fire() {
        let mut tracker = BudgetTracker::new(
            ResourceBudget {
                max_input_tokens: Some(100),
                ..ResourceBudget::default()
            },
            0.0,
            0.0,
        );
        tracker.charge_tokens(99, 0);
        assert_eq!(tracker.exceeded(), None);
        tracker.charge_tokens(1, 0);
        assert_eq!(tracker.exceeded(), Some(BudgetDimension::InputTokens));
    }

    #[test]
    fn step_limit_fires() {
        let mut tracker = BudgetTracker::new(
            ResourceBudget {
                max_steps: Some(2),
                ..ResourceBudget::default()
            },
            0.0,
            0.0,
        );
        tracker.add_step();
        assert_eq!(tracker.exceeded(), None);
        tracker.add_step();
        assert_eq!(tracker.exceeded(), Some(BudgetDimension::Steps));
    }

    #[test]
    fn usd_estimate_uses_rates() {
        let mut tracker = BudgetTracker::new(
            ResourceBudget {
                max_usd: Some(0.01),
                ..ResourceBudget::default()
            },
            0.000001,
            0.000002,
        );
        tracker.charge_tokens(1000, 1000);
        assert!((tracker.estimated_usd() - 0.003).abs() < 1e-9);
        assert_eq!(tracker.exceeded(), None);
        tracker.charge_tokens(4000, 2000);
        assert_eq!(tracker.exceeded(), Some(BudgetDimension::Usd));
    }

    #[test]
    fn status_snapshot_is_serializable() {
        let tracker = BudgetTracker::new(ResourceBudget::default(), 0.0, 0.0);
        let json = serde_json::to_string(&tracker.status()).unwrap();
        assert!(json.contains("inputTokens"));
        assert!(json.contains("estimatedUsd"));
    }

    #[test]
    fn budget_config_parses_partial_json() {
        let budget: ResourceBudget =
            serde_json::from_str(r#"{"maxSteps": 40, "maxUsd": 2.5}"#).unwrap();
        assert_eq!(budget.max_steps, Some(40));
        assert_eq!(budget.max_usd, Some(2.5));
        assert_eq!(budget.max_input_tokens, None);
    }
}
