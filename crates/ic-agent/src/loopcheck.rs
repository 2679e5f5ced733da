// loopcheck.rs — Stuck/stagnation detection for the agent loop.
//
// A side observer hashes each (code, outcome) pair and compares it to the
// previous step:
//
//   new code, new outcome       → FullProgress
//   repeated code, new outcome  → WorldChanged (same probe, world moved)
//   new code, repeated outcome  → Stuck (trying things, nothing changes)
//   repeated code and outcome   → FullStagnation
//
// Stuck and FullStagnation feed one streak counter; crossing `warn_after`
// produces warnings the agent sees, crossing `block_after` hard-stops the
// loop.

use sha2::{Digest, Sha256};

/// Classification of one step relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    FullProgress,
    WorldChanged,
    Stuck,
    FullStagnation,
}

/// What the loop should do after this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    Proceed,
    /// Warn the agent; `streak` consecutive no-progress steps so far.
    Warn { class: StepClass, streak: u32 },
    /// Stop the loop.
    Block { class: StepClass, streak: u32 },
}

/// When to warn and when to block.
#[derive(Debug, Clone, Copy)]
pub struct LoopThresholds {
    pub warn_after: u32,
    pub block_after: u32,
}

impl Default for LoopThresholds {
    fn default() -> Self {
        Self {
            warn_after: 3,
            block_after: 6,
        }
    }
}

/// The observer. One per agent session.
pub struct LoopDetector {
    thresholds: LoopThresholds,
    last_code: Option<String>,
    last_outcome: Option<String>,
    streak: u32,
}

impl LoopDetector {
    pub fn new(thresholds: LoopThresholds) -> Self {
        Self {
            thresholds,
            last_code: None,
            last_outcome: None,
            streak: 0,
        }
    }

    /// Observe one executed step.
    pub fn observe(&mut self, code: &str, outcome: &str) -> (StepClass, LoopVerdict) {
        let code_hash = hash(code);
        let outcome_hash = hash(outcome);

        let code_repeated = self.last_code.as_deref() == Some(code_hash.as_str());
        let outcome_repeated = self.last_outcome.as_deref() == Some(outcome_hash.as_str());
        self.last_code = Some(code_hash);
        self.last_outcome = Some(outcome_hash);

        let class = match (code_repeated, outcome_repeated) {
            (false, false) => StepClass::FullProgress,
            (true, false) => StepClass::WorldChanged,
            (false, true) => StepClass::Stuck,
            (true, true) => StepClass::FullStagnation,
        };

        let verdict = match class {
            StepClass::FullProgress | StepClass::WorldChanged => {
                self.streak = 0;
                LoopVerdict::Proceed
            }
            StepClass::Stuck | StepClass::FullStagnation => {
                self.streak += 1;
                if self.streak >= self.thresholds.block_after {
                    LoopVerdict::Block {
                        class,
                        streak: self.streak,
                    }
                } else if self.streak >= self.thresholds.warn_after {
                    LoopVerdict::Warn {
                        class,
                        streak: self.streak,
                    }
                } else {
                    LoopVerdict::Proceed
                }
            }
        };

        (class, verdict)
    }
}

fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> LoopDetector {
        LoopDetector::new(LoopThresholds {
            warn_after: 2,
            block_after: 4,
        })
    }

    #[test]
    fn classification_is_exact() {
        let mut d = detector();
        // First step has no predecessor: nothing repeats.
        assert_eq!(d.observe("a", "1").0, StepClass::FullProgress);
        // Same code, new outcome.
        assert_eq!(d.observe("a", "2").0, StepClass::WorldChanged);
        // New code, same outcome.
        assert_eq!(d.observe("b", "2").0, StepClass::Stuck);
        // Same code, same outcome.
        assert_eq!(d.observe("b", "2").0, StepClass::FullStagnation);
        // Fresh pair again.
        assert_eq!(d.observe("c", "3").0, StepClass::FullProgress);
    }

    #[test]
    fn stuck_streak_warns_then_blocks() {
        let mut d = detector();
        d.observe("a", "same");
        // Each new code with the identical outcome is Stuck.
        assert_eq!(d.observe("b", "same").1, LoopVerdict::Proceed);
        assert_eq!(
            d.observe("c", "same").1,
            LoopVerdict::Warn {
                class: StepClass::Stuck,
                streak: 2
            }
        );
        assert!(matches!(d.observe("d", "same").1, LoopVerdict::Warn { .. }));
        assert_eq!(
            d.observe("e", "same").1,
            LoopVerdict::Block {
                class: StepClass::Stuck,
                streak: 4
            }
        );
    }

    #[test]
    fn stagnation_counts_toward_the_same_streak() {
        let mut d = detector();
        d.observe("a", "same");
        d.observe("b", "same"); // Stuck, streak 1
        d.observe("b", "same"); // FullStagnation, streak 2
        let (class, verdict) = d.observe("b", "same"); // streak 3
        assert_eq!(class, StepClass::FullStagnation);
        assert!(matches!(verdict, LoopVerdict::Warn { streak: 3, .. }));
    }

    #[test]
    fn progress_resets_the_streak() {
        let mut d = detector();
        d.observe("a", "same");
        d.observe("b", "same");
        d.observe("c", "same");
        // World moves: streak resets.
        assert_eq!(d.observe("c", "new").1, LoopVerdict::Proceed);
        assert_eq!(d.observe("d", "new2").1, LoopVerdict::Proceed);
    }
}
