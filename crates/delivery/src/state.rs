//! The load progression state machine, decoupled from timers and I/O.
//!
//! A load walks `Queued → Loading → Retrying(n) → Fallback(n) →
//! Succeeded | Failed`. The transition table lives here as pure functions
//! so the retry and fallback policy is testable without a runtime.

use std::time::Duration;

/// Retry budget for the primary candidate
pub const PRIMARY_RETRY_BUDGET: u32 = 3;

/// Retry budget for each fallback candidate: opportunistic, one shot
pub const FALLBACK_RETRY_BUDGET: u32 = 1;

/// Observable phase of one load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Queued,
    Loading,
    /// Re-attempting the current candidate; `attempt` counts from 1
    Retrying { attempt: u32 },
    /// Moved on to fallback candidate `stage` (1-based past the primary)
    Fallback { stage: usize },
    Succeeded,
    Failed,
}

/// What the loader should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Try the same candidate again after the given delay
    Retry { attempt: u32, delay: Duration },
    /// Advance to the next candidate in the chain
    Advance { stage: usize },
    /// The chain is exhausted; the load is terminally failed
    GiveUp,
}

/// Attempts allowed for the candidate at `stage`
pub fn retry_budget(stage: usize) -> u32 {
    if stage == 0 {
        PRIMARY_RETRY_BUDGET
    } else {
        FALLBACK_RETRY_BUDGET
    }
}

/// Backoff before retry `attempt` (1-based): scales linearly with attempt
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Decide the next step after a failed attempt.
///
/// `attempt` is the 1-based attempt that just failed at `stage`;
/// `chain_len` is the total candidate count including the primary.
pub fn plan_after_failure(stage: usize, attempt: u32, chain_len: usize, base: Duration) -> Step {
    if attempt < retry_budget(stage) {
        let next = attempt + 1;
        Step::Retry {
            attempt: next,
            delay: backoff_delay(base, attempt),
        }
    } else if stage + 1 < chain_len {
        Step::Advance { stage: stage + 1 }
    } else {
        Step::GiveUp
    }
}

/// The observable phase while attempting `stage`/`attempt`
pub fn phase_of(stage: usize, attempt: u32) -> LoadPhase {
    if stage > 0 {
        LoadPhase::Fallback { stage }
    } else if attempt > 1 {
        LoadPhase::Retrying { attempt }
    } else {
        LoadPhase::Loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(500);

    #[test]
    fn test_primary_is_retried_with_growing_delays() {
        assert_eq!(
            plan_after_failure(0, 1, 4, BASE),
            Step::Retry {
                attempt: 2,
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(
            plan_after_failure(0, 2, 4, BASE),
            Step::Retry {
                attempt: 3,
                delay: Duration::from_millis(1000)
            }
        );
    }

    #[test]
    fn test_primary_exhaustion_advances_to_fallback() {
        assert_eq!(plan_after_failure(0, 3, 4, BASE), Step::Advance { stage: 1 });
    }

    #[test]
    fn test_fallbacks_get_a_single_shot() {
        assert_eq!(plan_after_failure(1, 1, 4, BASE), Step::Advance { stage: 2 });
        assert_eq!(plan_after_failure(2, 1, 4, BASE), Step::Advance { stage: 3 });
    }

    #[test]
    fn test_last_candidate_failure_is_terminal() {
        assert_eq!(plan_after_failure(3, 1, 4, BASE), Step::GiveUp);
    }

    #[test]
    fn test_short_chain_terminates() {
        // A chain with only the primary gives up straight after its budget.
        assert_eq!(plan_after_failure(0, 3, 1, BASE), Step::GiveUp);
    }

    #[test]
    fn test_full_walk_is_finite() {
        // Walk the table from the start; it must reach GiveUp without
        // revisiting any (stage, attempt) pair.
        let chain_len = 4;
        let mut stage = 0usize;
        let mut attempt = 1u32;
        let mut visited = std::collections::HashSet::new();
        let mut steps = 0;

        loop {
            assert!(visited.insert((stage, attempt)), "revisited state");
            steps += 1;
            assert!(steps < 32, "transition table does not terminate");

            match plan_after_failure(stage, attempt, chain_len, BASE) {
                Step::Retry { attempt: next, .. } => attempt = next,
                Step::Advance { stage: next } => {
                    stage = next;
                    attempt = 1;
                }
                Step::GiveUp => break,
            }
        }

        // 3 primary attempts + one per fallback candidate.
        assert_eq!(steps, 6);
    }

    #[test]
    fn test_phase_view() {
        assert_eq!(phase_of(0, 1), LoadPhase::Loading);
        assert_eq!(phase_of(0, 2), LoadPhase::Retrying { attempt: 2 });
        assert_eq!(phase_of(2, 1), LoadPhase::Fallback { stage: 2 });
    }
}
