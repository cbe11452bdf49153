//! Pure state machine for per-atom control flow
//!
//! This module implements a pure functional state machine with NO I/O.
//! All state transitions are deterministic and testable.
//!
//! ```text
//! Pending -> Routed -> Inferred -> Validating -> Completed
//!                                             -> Retrying -> Routed
//!                                             -> Failed
//! Pending -> Blocked
//! ```
//!
//! Key design principles:
//! - Pure function: transition(status, event) -> (status, actions)
//! - Any pair not listed above is a scheduling error (never panics)
//! - Actions describe side effects; the orchestrator loop performs them

use mosaic_core::{AtomStatus, MosaicError, Result, Tier};

/// Events that trigger atom transitions
#[derive(Debug, Clone, PartialEq)]
pub enum AtomEvent {
    /// A dependency failed or was blocked
    Block { blocked_by: Vec<String> },
    /// Complexity estimated and a tier chosen
    Route { tier: Tier },
    /// A candidate (or the attempt's failure) came back from inference
    Infer,
    /// The candidate entered validation
    Validate,
    /// Validation accepted the candidate
    Accept { score: f64, learn: bool },
    /// The attempt was rejected
    Reject { attempt: u32, max_attempts: u32 },
}

/// Side effects to perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum AtomAction {
    StartInference { tier: Tier },
    StartValidation,
    /// Save the atom through the task store
    Persist,
    /// Submit (signature, code, score) to the pattern cache
    LearnPattern { score: f64 },
    /// Dispatch attempt number `attempt` within the current level
    ScheduleRetry { attempt: u32 },
    /// Mark every pending dependent as blocked
    BlockDependents,
    /// Record which dependencies caused the block
    RecordBlockedBy { blocked_by: Vec<String> },
}

fn invalid(status: AtomStatus, event: &AtomEvent) -> MosaicError {
    MosaicError::Scheduling(format!("invalid transition from {} on {:?}", status, event))
}

/// Pure state transition function
///
/// Takes the current status and an event, returns the new status and the
/// actions to execute.
pub fn transition(status: AtomStatus, event: AtomEvent) -> Result<(AtomStatus, Vec<AtomAction>)> {
    match (status, &event) {
        (AtomStatus::Pending, AtomEvent::Block { blocked_by }) => Ok((
            AtomStatus::Blocked,
            vec![
                AtomAction::RecordBlockedBy {
                    blocked_by: blocked_by.clone(),
                },
                AtomAction::Persist,
                AtomAction::BlockDependents,
            ],
        )),

        (AtomStatus::Pending | AtomStatus::Retrying, AtomEvent::Route { tier }) => Ok((
            AtomStatus::Routed,
            vec![AtomAction::StartInference { tier: *tier }],
        )),

        (AtomStatus::Routed, AtomEvent::Infer) => {
            Ok((AtomStatus::Inferred, vec![AtomAction::StartValidation]))
        }

        (AtomStatus::Inferred, AtomEvent::Validate) => Ok((AtomStatus::Validating, Vec::new())),

        (AtomStatus::Validating, AtomEvent::Accept { score, learn }) => {
            let mut actions = vec![AtomAction::Persist];
            if *learn {
                actions.push(AtomAction::LearnPattern { score: *score });
            }
            Ok((AtomStatus::Completed, actions))
        }

        (
            AtomStatus::Validating,
            AtomEvent::Reject {
                attempt,
                max_attempts,
            },
        ) => {
            if attempt < max_attempts {
                Ok((
                    AtomStatus::Retrying,
                    vec![AtomAction::ScheduleRetry {
                        attempt: attempt + 1,
                    }],
                ))
            } else {
                Ok((
                    AtomStatus::Failed,
                    vec![AtomAction::Persist, AtomAction::BlockDependents],
                ))
            }
        }

        (status, event) => Err(invalid(status, event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(status: AtomStatus, event: AtomEvent) -> (AtomStatus, Vec<AtomAction>) {
        transition(status, event).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let (s, actions) = step(AtomStatus::Pending, AtomEvent::Route { tier: Tier::Light });
        assert_eq!(s, AtomStatus::Routed);
        assert_eq!(actions, vec![AtomAction::StartInference { tier: Tier::Light }]);

        let (s, actions) = step(s, AtomEvent::Infer);
        assert_eq!(s, AtomStatus::Inferred);
        assert_eq!(actions, vec![AtomAction::StartValidation]);

        let (s, _) = step(s, AtomEvent::Validate);
        assert_eq!(s, AtomStatus::Validating);

        let (s, actions) = step(
            s,
            AtomEvent::Accept {
                score: 100.0,
                learn: true,
            },
        );
        assert_eq!(s, AtomStatus::Completed);
        assert!(actions.contains(&AtomAction::LearnPattern { score: 100.0 }));
    }

    #[test]
    fn test_accept_below_learning_threshold() {
        let (_, actions) = step(
            AtomStatus::Validating,
            AtomEvent::Accept {
                score: 80.0,
                learn: false,
            },
        );
        assert_eq!(actions, vec![AtomAction::Persist]);
    }

    #[test]
    fn test_retry_until_bound() {
        let reject = |attempt| AtomEvent::Reject {
            attempt,
            max_attempts: 3,
        };

        let (s, actions) = step(AtomStatus::Validating, reject(1));
        assert_eq!(s, AtomStatus::Retrying);
        assert_eq!(actions, vec![AtomAction::ScheduleRetry { attempt: 2 }]);

        let (s, _) = step(s, AtomEvent::Route { tier: Tier::Balanced });
        assert_eq!(s, AtomStatus::Routed);

        let (s, actions) = step(AtomStatus::Validating, reject(3));
        assert_eq!(s, AtomStatus::Failed);
        assert!(actions.contains(&AtomAction::BlockDependents));
    }

    #[test]
    fn test_block_only_from_pending() {
        let block = AtomEvent::Block {
            blocked_by: vec!["a".to_string()],
        };
        let (s, actions) = step(AtomStatus::Pending, block.clone());
        assert_eq!(s, AtomStatus::Blocked);
        assert_eq!(
            actions[0],
            AtomAction::RecordBlockedBy {
                blocked_by: vec!["a".to_string()]
            }
        );
        assert!(transition(AtomStatus::Completed, block).is_err());
    }

    #[test]
    fn test_invalid_transitions_are_errors() {
        let cases = [
            (AtomStatus::Pending, AtomEvent::Infer),
            (AtomStatus::Routed, AtomEvent::Validate),
            (AtomStatus::Completed, AtomEvent::Route { tier: Tier::Heavy }),
            (AtomStatus::Failed, AtomEvent::Route { tier: Tier::Heavy }),
            (
                AtomStatus::Inferred,
                AtomEvent::Accept {
                    score: 99.0,
                    learn: true,
                },
            ),
            (AtomStatus::Blocked, AtomEvent::Route { tier: Tier::Light }),
        ];
        for (status, event) in cases {
            let err = transition(status, event).unwrap_err();
            assert!(matches!(err, MosaicError::Scheduling(_)));
        }
    }
}
