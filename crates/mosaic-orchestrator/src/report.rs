//! Final report of a plan run

use mosaic_core::{AtomStatus, AtomicTask, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
    Succeeded,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PlanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartialSuccess => write!(f, "partial success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedAtom {
    pub id: String,
    pub attempts: u32,
    pub score: f64,
    pub tier: Option<Tier>,
    /// Learned pattern the accepted code was adapted from
    pub pattern_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAtom {
    pub id: String,
    pub attempts: u32,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAtom {
    pub id: String,
    pub blocked_by: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub plan_id: String,
    pub outcome: PlanOutcome,
    pub levels: Vec<Vec<String>>,
    pub completed: Vec<CompletedAtom>,
    pub failed: Vec<FailedAtom>,
    pub blocked: Vec<BlockedAtom>,
    /// Atoms never resolved because the run was cancelled
    pub unresolved: Vec<String>,
    pub patterns_learned: Vec<String>,
    pub duration_ms: u64,
    pub warnings: Vec<String>,
}

impl PlanReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.blocked.len() + self.unresolved.len()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PlanOutcome::Succeeded
    }

    pub fn completed_atom(&self, id: &str) -> Option<&CompletedAtom> {
        self.completed.iter().find(|a| a.id == id)
    }

    pub fn failed_atom(&self, id: &str) -> Option<&FailedAtom> {
        self.failed.iter().find(|a| a.id == id)
    }

    pub fn blocked_atom(&self, id: &str) -> Option<&BlockedAtom> {
        self.blocked.iter().find(|a| a.id == id)
    }
}

/// Outcome from final atom states
pub(crate) fn outcome_of(completed: usize, total: usize, cancelled: bool) -> PlanOutcome {
    if cancelled {
        PlanOutcome::Cancelled
    } else if completed == total {
        PlanOutcome::Succeeded
    } else if completed == 0 {
        PlanOutcome::Failed
    } else {
        PlanOutcome::PartialSuccess
    }
}

/// Collects per-atom results as the run resolves them
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    pub pattern_ids: BTreeMap<String, String>,
    pub blocked_by: BTreeMap<String, BTreeSet<String>>,
    pub patterns_learned: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReportBuilder {
    pub fn build(
        self,
        plan_id: &str,
        levels: Vec<Vec<String>>,
        atoms: &BTreeMap<String, AtomicTask>,
        cancelled: bool,
        duration_ms: u64,
    ) -> PlanReport {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut blocked = Vec::new();
        let mut unresolved = Vec::new();

        for (id, atom) in atoms {
            match atom.status {
                AtomStatus::Completed => {
                    let last = atom.attempts.last();
                    completed.push(CompletedAtom {
                        id: id.clone(),
                        attempts: atom.attempt_count(),
                        score: last.and_then(|a| a.score).unwrap_or(0.0),
                        tier: last.and_then(|a| a.tier),
                        pattern_id: self.pattern_ids.get(id).cloned(),
                    });
                }
                AtomStatus::Failed => failed.push(FailedAtom {
                    id: id.clone(),
                    attempts: atom.attempt_count(),
                    violations: atom.last_violations().to_vec(),
                }),
                AtomStatus::Blocked => blocked.push(BlockedAtom {
                    id: id.clone(),
                    blocked_by: self.blocked_by.get(id).cloned().unwrap_or_default(),
                }),
                _ => unresolved.push(id.clone()),
            }
        }

        let outcome = outcome_of(completed.len(), atoms.len(), cancelled);
        PlanReport {
            plan_id: plan_id.to_string(),
            outcome,
            levels,
            completed,
            failed,
            blocked,
            unresolved,
            patterns_learned: self.patterns_learned,
            duration_ms,
            warnings: self.warnings,
        }
    }
}

impl std::fmt::Display for PlanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Plan {}: {}", self.plan_id, self.outcome)?;
        writeln!(
            f,
            "  Atoms: {} completed, {} failed, {} blocked, {} unresolved",
            self.completed.len(),
            self.failed.len(),
            self.blocked.len(),
            self.unresolved.len()
        )?;
        writeln!(f, "  Levels: {}", self.levels.len())?;
        writeln!(f, "  Patterns learned: {}", self.patterns_learned.len())?;
        writeln!(f, "  Duration: {}ms", self.duration_ms)?;

        if !self.completed.is_empty() {
            writeln!(f, "\nCompleted:")?;
            for atom in &self.completed {
                let tier = atom.tier.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
                write!(
                    f,
                    "  ✓ {} (score {:.1}, {} attempt(s), {})",
                    atom.id, atom.score, atom.attempts, tier
                )?;
                if let Some(pattern) = &atom.pattern_id {
                    write!(f, " adapted from {}", pattern)?;
                }
                writeln!(f)?;
            }
        }

        if !self.failed.is_empty() {
            writeln!(f, "\nFailed:")?;
            for atom in &self.failed {
                writeln!(f, "  ✗ {} after {} attempt(s)", atom.id, atom.attempts)?;
                for violation in &atom.violations {
                    writeln!(f, "      - {}", violation)?;
                }
            }
        }

        if !self.blocked.is_empty() {
            writeln!(f, "\nBlocked:")?;
            for atom in &self.blocked {
                let by: Vec<&str> = atom.blocked_by.iter().map(String::as_str).collect();
                writeln!(f, "  ⊘ {} (blocked by {})", atom.id, by.join(", "))?;
            }
        }

        if !self.unresolved.is_empty() {
            writeln!(f, "\nUnresolved:")?;
            for id in &self.unresolved {
                writeln!(f, "  … {}", id)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  ! {}", warning)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_of() {
        assert_eq!(outcome_of(3, 3, false), PlanOutcome::Succeeded);
        assert_eq!(outcome_of(0, 0, false), PlanOutcome::Succeeded);
        assert_eq!(outcome_of(1, 3, false), PlanOutcome::PartialSuccess);
        assert_eq!(outcome_of(0, 3, false), PlanOutcome::Failed);
        assert_eq!(outcome_of(3, 3, true), PlanOutcome::Cancelled);
    }

    #[test]
    fn test_display_lists_blockers() {
        let report = PlanReport {
            plan_id: "p".to_string(),
            outcome: PlanOutcome::PartialSuccess,
            levels: vec![vec!["a".to_string()], vec!["b".to_string()]],
            completed: vec![],
            failed: vec![FailedAtom {
                id: "a".to_string(),
                attempts: 3,
                violations: vec!["placeholders: todo!()".to_string()],
            }],
            blocked: vec![BlockedAtom {
                id: "b".to_string(),
                blocked_by: ["a".to_string()].into_iter().collect(),
            }],
            unresolved: vec![],
            patterns_learned: vec![],
            duration_ms: 12,
            warnings: vec![],
        };
        let text = report.to_string();
        assert!(text.contains("Plan p: partial success"));
        assert!(text.contains("✗ a after 3 attempt(s)"));
        assert!(text.contains("⊘ b (blocked by a)"));
        assert_eq!(report.total(), 2);
    }
}
