//! # mosaic-orchestrator
//!
//! Plan execution engine for Mosaic.
//!
//! This crate provides:
//! - A pure per-atom state machine
//! - Level-parallel execution on a bounded worker pool
//! - Retry, blocking and cancellation handling
//! - Pattern learning from accepted atoms
//! - Progress events and a task store boundary

mod events;
mod orchestrator;
mod report;
mod state_machine;
mod store;

pub use events::{ChannelSink, ProgressEvent, ProgressKind, ProgressSink, TracingSink};
pub use orchestrator::{AttemptResult, Orchestrator, WorkerEvent, WorkerStage};
pub use report::{BlockedAtom, CompletedAtom, FailedAtom, PlanOutcome, PlanReport};
pub use state_machine::{transition, AtomAction, AtomEvent};
pub use store::{JsonFileTaskStore, MemoryTaskStore, TaskStore};
