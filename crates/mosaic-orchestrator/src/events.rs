//! Progress events - observable milestones of a plan run
//!
//! Sinks are a side channel: emission is fail-open and a slow or broken sink
//! never stalls the level loop for longer than its own `emit` call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mosaic_core::fail_open::fail_open;
use mosaic_core::{MosaicError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Kind of progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    PassCompleted,
    LevelStarted,
    LevelCompleted,
    AtomTransition,
    PatternLearned,
    PlanCompleted,
    PlanFailed,
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassCompleted => write!(f, "pass_completed"),
            Self::LevelStarted => write!(f, "level_started"),
            Self::LevelCompleted => write!(f, "level_completed"),
            Self::AtomTransition => write!(f, "atom_transition"),
            Self::PatternLearned => write!(f, "pattern_learned"),
            Self::PlanCompleted => write!(f, "plan_completed"),
            Self::PlanFailed => write!(f, "plan_failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for progress events
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: &ProgressEvent) -> Result<()>;
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<()> {
        info!(kind = %event.kind, payload = %event.payload, "progress");
        Ok(())
    }
}

/// Forwards events to a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end, buffered to `capacity` events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| MosaicError::Other("progress receiver dropped".to_string()))
    }
}

/// Emit without letting a sink failure escape
pub(crate) async fn emit(sink: &Arc<dyn ProgressSink>, kind: ProgressKind, payload: Value) {
    let event = ProgressEvent::new(kind, payload);
    fail_open("progress_emit", || sink.emit(&event)).await;
}
