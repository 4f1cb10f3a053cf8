//! Stage progress broadcaster for following sessions live.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::stage::StageId;

/// Lifecycle phase of one stage run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// The stage's result was dropped because an input changed.
    Invalidated,
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagePhase::Queued => write!(f, "Queued"),
            StagePhase::Running => write!(f, "Running"),
            StagePhase::Completed => write!(f, "Completed"),
            StagePhase::Failed => write!(f, "Failed"),
            StagePhase::Cancelled => write!(f, "Cancelled"),
            StagePhase::Invalidated => write!(f, "Invalidated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgressEvent {
    pub session_id: String,
    pub stage: StageId,
    pub phase: StagePhase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Failure reason (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Length of the generated Markdown (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_chars: Option<usize>,
}

impl StageProgressEvent {
    pub fn new(session_id: &str, stage: StageId, phase: StagePhase, message: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage,
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
            output_chars: None,
        }
    }
}

/// Broadcasts stage progress events to any number of subscribers.
#[derive(Clone)]
pub struct StageProgressBroadcaster {
    sender: Arc<broadcast::Sender<StageProgressEvent>>,
}

impl StageProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: StageProgressEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker that stamps every event with `session_id`.
    pub fn track_session(&self, session_id: &str) -> StageProgressTracker {
        StageProgressTracker::new(session_id, Arc::clone(&self.sender))
    }
}

impl Default for StageProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits events for the stages of one session.
pub struct StageProgressTracker {
    session_id: String,
    sender: Arc<broadcast::Sender<StageProgressEvent>>,
}

impl StageProgressTracker {
    pub fn new(session_id: &str, sender: Arc<broadcast::Sender<StageProgressEvent>>) -> Self {
        Self {
            session_id: session_id.to_string(),
            sender,
        }
    }

    pub fn update_phase(&self, stage: StageId, phase: StagePhase, message: &str) {
        let event = StageProgressEvent::new(&self.session_id, stage, phase, message);
        let _ = self.sender.send(event);
    }

    pub fn completed(&self, stage: StageId, output_chars: usize) {
        let mut event = StageProgressEvent::new(
            &self.session_id,
            stage,
            StagePhase::Completed,
            "Stage completed",
        );
        event.output_chars = Some(output_chars);
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, stage: StageId, reason: &str) {
        let mut event =
            StageProgressEvent::new(&self.session_id, stage, StagePhase::Failed, "Stage failed");
        event.error = Some(reason.to_string());
        let _ = self.sender.send(event);
    }
}
