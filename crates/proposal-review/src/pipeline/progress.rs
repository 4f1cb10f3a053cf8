use crate::broadcast::stage_progress::{StagePhase, StageProgressTracker};
use crate::stage::StageId;

/// Events emitted by a session while it runs stages.
/// Stage output is omitted (can be large); only its length is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { stage: StageId },
    Completed { stage: StageId, output_chars: usize },
    Failed { stage: StageId, reason: String },
    Cancelled { stage: StageId },
    Invalidated { stages: Vec<StageId> },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for sessions nobody is watching.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges session events to the broadcast channel.
pub struct BroadcastProgress {
    tracker: StageProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: StageProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { stage } => {
                self.tracker
                    .update_phase(stage, StagePhase::Queued, "Stage queued");
                self.tracker
                    .update_phase(stage, StagePhase::Running, "Waiting for model response");
            }
            ProgressEvent::Completed {
                stage,
                output_chars,
            } => self.tracker.completed(stage, output_chars),
            ProgressEvent::Failed { stage, reason } => self.tracker.failed(stage, &reason),
            ProgressEvent::Cancelled { stage } => {
                self.tracker
                    .update_phase(stage, StagePhase::Cancelled, "Stage run cancelled")
            }
            ProgressEvent::Invalidated { stages } => {
                for stage in stages {
                    self.tracker.update_phase(
                        stage,
                        StagePhase::Invalidated,
                        "Result discarded after an input changed",
                    );
                }
            }
        }
    }
}
