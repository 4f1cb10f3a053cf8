//! Real-time event streaming for stage progress.

pub mod stage_progress;

pub use stage_progress::{
    StagePhase, StageProgressBroadcaster, StageProgressEvent, StageProgressTracker,
};
