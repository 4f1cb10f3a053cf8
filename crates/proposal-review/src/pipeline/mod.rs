pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod sessions;
pub mod state;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{Pipeline, Session};
pub use sessions::SessionManager;
pub use state::{BlockReason, Navigation, PipelinePhase, SessionId, SessionState};
