pub mod broadcast;
pub mod cache;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod secrets;
pub mod stage;

pub use broadcast::{StagePhase, StageProgressBroadcaster, StageProgressEvent};
pub use cache::AnalysisCache;
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError, SessionStore};
pub use document::{Document, DocumentId, DocumentStore, DocumentSummary};
pub use error::{ConfigError, ExportError, ExtractionError, Result, ReviewError};
pub use extraction::{ExtractionGateway, ExtractorRegistry};
pub use llm::{GenerationConfig, GenerationError, LlmGateway};
pub use pipeline::{
    BlockReason, Navigation, Pipeline, PipelineConfig, PipelineError, PipelinePhase, Session, SessionId,
    SessionManager,
};
pub use report::{CombinedReport, ReportSection};
pub use secrets::{resolve_secret, SecretError};
pub use stage::{StageDefinition, StageId, StageRegistry, StageResult, StageStatus};
