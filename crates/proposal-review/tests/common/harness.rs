//! Test harness for isolated session execution.
//!
//! Each `TestHarness` owns a temp directory holding the SQLite database
//! and any input files, a scripted `FakeGateway`, and a progress
//! broadcaster.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use proposal_review::db::{Database, SessionStore};
use proposal_review::llm::FakeGateway;
use proposal_review::{
    Pipeline, PipelineConfig, Session, StageId, StageProgressBroadcaster, StageRegistry,
};

pub const SAMPLE_PROPOSAL: &str = "\
Technical and Price Proposal\n\
Offeror: Northwind Systems\n\
\n\
1. Cover Letter\n\
Northwind Systems submits this proposal for the network modernization effort.\n\
\n\
2. Pricing\n\
Labor: 4,200 hours at $145/hour. Materials: $82,000. Total: $691,000.\n";

/// The reply `scripted_gateway` gives for `stage`.
pub fn stage_reply(stage: StageId) -> String {
    format!("{} findings", stage)
}

/// A gateway answering each stage with `stage_reply(stage)`.
pub fn scripted_gateway() -> FakeGateway {
    let gateway = FakeGateway::new();
    for stage in StageId::ALL {
        gateway.add_response(&format!("stage: {}", stage), &stage_reply(stage));
    }
    gateway
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub gateway: Arc<FakeGateway>,
    pub broadcaster: StageProgressBroadcaster,
    pub store: SessionStore,
    config: PipelineConfig,
}

impl TestHarness {
    /// A harness whose gateway answers every stage.
    pub fn new() -> Self {
        Self::with_gateway(scripted_gateway())
    }

    pub fn with_gateway(gateway: FakeGateway) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("sessions.db"))
            .expect("Failed to open test database");

        Self {
            temp_dir,
            gateway: Arc::new(gateway),
            broadcaster: StageProgressBroadcaster::new(256),
            store: SessionStore::new(db),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// A fresh pipeline sharing this harness's gateway, store and broadcaster.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.gateway.clone())
            .with_config(self.config.clone())
            .with_store(self.store.clone())
            .with_broadcaster(self.broadcaster.clone())
    }

    /// Reopens the database file, as a restarted process would.
    pub fn reopened_pipeline(&self) -> Pipeline {
        let db = Database::open(&self.db_path()).expect("Failed to reopen test database");
        Pipeline::new(self.gateway.clone())
            .with_config(self.config.clone())
            .with_store(SessionStore::new(db))
    }

    pub fn session(&self) -> Arc<Session> {
        self.pipeline().start_session()
    }

    /// A session with `SAMPLE_PROPOSAL` loaded.
    pub fn loaded_session(&self) -> Arc<Session> {
        let session = self.session();
        session.set_document(SAMPLE_PROPOSAL.to_string(), "proposal.txt", "text/plain");
        session
    }

    pub fn registry(&self) -> StageRegistry {
        StageRegistry::standard()
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("sessions.db")
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Runs every stage in pipeline order.
    pub async fn run_all(&self, session: &Session) {
        for stage in StageId::ALL {
            let result = session
                .run_stage(stage, None)
                .await
                .unwrap_or_else(|e| panic!("run of {} failed: {}", stage, e));
            assert!(result.is_completed(), "{} did not complete", stage);
        }
    }

    /// Prompts the gateway received that were for `stage`.
    pub fn prompts_for(&self, stage: StageId) -> Vec<String> {
        let marker = format!("Analysis stage: {}\n", stage);
        self.gateway
            .calls()
            .into_iter()
            .filter(|p| p.starts_with(&marker))
            .collect()
    }
}
