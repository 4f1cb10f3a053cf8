use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use tracing::{debug, info};

use super::error::PipelineError;
use super::runner::{Pipeline, Session};
use super::state::SessionId;

/// Keeps live sessions in memory and drops the ones left idle.
///
/// An evicted session has its in-flight call cancelled. With a store
/// attached, `get` brings evicted or foreign sessions back from disk.
pub struct SessionManager {
    pipeline: Pipeline,
    sessions: Cache<SessionId, Arc<Session>>,
}

impl SessionManager {
    pub fn new(pipeline: Pipeline, idle_timeout: Duration) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(idle_timeout)
            .eviction_listener(
                |id: Arc<SessionId>, session: Arc<Session>, cause: RemovalCause| {
                    if let Some(stage) = session.cancel_running() {
                        info!(session_id = %id, stage = %stage, "Cancelled run of evicted session");
                    }
                    debug!(session_id = %id, ?cause, "Session evicted");
                },
            )
            .build();

        Self { pipeline, sessions }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn create(&self) -> Arc<Session> {
        let session = self.pipeline.start_session();
        self.sessions.insert(session.id(), Arc::clone(&session));
        session
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<Session>, PipelineError> {
        if let Some(session) = self.sessions.get(&id) {
            return Ok(session);
        }
        let session = self.pipeline.restore_session(id)?;
        self.sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Forgets a session. Its in-flight call, if any, is cancelled.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id)
    }

    pub fn len(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SessionStore};
    use crate::llm::FakeGateway;
    use crate::stage::StageId;

    fn manager() -> SessionManager {
        let store = SessionStore::new(Database::open_in_memory().unwrap());
        let pipeline = Pipeline::new(Arc::new(FakeGateway::default())).with_store(store);
        SessionManager::new(pipeline, Duration::from_secs(60))
    }

    #[test]
    fn test_create_and_get() {
        let manager = manager();
        let session = manager.create();
        let found = manager.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_get_unknown_session() {
        let manager = manager();
        let id = SessionId::new();
        assert!(matches!(
            manager.get(id),
            Err(PipelineError::SessionNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_removed_session_restores_from_store() {
        let manager = manager();
        let session = manager.create();
        session.set_document("Scope".into(), "rfp.txt", "text/plain");
        session
            .run_stage(StageId::ComponentAnalysis, None)
            .await
            .unwrap();

        let id = session.id();
        assert!(manager.remove(id).is_some());
        assert!(manager.is_empty());

        let restored = manager.get(id).unwrap();
        assert!(!Arc::ptr_eq(&session, &restored));
        assert!(restored
            .stage_status(StageId::ComponentAnalysis)
            .is_completed());
    }

    #[tokio::test]
    async fn test_remove_cancels_running_stage() {
        let pipeline = Pipeline::new(Arc::new(
            FakeGateway::default().with_delay(Duration::from_millis(500)),
        ));
        let manager = SessionManager::new(pipeline, Duration::from_secs(60));
        let session = manager.create();
        session.set_document("Scope".into(), "rfp.txt", "text/plain");

        let background = Arc::clone(&session);
        let handle = tokio::spawn(async move {
            background.run_stage(StageId::ComponentAnalysis, None).await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        manager.remove(session.id());
        manager.len();

        assert!(matches!(
            handle.await.unwrap(),
            Err(PipelineError::Cancelled { .. })
        ));
    }
}
