use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::broadcast::StageProgressBroadcaster;
use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::db::{DatabaseError, SessionStore};
use crate::document::{DocumentId, DocumentStore, DocumentSummary};
use crate::error::{ExtractionError, ReviewError};
use crate::extraction::{content_type_for_path, ExtractionGateway, ExtractorRegistry};
use crate::llm::{self, GenerationError, LlmGateway};
use crate::prompts;
use crate::report::{self, CombinedReport};
use crate::stage::{StageId, StageRegistry, StageResult, StageStatus};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
use super::state::{BlockReason, Navigation, PipelinePhase, SessionId, SessionState};

/// Shared, immutable wiring for every session: the stage table, the
/// gateways and the optional store and broadcaster.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<StageRegistry>,
    config: Arc<PipelineConfig>,
    gateway: Arc<dyn LlmGateway>,
    extractor: Arc<dyn ExtractionGateway>,
    store: Option<SessionStore>,
    broadcaster: Option<StageProgressBroadcaster>,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            registry: Arc::new(StageRegistry::standard()),
            config: Arc::new(PipelineConfig::default()),
            gateway,
            extractor: Arc::new(ExtractorRegistry::new()),
            store: None,
            broadcaster: None,
        }
    }

    /// Production constructor: builds the LLM gateway from config.
    pub fn from_config(config: &Config) -> Result<Self, ReviewError> {
        let gateway = llm::create_gateway(&config.llm)?;
        Ok(Self::new(gateway).with_config(PipelineConfig::from_config(config)))
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ExtractionGateway>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: StageProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    /// Starts an empty session (phase `Idle`).
    pub fn start_session(&self) -> Arc<Session> {
        let session = Session::new(SessionId::new(), self);
        session.persist_session(&session.lock());
        info!(session_id = %session.id, "Session started");
        Arc::new(session)
    }

    /// Rebuilds a session from the store.
    ///
    /// Pending results are dropped: their calls ended with the process
    /// that started them.
    pub fn restore_session(&self, id: SessionId) -> Result<Arc<Session>, PipelineError> {
        let store = self.store.as_ref().ok_or(PipelineError::SessionNotFound(id))?;
        let stored = store
            .load_session(id)?
            .ok_or(PipelineError::SessionNotFound(id))?;

        let session = Session::new(id, self);
        let mut stale = Vec::new();
        {
            let mut inner = session.lock();
            let document_id = stored.document.as_ref().map(|d| d.id);
            if let Some(document) = stored.document {
                inner.documents.restore(document);
            }
            for result in stored.results {
                let usable = Some(result.document_id) == document_id
                    && !matches!(result.status, StageStatus::Pending)
                    && self.registry.contains(result.stage);
                if usable {
                    inner.cache.put(result);
                } else {
                    stale.push(result.stage);
                }
            }
            inner.state = stored.state;
            if !self.registry.contains(inner.state.current) {
                inner.state.current = session.first_stage();
            }
        }

        if !stale.is_empty() {
            session.mirror("drop stale results", |s| s.delete_results(id, &stale));
        }
        info!(
            session_id = %id,
            dropped = stale.len(),
            "Session restored"
        );
        Ok(Arc::new(session))
    }
}

struct RunningStage {
    stage: StageId,
    run_id: Uuid,
    token: CancellationToken,
}

struct SessionInner {
    documents: DocumentStore,
    cache: AnalysisCache,
    state: SessionState,
    running: Option<RunningStage>,
}

/// A stage call that has been set up and is ready to go to the gateway.
/// Clears the in-flight marker if the future driving a run is dropped
/// before it finishes.
struct RunGuard<'a> {
    session: &'a Session,
    run_id: Uuid,
    armed: bool,
}

impl RunGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon_run(self.run_id);
        }
    }
}

struct StartedRun {
    stage: StageId,
    ordinal: u32,
    run_id: Uuid,
    token: CancellationToken,
    prompt: String,
    pending: StageResult,
}

enum Begin {
    Cached(StageResult),
    Started(StartedRun),
}

/// One user's walk through the stages for one document.
///
/// All state sits behind a mutex that is never held across the gateway
/// call. At most one stage call is in flight per session.
pub struct Session {
    id: SessionId,
    registry: Arc<StageRegistry>,
    config: Arc<PipelineConfig>,
    gateway: Arc<dyn LlmGateway>,
    extractor: Arc<dyn ExtractionGateway>,
    store: Option<SessionStore>,
    progress: Arc<dyn ProgressReporter>,
    inner: Mutex<SessionInner>,
}

impl Session {
    fn new(id: SessionId, pipeline: &Pipeline) -> Self {
        let progress: Arc<dyn ProgressReporter> = match &pipeline.broadcaster {
            Some(b) => Arc::new(BroadcastProgress::new(b.track_session(&id.to_string()))),
            None => Arc::new(NoopProgress),
        };
        let first = pipeline
            .registry
            .first()
            .unwrap_or(StageId::ComponentAnalysis);

        Self {
            id,
            registry: Arc::clone(&pipeline.registry),
            config: Arc::clone(&pipeline.config),
            gateway: Arc::clone(&pipeline.gateway),
            extractor: Arc::clone(&pipeline.extractor),
            store: pipeline.store.clone(),
            progress,
            inner: Mutex::new(SessionInner {
                documents: DocumentStore::new(),
                cache: AnalysisCache::new(),
                state: SessionState::new(first, pipeline.config.default_optional.clone()),
                running: None,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    // State is consistent between mutations, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn first_stage(&self) -> StageId {
        self.registry.first().unwrap_or(StageId::ComponentAnalysis)
    }

    // ---- Documents ----

    /// Extracts text from `bytes` and makes it the session's document.
    ///
    /// Extraction failure leaves the session untouched.
    pub async fn upload_document(
        &self,
        bytes: &[u8],
        content_type: &str,
        filename: &str,
    ) -> Result<DocumentId, ExtractionError> {
        let text = self
            .extractor
            .extract(bytes, content_type)
            .instrument(info_span!("upload_document", session_id = %self.id, filename))
            .await?;
        Ok(self.set_document(text, filename, content_type))
    }

    /// Reads a file and uploads it, guessing the content type from its name.
    pub async fn upload_file(&self, path: &Path) -> Result<DocumentId, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = content_type_for_path(path);
        self.upload_document(&bytes, &content_type, &filename).await
    }

    /// Replaces the document with already extracted text.
    ///
    /// Cancels any running stage, empties the cache and moves back to the
    /// first stage with the default optional selection.
    pub fn set_document(&self, text: String, filename: &str, content_type: &str) -> DocumentId {
        let mut inner = self.lock();
        let cancelled = self.cancel_in_flight(&mut inner);
        let invalidated = inner.cache.invalidate_all();
        let document_id = inner.documents.set_document(text, filename, content_type);

        inner.state = SessionState::new(self.first_stage(), self.config.default_optional.clone());
        inner.state.document_id = Some(document_id);

        self.mirror("clear results", |s| s.clear_results(self.id));
        self.persist_session(&inner);
        drop(inner);

        if let Some(stage) = cancelled {
            self.progress.report(ProgressEvent::Cancelled { stage });
        }
        if !invalidated.is_empty() {
            self.progress.report(ProgressEvent::Invalidated {
                stages: invalidated,
            });
        }
        info!(
            session_id = %self.id,
            document_id = %document_id,
            filename,
            "Document loaded"
        );
        document_id
    }

    pub fn document_summary(&self) -> Option<DocumentSummary> {
        self.lock().documents.document().map(|d| d.summary())
    }

    // ---- Running stages ----

    /// Whether `stage` could run now: a document is loaded and every
    /// required prerequisite is Completed.
    pub fn can_run(&self, stage: StageId) -> bool {
        let inner = self.lock();
        inner.documents.has_document() && self.missing_in(&inner, stage).is_empty()
    }

    /// Required prerequisites of `stage` that are not Completed.
    pub fn missing_prerequisites(&self, stage: StageId) -> Vec<StageId> {
        self.missing_in(&self.lock(), stage)
    }

    fn missing_in(&self, inner: &SessionInner, stage: StageId) -> Vec<StageId> {
        self.registry
            .prerequisites_of(stage)
            .iter()
            .copied()
            .filter(|p| !inner.cache.is_complete(*p))
            .collect()
    }

    /// Runs `stage`, or returns its cached result if it already completed
    /// for the current document.
    ///
    /// A gateway failure is recorded and returned as a Failed result, not
    /// as an error.
    pub async fn run_stage(
        &self,
        stage: StageId,
        extra_input: Option<&str>,
    ) -> Result<StageResult, PipelineError> {
        self.execute(stage, extra_input, false).await
    }

    /// Discards `stage` and everything downstream of it, then runs it again.
    pub async fn rerun_stage(
        &self,
        stage: StageId,
        extra_input: Option<&str>,
    ) -> Result<StageResult, PipelineError> {
        self.execute(stage, extra_input, true).await
    }

    async fn execute(
        &self,
        stage: StageId,
        extra_input: Option<&str>,
        force: bool,
    ) -> Result<StageResult, PipelineError> {
        let run = match self.begin(stage, extra_input, force)? {
            Begin::Cached(result) => {
                debug!(session_id = %self.id, stage = %stage, "Reusing completed result");
                return Ok(result);
            }
            Begin::Started(run) => run,
        };
        let guard = RunGuard {
            session: self,
            run_id: run.run_id,
            armed: true,
        };

        let generation = self.config.generation_for(stage);
        let timeout = self.config.timeout_for(stage);
        let span = info_span!(
            "run_stage",
            session_id = %self.id,
            stage = %stage,
            prompt_chars = run.prompt.len()
        );

        let outcome = async {
            tokio::select! {
                biased;
                _ = run.token.cancelled() => None,
                result = tokio::time::timeout(timeout, self.gateway.generate(&run.prompt, &generation)) => {
                    Some(result.unwrap_or_else(|_| Err(GenerationError::Timeout)))
                }
            }
        }
        .instrument(span)
        .await;

        guard.disarm();
        self.finish(run, outcome)
    }

    fn begin(
        &self,
        stage: StageId,
        extra_input: Option<&str>,
        force: bool,
    ) -> Result<Begin, PipelineError> {
        let definition = self
            .registry
            .definition(stage)
            .ok_or(PipelineError::UnknownStage(stage))?;

        let mut inner = self.lock();
        if let Some(running) = &inner.running {
            return Err(PipelineError::StageBusy {
                running: running.stage,
            });
        }
        let document = inner.documents.document().ok_or(PipelineError::NoDocument)?;
        let document_id = document.id;

        let missing = self.missing_in(&inner, stage);
        if !missing.is_empty() {
            return Err(PipelineError::PrerequisiteNotMet { stage, missing });
        }

        if !force {
            if let Some(result) = inner.cache.get(stage) {
                if result.is_completed() && result.document_id == document_id {
                    return Ok(Begin::Cached(result.clone()));
                }
            }
        }

        // Inputs always precede the stage, so invalidating dependents
        // below cannot change what goes into this prompt.
        let prompt =
            prompts::build_prompt(definition, &self.registry, document, &inner.cache, extra_input);

        let invalidated = inner.cache.invalidate(&self.registry.dependents_of(stage));
        let pending = StageResult::pending(stage, document_id, extra_input.map(str::to_string));
        inner.cache.put(pending.clone());
        inner.state.current = stage;

        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        inner.running = Some(RunningStage {
            stage,
            run_id,
            token: token.clone(),
        });

        if !invalidated.is_empty() {
            self.mirror("delete invalidated results", |s| {
                s.delete_results(self.id, &invalidated)
            });
        }
        self.mirror("save pending result", |s| {
            s.save_result(self.id, definition.ordinal, &pending)
        });
        self.persist_session(&inner);
        drop(inner);

        if !invalidated.is_empty() {
            info!(
                session_id = %self.id,
                stage = %stage,
                invalidated = ?invalidated,
                "Discarded downstream results"
            );
            self.progress.report(ProgressEvent::Invalidated {
                stages: invalidated,
            });
        }
        self.progress.report(ProgressEvent::Started { stage });

        Ok(Begin::Started(StartedRun {
            stage,
            ordinal: definition.ordinal,
            run_id,
            token,
            prompt,
            pending,
        }))
    }

    fn finish(
        &self,
        run: StartedRun,
        outcome: Option<Result<String, GenerationError>>,
    ) -> Result<StageResult, PipelineError> {
        let stage = run.stage;
        let mut inner = self.lock();
        let is_current = inner
            .running
            .as_ref()
            .is_some_and(|r| r.run_id == run.run_id);

        let outcome = match outcome {
            Some(outcome) if is_current => outcome,
            _ => {
                // Whoever cancelled the run already cleared the marker and
                // the Pending entry.
                drop(inner);
                debug!(session_id = %self.id, stage = %stage, "Discarding cancelled run");
                return Err(PipelineError::Cancelled { stage });
            }
        };

        inner.running = None;
        let result = match outcome {
            Ok(text) => {
                info!(
                    session_id = %self.id,
                    stage = %stage,
                    output_chars = text.len(),
                    "Stage completed"
                );
                run.pending.complete(text, self.gateway.model_name())
            }
            Err(e) => {
                warn!(session_id = %self.id, stage = %stage, error = %e, "Stage failed");
                run.pending.fail(e.to_string())
            }
        };
        inner.cache.put(result.clone());
        self.mirror("save stage result", |s| {
            s.save_result(self.id, run.ordinal, &result)
        });
        drop(inner);

        match &result.status {
            StageStatus::Failed(reason) => self.progress.report(ProgressEvent::Failed {
                stage,
                reason: reason.clone(),
            }),
            _ => self.progress.report(ProgressEvent::Completed {
                stage,
                output_chars: result.output.len(),
            }),
        }
        Ok(result)
    }

    /// Cancels the in-flight stage call, if any, and drops its Pending
    /// result.
    pub fn cancel_running(&self) -> Option<StageId> {
        let mut inner = self.lock();
        let cancelled = self.cancel_in_flight(&mut inner);
        drop(inner);

        if let Some(stage) = cancelled {
            info!(session_id = %self.id, stage = %stage, "Stage run cancelled");
            self.progress.report(ProgressEvent::Cancelled { stage });
        }
        cancelled
    }

    /// Drops a run whose caller went away, unless something else already
    /// took its place.
    fn abandon_run(&self, run_id: Uuid) {
        let mut inner = self.lock();
        if !inner.running.as_ref().is_some_and(|r| r.run_id == run_id) {
            return;
        }
        let cancelled = self.cancel_in_flight(&mut inner);
        drop(inner);

        if let Some(stage) = cancelled {
            info!(session_id = %self.id, stage = %stage, "Stage run abandoned by caller");
            self.progress.report(ProgressEvent::Cancelled { stage });
        }
    }

    fn cancel_in_flight(&self, inner: &mut SessionInner) -> Option<StageId> {
        let running = inner.running.take()?;
        running.token.cancel();
        if matches!(inner.cache.status(running.stage), StageStatus::Pending) {
            inner.cache.remove(running.stage);
            self.mirror("drop pending result", |s| {
                s.delete_results(self.id, &[running.stage])
            });
        }
        Some(running.stage)
    }

    pub fn running_stage(&self) -> Option<StageId> {
        self.lock().running.as_ref().map(|r| r.stage)
    }

    // ---- Navigation ----

    /// Moves to the next stage the user should see.
    pub fn advance(&self) -> Navigation {
        let inner = self.lock();
        if !inner.documents.has_document() {
            return Navigation::NoDocument;
        }

        let current = inner.state.current;
        let current_optional = self
            .registry
            .definition(current)
            .is_some_and(|d| d.optional);
        if !current_optional && !inner.cache.is_complete(current) {
            return Navigation::Blocked(BlockReason::CurrentIncomplete(current));
        }

        let mut candidate = self.registry.next_after(current);
        while let Some(next) = candidate {
            let optional = self.registry.definition(next).is_some_and(|d| d.optional);
            let missing = self.missing_in(&inner, next);

            if optional {
                if inner.state.selected_optional.contains(&next) && missing.is_empty() {
                    return self.move_to(inner, next);
                }
                debug!(session_id = %self.id, stage = %next, "Skipping optional stage");
                candidate = self.registry.next_after(next);
                continue;
            }

            if !missing.is_empty() {
                return Navigation::Blocked(BlockReason::PrerequisitesMissing {
                    stage: next,
                    missing,
                });
            }
            return self.move_to(inner, next);
        }
        Navigation::Finished
    }

    /// Moves to the previous mandatory or selected stage. Results are kept.
    pub fn retreat(&self) -> Navigation {
        let inner = self.lock();
        if !inner.documents.has_document() {
            return Navigation::NoDocument;
        }

        let mut candidate = self.registry.previous_before(inner.state.current);
        while let Some(previous) = candidate {
            let optional = self
                .registry
                .definition(previous)
                .is_some_and(|d| d.optional);
            if !optional || inner.state.selected_optional.contains(&previous) {
                return self.move_to(inner, previous);
            }
            candidate = self.registry.previous_before(previous);
        }
        Navigation::AtStart
    }

    fn move_to(&self, mut inner: MutexGuard<'_, SessionInner>, stage: StageId) -> Navigation {
        let leaving_run = inner.running.as_ref().is_some_and(|r| r.stage != stage);
        let cancelled = if leaving_run {
            self.cancel_in_flight(&mut inner)
        } else {
            None
        };
        inner.state.current = stage;
        self.persist_session(&inner);
        drop(inner);

        if let Some(stage) = cancelled {
            self.progress.report(ProgressEvent::Cancelled { stage });
        }
        Navigation::Moved(stage)
    }

    /// Includes or excludes an optional stage. Deselecting keeps any result
    /// the stage already produced.
    pub fn select_optional(&self, stage: StageId, selected: bool) -> Result<(), PipelineError> {
        let definition = self
            .registry
            .definition(stage)
            .ok_or(PipelineError::UnknownStage(stage))?;
        if !definition.optional {
            return Err(PipelineError::NotOptional(stage));
        }

        let mut inner = self.lock();
        let changed = if selected {
            inner.state.selected_optional.insert(stage)
        } else {
            inner.state.selected_optional.remove(&stage)
        };
        if changed {
            self.persist_session(&inner);
        }
        Ok(())
    }

    pub fn selected_optional(&self) -> BTreeSet<StageId> {
        self.lock().state.selected_optional.clone()
    }

    /// Cancels any call and returns the session to `Idle`.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let cancelled = self.cancel_in_flight(&mut inner);
        inner.documents.clear();
        let invalidated = inner.cache.invalidate_all();
        inner.state = SessionState::new(self.first_stage(), self.config.default_optional.clone());

        self.mirror("clear results", |s| s.clear_results(self.id));
        self.persist_session(&inner);
        drop(inner);

        if let Some(stage) = cancelled {
            self.progress.report(ProgressEvent::Cancelled { stage });
        }
        if !invalidated.is_empty() {
            self.progress.report(ProgressEvent::Invalidated {
                stages: invalidated,
            });
        }
        info!(session_id = %self.id, "Session reset");
    }

    // ---- Queries ----

    pub fn phase(&self) -> PipelinePhase {
        let inner = self.lock();
        if !inner.documents.has_document() {
            return PipelinePhase::Idle;
        }
        if let Some(running) = &inner.running {
            return PipelinePhase::Running(running.stage);
        }

        let all_done = self
            .registry
            .stages()
            .iter()
            .filter(|d| !d.optional || inner.state.selected_optional.contains(&d.id))
            .all(|d| inner.cache.is_complete(d.id));
        if all_done {
            return PipelinePhase::AllDone;
        }

        let current = inner.state.current;
        match inner.cache.status(current) {
            StageStatus::Completed => PipelinePhase::StageDone(current),
            StageStatus::Failed(reason) => PipelinePhase::StageFailed(current, reason),
            StageStatus::Pending => PipelinePhase::Ready,
        }
    }

    pub fn current_stage(&self) -> StageId {
        self.lock().state.current
    }

    pub fn stage_status(&self, stage: StageId) -> StageStatus {
        self.lock().cache.status(stage)
    }

    pub fn stage_result(&self, stage: StageId) -> Option<StageResult> {
        self.lock().cache.get(stage).cloned()
    }

    pub fn combined_report(&self) -> CombinedReport {
        let inner = self.lock();
        report::assemble(
            &self.registry,
            &inner.cache,
            inner.documents.document(),
            &self.config.report_title,
        )
    }

    // ---- Persistence ----

    fn persist_session(&self, inner: &SessionInner) {
        self.mirror("save session", |s| {
            s.save_session(self.id, &inner.state, inner.documents.document())
        });
    }

    /// Runs a store write if a store is attached. Failures are logged and
    /// never reach the caller.
    fn mirror<T>(&self, what: &str, f: impl FnOnce(&SessionStore) -> Result<T, DatabaseError>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = f(store) {
            warn!(session_id = %self.id, error = %e, "Failed to {}", what);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
