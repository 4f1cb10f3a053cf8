//! Typed session persistence on top of the row-level repositories.

use chrono::{DateTime, Utc};

use super::session_repo::{self, SessionRow};
use super::stage_repo::{self, StageResultRow};
use super::{Database, DatabaseError};
use crate::document::{Document, DocumentId};
use crate::pipeline::{SessionId, SessionState};
use crate::stage::{StageId, StageResult, StageStatus};

/// A session as read back from the database.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: SessionId,
    pub document: Option<Document>,
    pub state: SessionState,
    pub results: Vec<StageResult>,
    pub updated_at: DateTime<Utc>,
}

/// Short listing entry for `list_sessions`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionListing {
    pub id: SessionId,
    pub filename: Option<String>,
    pub current_stage: StageId,
    pub updated_at: DateTime<Utc>,
}

/// Persists sessions and their stage results.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn save_session(
        &self,
        id: SessionId,
        state: &SessionState,
        document: Option<&Document>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let selected: Vec<&str> = state.selected_optional.iter().map(StageId::as_str).collect();
        let selected = serde_json::to_string(&selected)
            .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;

        let row = SessionRow {
            id: id.to_string(),
            document_id: document.map(|d| d.id.to_string()),
            filename: document.map(|d| d.filename.clone()),
            content_type: document.map(|d| d.content_type.clone()),
            document_text: document.map(|d| d.text.clone()),
            extracted_at: document.map(|d| d.extracted_at.to_rfc3339()),
            current_stage: state.current.as_str().to_string(),
            selected_optional: selected,
            created_at: now.clone(),
            updated_at: now,
        };
        session_repo::upsert(&self.db, &row)
    }

    pub fn load_session(&self, id: SessionId) -> Result<Option<StoredSession>, DatabaseError> {
        let Some(row) = session_repo::find_by_id(&self.db, &id.to_string())? else {
            return Ok(None);
        };

        let results = stage_repo::list_for_session(&self.db, &row.id)?
            .into_iter()
            .map(result_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let document = document_from_row(&row)?;
        let selected: Vec<String> = serde_json::from_str(&row.selected_optional)
            .map_err(|e| DatabaseError::InvalidRow(format!("selected_optional: {}", e)))?;
        let selected_optional = selected
            .iter()
            .map(|s| parse_stage(s))
            .collect::<Result<_, _>>()?;

        let mut state = SessionState::new(parse_stage(&row.current_stage)?, selected_optional);
        state.document_id = document.as_ref().map(|d| d.id);

        Ok(Some(StoredSession {
            id,
            document,
            state,
            results,
            updated_at: parse_time(&row.updated_at)?,
        }))
    }

    pub fn delete_session(&self, id: SessionId) -> Result<bool, DatabaseError> {
        session_repo::delete(&self.db, &id.to_string())
    }

    pub fn list_sessions(&self, limit: u64) -> Result<Vec<SessionListing>, DatabaseError> {
        session_repo::list_recent(&self.db, limit)?
            .into_iter()
            .map(|row| {
                Ok(SessionListing {
                    id: row
                        .id
                        .parse()
                        .map_err(|_| DatabaseError::InvalidRow(format!("session id '{}'", row.id)))?,
                    filename: row.filename,
                    current_stage: parse_stage(&row.current_stage)?,
                    updated_at: parse_time(&row.updated_at)?,
                })
            })
            .collect()
    }

    pub fn save_result(
        &self,
        session: SessionId,
        ordinal: u32,
        result: &StageResult,
    ) -> Result<(), DatabaseError> {
        let row = StageResultRow {
            session_id: session.to_string(),
            stage_id: result.stage.as_str().to_string(),
            ordinal,
            document_id: result.document_id.to_string(),
            status: result.status.as_str().to_string(),
            output: result.output.clone(),
            error: result.status.failure_reason().map(str::to_string),
            extra_input: result.extra_input.clone(),
            model: result.model.clone(),
            started_at: result.started_at.to_rfc3339(),
            completed_at: result.completed_at.map(|t| t.to_rfc3339()),
        };
        stage_repo::upsert(&self.db, &row)
    }

    pub fn delete_results(
        &self,
        session: SessionId,
        stages: &[StageId],
    ) -> Result<usize, DatabaseError> {
        let ids: Vec<&str> = stages.iter().map(StageId::as_str).collect();
        stage_repo::delete_stages(&self.db, &session.to_string(), &ids)
    }

    pub fn clear_results(&self, session: SessionId) -> Result<usize, DatabaseError> {
        stage_repo::delete_for_session(&self.db, &session.to_string())
    }

    pub fn load_results(&self, session: SessionId) -> Result<Vec<StageResult>, DatabaseError> {
        stage_repo::list_for_session(&self.db, &session.to_string())?
            .into_iter()
            .map(result_from_row)
            .collect()
    }
}

fn parse_stage(s: &str) -> Result<StageId, DatabaseError> {
    s.parse()
        .map_err(|_| DatabaseError::InvalidRow(format!("unknown stage '{}'", s)))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidRow(format!("timestamp '{}': {}", s, e)))
}

fn parse_document_id(s: &str) -> Result<DocumentId, DatabaseError> {
    s.parse()
        .map_err(|_| DatabaseError::InvalidRow(format!("document id '{}'", s)))
}

fn document_from_row(row: &SessionRow) -> Result<Option<Document>, DatabaseError> {
    let (Some(id), Some(filename), Some(content_type), Some(text), Some(extracted_at)) = (
        row.document_id.as_deref(),
        row.filename.as_ref(),
        row.content_type.as_ref(),
        row.document_text.as_ref(),
        row.extracted_at.as_deref(),
    ) else {
        return Ok(None);
    };

    Ok(Some(Document {
        id: parse_document_id(id)?,
        filename: filename.clone(),
        content_type: content_type.clone(),
        text: text.clone(),
        extracted_at: parse_time(extracted_at)?,
    }))
}

fn result_from_row(row: StageResultRow) -> Result<StageResult, DatabaseError> {
    let status = match row.status.as_str() {
        "pending" => StageStatus::Pending,
        "completed" => StageStatus::Completed,
        "failed" => StageStatus::Failed(row.error.clone().unwrap_or_default()),
        other => {
            return Err(DatabaseError::InvalidRow(format!(
                "unknown stage status '{}'",
                other
            )))
        }
    };

    Ok(StageResult {
        stage: parse_stage(&row.stage_id)?,
        document_id: parse_document_id(&row.document_id)?,
        status,
        output: row.output,
        extra_input: row.extra_input,
        model: row.model,
        started_at: parse_time(&row.started_at)?,
        completed_at: row.completed_at.as_deref().map(parse_time).transpose()?,
    })
}
