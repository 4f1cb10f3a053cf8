//! Stage result repository: CRUD operations for the `stage_results` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw stage result row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResultRow {
    pub session_id: String,
    pub stage_id: String,
    pub ordinal: u32,
    pub document_id: String,
    pub status: String,
    pub output: String,
    pub error: Option<String>,
    pub extra_input: Option<String>,
    pub model: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl StageResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            session_id: row.get("session_id")?,
            stage_id: row.get("stage_id")?,
            ordinal: row.get("ordinal")?,
            document_id: row.get("document_id")?,
            status: row.get("status")?,
            output: row.get("output")?,
            error: row.get("error")?,
            extra_input: row.get("extra_input")?,
            model: row.get("model")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Writes a stage result, replacing any previous one for the same stage.
pub fn upsert(db: &Database, row: &StageResultRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO stage_results (session_id, stage_id, ordinal, document_id, status,
             output, error, extra_input, model, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(session_id, stage_id) DO UPDATE SET
               ordinal = ?3,
               document_id = ?4,
               status = ?5,
               output = ?6,
               error = ?7,
               extra_input = ?8,
               model = ?9,
               started_at = ?10,
               completed_at = ?11",
            params![
                row.session_id,
                row.stage_id,
                row.ordinal,
                row.document_id,
                row.status,
                row.output,
                row.error,
                row.extra_input,
                row.model,
                row.started_at,
                row.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// All results for a session in pipeline order.
pub fn list_for_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<StageResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM stage_results WHERE session_id = ?1 ORDER BY ordinal ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], StageResultRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes the given stages' results. Returns the number of rows removed.
pub fn delete_stages(
    db: &Database,
    session_id: &str,
    stage_ids: &[&str],
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let mut removed = 0;
        let mut stmt =
            conn.prepare("DELETE FROM stage_results WHERE session_id = ?1 AND stage_id = ?2")?;
        for stage_id in stage_ids {
            removed += stmt.execute(params![session_id, stage_id])?;
        }
        Ok(removed)
    })
}

/// Deletes every result for a session.
pub fn delete_for_session(db: &Database, session_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM stage_results WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(removed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::session_repo::{self, SessionRow};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        session_repo::upsert(
            &db,
            &SessionRow {
                id: "s1".to_string(),
                document_id: None,
                filename: None,
                content_type: None,
                document_text: None,
                extracted_at: None,
                current_stage: "component_analysis".to_string(),
                selected_optional: "[]".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )
        .unwrap();
        db
    }

    fn sample_result(stage_id: &str, ordinal: u32) -> StageResultRow {
        StageResultRow {
            session_id: "s1".to_string(),
            stage_id: stage_id.to_string(),
            ordinal,
            document_id: "doc-1".to_string(),
            status: "completed".to_string(),
            output: format!("{} output", stage_id),
            error: None,
            extra_input: None,
            model: Some("fake-model".to_string()),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: Some("2026-01-01T00:01:00Z".to_string()),
        }
    }

    #[test]
    fn test_upsert_and_list_in_order() {
        let db = test_db();
        upsert(&db, &sample_result("executive_summary", 6)).unwrap();
        upsert(&db, &sample_result("component_analysis", 1)).unwrap();
        upsert(&db, &sample_result("pricing", 2)).unwrap();

        let rows = list_for_session(&db, "s1").unwrap();
        let stages: Vec<&str> = rows.iter().map(|r| r.stage_id.as_str()).collect();
        assert_eq!(stages, vec!["component_analysis", "pricing", "executive_summary"]);
    }

    #[test]
    fn test_upsert_replaces_previous_result() {
        let db = test_db();
        upsert(&db, &sample_result("pricing", 2)).unwrap();

        let mut failed = sample_result("pricing", 2);
        failed.status = "failed".to_string();
        failed.output = String::new();
        failed.error = Some("Timeout".to_string());
        upsert(&db, &failed).unwrap();

        let rows = list_for_session(&db, "s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], failed);
    }

    #[test]
    fn test_delete_stages() {
        let db = test_db();
        upsert(&db, &sample_result("component_analysis", 1)).unwrap();
        upsert(&db, &sample_result("pricing", 2)).unwrap();
        upsert(&db, &sample_result("cost_realism", 3)).unwrap();

        let removed = delete_stages(&db, "s1", &["pricing", "cost_realism", "compliance"]).unwrap();
        assert_eq!(removed, 2);

        let rows = list_for_session(&db, "s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stage_id, "component_analysis");
    }

    #[test]
    fn test_delete_for_session() {
        let db = test_db();
        upsert(&db, &sample_result("component_analysis", 1)).unwrap();
        upsert(&db, &sample_result("pricing", 2)).unwrap();

        assert_eq!(delete_for_session(&db, "s1").unwrap(), 2);
        assert!(list_for_session(&db, "s1").unwrap().is_empty());
    }
}
