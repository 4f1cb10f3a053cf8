//! Session repository: CRUD operations for the `sessions` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw session row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub id: String,
    pub document_id: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub document_text: Option<String>,
    pub extracted_at: Option<String>,
    pub current_stage: String,
    /// JSON array of stage ids.
    pub selected_optional: String,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            filename: row.get("filename")?,
            content_type: row.get("content_type")?,
            document_text: row.get("document_text")?,
            extracted_at: row.get("extracted_at")?,
            current_stage: row.get("current_stage")?,
            selected_optional: row.get("selected_optional")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a session or updates everything but `created_at`.
pub fn upsert(db: &Database, row: &SessionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sessions (id, document_id, filename, content_type, document_text,
             extracted_at, current_stage, selected_optional, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
               document_id = ?2,
               filename = ?3,
               content_type = ?4,
               document_text = ?5,
               extracted_at = ?6,
               current_stage = ?7,
               selected_optional = ?8,
               updated_at = ?10",
            params![
                row.id,
                row.document_id,
                row.filename,
                row.content_type,
                row.document_text,
                row.extracted_at,
                row.current_stage,
                row.selected_optional,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a session by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SessionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists sessions, most recently updated first.
pub fn list_recent(db: &Database, limit: u64) -> Result<Vec<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM sessions ORDER BY updated_at DESC, id LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], SessionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a session. Its stage results go with it.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_session(id: &str, updated_at: &str) -> SessionRow {
        SessionRow {
            id: id.to_string(),
            document_id: Some("doc-1".to_string()),
            filename: Some("rfp.txt".to_string()),
            content_type: Some("text/plain".to_string()),
            document_text: Some("Scope of work".to_string()),
            extracted_at: Some("2026-01-01T00:00:00Z".to_string()),
            current_stage: "component_analysis".to_string(),
            selected_optional: "[\"pricing\"]".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let db = test_db();
        let row = sample_session("s1", "2026-01-01T00:00:00Z");
        upsert(&db, &row).unwrap();

        let found = find_by_id(&db, "s1").unwrap().unwrap();
        assert_eq!(found, row);
    }

    #[test]
    fn test_upsert_overwrites_but_keeps_created_at() {
        let db = test_db();
        upsert(&db, &sample_session("s1", "2026-01-01T00:00:00Z")).unwrap();

        let mut changed = sample_session("s1", "2026-01-02T00:00:00Z");
        changed.current_stage = "pricing".to_string();
        changed.created_at = "2030-01-01T00:00:00Z".to_string();
        upsert(&db, &changed).unwrap();

        let found = find_by_id(&db, "s1").unwrap().unwrap();
        assert_eq!(found.current_stage, "pricing");
        assert_eq!(found.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(found.updated_at, "2026-01-02T00:00:00Z");
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_list_recent_orders_by_update() {
        let db = test_db();
        upsert(&db, &sample_session("old", "2026-01-01T00:00:00Z")).unwrap();
        upsert(&db, &sample_session("new", "2026-03-01T00:00:00Z")).unwrap();

        let rows = list_recent(&db, 10).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert_eq!(list_recent(&db, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        upsert(&db, &sample_session("s1", "2026-01-01T00:00:00Z")).unwrap();
        assert!(delete(&db, "s1").unwrap());
        assert!(!delete(&db, "s1").unwrap());
        assert!(find_by_id(&db, "s1").unwrap().is_none());
    }
}
