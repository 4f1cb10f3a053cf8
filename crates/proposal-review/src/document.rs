//! The session's single current document.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an uploaded document. A new upload always gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Extracted text of an uploaded proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub content_type: String,
    pub text: String,
    pub extracted_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            filename: filename.into(),
            content_type: content_type.into(),
            text: text.into(),
            extracted_at: Utc::now(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            char_count: self.char_count(),
            extracted_at: self.extracted_at,
        }
    }
}

/// Document metadata without the text body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub filename: String,
    pub content_type: String,
    pub char_count: usize,
    pub extracted_at: DateTime<Utc>,
}

/// Holds at most one document at a time.
#[derive(Debug, Default)]
pub struct DocumentStore {
    current: Option<Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current document with a freshly identified one.
    pub fn set_document(
        &mut self,
        text: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> DocumentId {
        let document = Document::new(filename, content_type, text);
        let id = document.id;
        self.current = Some(document);
        id
    }

    /// Puts back a previously extracted document, keeping its id.
    pub fn restore(&mut self, document: Document) {
        self.current = Some(document);
    }

    pub fn document(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.current.as_ref().map(|d| d.id)
    }

    pub fn has_document(&self) -> bool {
        self.current.is_some()
    }

    pub fn clear(&mut self) -> Option<Document> {
        self.current.take()
    }
}
