//! The services the engine talks to but does not own. Every one of them is a trait so that the
//! generator can be driven by the in-memory implementations in tests and by real stores in
//! production.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ContextError, GenerationError};
use crate::layout::{LayoutSpec, ProductSpec};
use crate::publisher::PublishedArtifact;
use crate::story::Book;

/// Source of the story pages, guaranteeing their sequence and cover invariants.
#[async_trait]
pub trait PageContentProvider: Send + Sync {
    /// `None` when no book has this identifier.
    async fn load_book(&self, book_id: &str) -> Result<Option<Book>, GenerationError>;

    /// Allocates the version number of a new generation of the book.
    async fn next_version(&self, book_id: &str) -> Result<u32, GenerationError>;
}

/// The status record of a book, which only points at artifacts once all of them are published.
#[async_trait]
pub trait BookStatusStore: Send + Sync {
    async fn mark_generating(&self, book_id: &str, session_id: &str)
        -> Result<(), GenerationError>;

    async fn mark_ready(
        &self,
        book_id: &str,
        version: u32,
        artifacts: &[PublishedArtifact],
    ) -> Result<(), GenerationError>;

    async fn mark_failed(&self, book_id: &str, message: &str) -> Result<(), GenerationError>;
}

#[async_trait]
pub trait LayoutProvider: Send + Sync {
    async fn layout(&self, layout_id: &str) -> Result<Option<LayoutSpec>, GenerationError>;

    async fn product(&self, product_id: &str) -> Result<Option<ProductSpec>, GenerationError>;
}

/// Binary storage of the artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the bytes under `path` and returns the URL they can be retrieved from.
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, GenerationError>;

    async fn delete(&self, path: &str) -> Result<(), GenerationError>;
}

/// Append-only audit trail. Failures are never fatal to a run.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: GenerationEvent) -> Result<(), GenerationError>;
}

/// Retrieves the raw bytes of an illustration.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, ContextError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Started,
    PagesAdjusted,
    FontFitted,
    DocumentsBuilt,
    Published,
    Failed,
}

/// One entry of the audit trail, keyed by the session of the run which emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationEvent {
    pub session_id: String,
    pub book_id: String,
    pub stage: GenerationStage,
    pub message: String,
    pub unix_timestamp: i64,
}

impl GenerationEvent {
    pub fn new<S: Into<String>>(
        session_id: &str,
        book_id: &str,
        stage: GenerationStage,
        message: S,
    ) -> Self {
        GenerationEvent {
            session_id: session_id.to_string(),
            book_id: book_id.to_string(),
            stage,
            message: message.into(),
            unix_timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}
