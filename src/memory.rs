//! Implementations of the collaborator traits which keep everything in memory, plus the
//! directory store and the logging event log the command line uses.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::{
    BookStatusStore, EventLog, GenerationEvent, ImageFetcher, ObjectStore, PageContentProvider,
};
use crate::error::{ContextError, GenerationError};
use crate::publisher::PublishedArtifact;
use crate::story::Book;

/// A poisoned lock only means another test thread panicked, the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryContentProvider {
    books: Mutex<HashMap<String, Book>>,
    versions: Mutex<HashMap<String, u32>>,
}

impl MemoryContentProvider {
    pub fn with_book(book: Book) -> Self {
        let provider = MemoryContentProvider::default();
        provider.insert(book);
        provider
    }

    pub fn insert(&self, book: Book) {
        lock(&self.books).insert(book.id.clone(), book);
    }
}

#[async_trait]
impl PageContentProvider for MemoryContentProvider {
    async fn load_book(&self, book_id: &str) -> Result<Option<Book>, GenerationError> {
        Ok(lock(&self.books).get(book_id).cloned())
    }

    async fn next_version(&self, book_id: &str) -> Result<u32, GenerationError> {
        let mut versions = lock(&self.versions);
        let version = versions.entry(book_id.to_string()).or_insert(0);
        *version += 1;
        Ok(*version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum BookStatus {
    Generating {
        session_id: String,
    },
    Ready {
        version: u32,
        artifacts: Vec<PublishedArtifact>,
    },
    Failed {
        message: String,
    },
}

/// Keeps every status a book went through.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    history: Mutex<HashMap<String, Vec<BookStatus>>>,
}

impl MemoryStatusStore {
    pub fn status(&self, book_id: &str) -> Option<BookStatus> {
        lock(&self.history)
            .get(book_id)
            .and_then(|history| history.last().cloned())
    }

    pub fn history(&self, book_id: &str) -> Vec<BookStatus> {
        lock(&self.history)
            .get(book_id)
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, book_id: &str, status: BookStatus) {
        lock(&self.history)
            .entry(book_id.to_string())
            .or_default()
            .push(status);
    }
}

#[async_trait]
impl BookStatusStore for MemoryStatusStore {
    async fn mark_generating(
        &self,
        book_id: &str,
        session_id: &str,
    ) -> Result<(), GenerationError> {
        self.push(
            book_id,
            BookStatus::Generating {
                session_id: session_id.to_string(),
            },
        );
        Ok(())
    }

    async fn mark_ready(
        &self,
        book_id: &str,
        version: u32,
        artifacts: &[PublishedArtifact],
    ) -> Result<(), GenerationError> {
        self.push(
            book_id,
            BookStatus::Ready {
                version,
                artifacts: artifacts.to_vec(),
            },
        );
        Ok(())
    }

    async fn mark_failed(&self, book_id: &str, message: &str) -> Result<(), GenerationError> {
        self.push(
            book_id,
            BookStatus::Failed {
                message: message.to_string(),
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    /// Uploads of paths ending with this suffix fail.
    failing_suffix: Option<String>,
}

impl MemoryObjectStore {
    pub fn failing_on<S: Into<String>>(suffix: S) -> Self {
        MemoryObjectStore {
            objects: Mutex::default(),
            failing_suffix: Some(suffix.into()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn metadata(&self, path: &str) -> Option<BTreeMap<String, String>> {
        self.object(path).map(|object| object.metadata)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, GenerationError> {
        if let Some(suffix) = &self.failing_suffix {
            if path.ends_with(suffix.as_str()) {
                return Err(GenerationError::Collaborator(format!(
                    "The store refused {}",
                    path
                )));
            }
        }

        lock(&self.objects).insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(format!("memory://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<(), GenerationError> {
        lock(&self.objects).remove(path);
        Ok(())
    }
}

/// Stores the objects as files under a root directory, each with a JSON sidecar of its metadata.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirectoryObjectStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn metadata_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{}.metadata.json", path))
    }
}

fn store_error(context: String, error: &dyn std::error::Error) -> GenerationError {
    GenerationError::Collaborator(ContextError::with_error(context, error).to_string())
}

#[async_trait]
impl ObjectStore for DirectoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, GenerationError> {
        let file_path = self.file_path(path);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| store_error(format!("Failed to create {:?}", parent), &error))?;
        }
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|error| store_error(format!("Failed to write {:?}", file_path), &error))?;

        let mut sidecar = metadata.clone();
        sidecar.insert("content-type".into(), content_type.to_string());
        let sidecar = serde_json::to_vec_pretty(&sidecar)
            .map_err(|error| store_error("Failed to serialize the metadata".into(), &error))?;
        tokio::fs::write(self.metadata_path(path), sidecar)
            .await
            .map_err(|error| {
                store_error(format!("Failed to write the metadata of {}", path), &error)
            })?;

        let absolute_path = tokio::fs::canonicalize(&file_path)
            .await
            .unwrap_or(file_path);
        Ok(format!("file://{}", absolute_path.display()))
    }

    async fn delete(&self, path: &str) -> Result<(), GenerationError> {
        for file_path in [self.file_path(path), self.metadata_path(path)] {
            match tokio::fs::remove_file(&file_path).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(store_error(format!("Failed to delete {:?}", file_path), &error))
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<GenerationEvent>>,
    failing: bool,
}

impl MemoryEventLog {
    /// An event log whose every append fails.
    pub fn failing() -> Self {
        MemoryEventLog {
            events: Mutex::default(),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<GenerationEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: GenerationEvent) -> Result<(), GenerationError> {
        if self.failing {
            return Err(GenerationError::Collaborator(
                "The event log is unavailable".into(),
            ));
        }
        lock(&self.events).push(event);
        Ok(())
    }
}

/// Writes the events to the log as JSON lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventLog;

#[async_trait]
impl EventLog for LogEventLog {
    async fn append(&self, event: GenerationEvent) -> Result<(), GenerationError> {
        let line = serde_json::to_string(&event).map_err(|error| {
            GenerationError::Collaborator(
                ContextError::with_error("Failed to serialize the event", &error).to_string(),
            )
        })?;
        log::info!("{}", line);
        Ok(())
    }
}

/// Serves illustrations from memory, optionally after a delay to exercise timeouts.
#[derive(Debug, Default)]
pub struct MemoryImageFetcher {
    images: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
}

impl MemoryImageFetcher {
    pub fn with_image<S: Into<String>>(mut self, uri: S, bytes: Vec<u8>) -> Self {
        self.images.insert(uri.into(), bytes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, ContextError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.images
            .get(uri)
            .cloned()
            .ok_or_else(|| ContextError::with_context(format!("No image at {:?}", uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::GenerationStage;

    #[tokio::test]
    async fn versions_increase_per_book() {
        let provider = MemoryContentProvider::default();
        assert_eq!(provider.next_version("a").await.unwrap(), 1);
        assert_eq!(provider.next_version("a").await.unwrap(), 2);
        assert_eq!(provider.next_version("b").await.unwrap(), 1);
        assert_eq!(provider.load_book("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn directory_store_writes_and_deletes_files() {
        let root = std::env::temp_dir().join(format!("storybook-press-{}", std::process::id()));
        let store = DirectoryObjectStore::new(&root);
        let metadata = BTreeMap::from([("book-id".to_string(), "b".to_string())]);

        let url = store
            .put("books/b/v1/cover.pdf", b"%PDF".to_vec(), "application/pdf", &metadata)
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(std::fs::read(root.join("books/b/v1/cover.pdf")).unwrap(), b"%PDF");
        let sidecar =
            std::fs::read_to_string(root.join("books/b/v1/cover.pdf.metadata.json")).unwrap();
        assert!(sidecar.contains("application/pdf"));

        store.delete("books/b/v1/cover.pdf").await.unwrap();
        store.delete("books/b/v1/cover.pdf").await.unwrap();
        assert!(!root.join("books/b/v1/cover.pdf").exists());
        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn failing_event_log_reports_errors() {
        let event = GenerationEvent::new("s", "b", GenerationStage::Started, "started");
        assert!(MemoryEventLog::failing().append(event.clone()).await.is_err());
        assert!(LogEventLog.append(event).await.is_ok());
    }
}
