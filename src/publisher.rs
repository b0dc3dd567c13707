use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::assembler::ArtifactKind;
use crate::collaborators::{BookStatusStore, ObjectStore};
use crate::error::GenerationError;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A built document waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

/// A document once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub kind: ArtifactKind,
    pub path: String,
    pub url: String,
    pub bytes: usize,
}

/// Who the artifacts belong to; every stored object is tagged with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub storage_prefix: String,
    pub book_id: String,
    pub version: u32,
    pub session_id: String,
}

impl PublishTarget {
    /// `{prefix}/{book}/v{version}/{artifact}.pdf`, a new directory for every version.
    pub fn artifact_path(&self, kind: ArtifactKind) -> String {
        format!(
            "{}/{}/v{}/{}.pdf",
            self.storage_prefix.trim_end_matches('/'),
            self.book_id,
            self.version,
            kind
        )
    }

    pub fn metadata(&self, kind: ArtifactKind) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("book-id".to_string(), self.book_id.clone()),
            ("artifact-type".to_string(), kind.to_string()),
            ("version".to_string(), self.version.to_string()),
            ("session-id".to_string(), self.session_id.clone()),
        ])
    }
}

/// Uploads every artifact concurrently and only then marks the book as ready. If any upload or
/// the status update fails, every artifact path is deleted and nothing is published. A failed
/// upload may still have stored its bytes, so the rollback does not rely on which puts succeeded.
pub async fn publish(
    object_store: Arc<dyn ObjectStore>,
    status_store: Arc<dyn BookStatusStore>,
    target: PublishTarget,
    artifacts: Vec<Artifact>,
) -> Result<Vec<PublishedArtifact>, GenerationError> {
    let attempted_paths: Vec<String> = artifacts
        .iter()
        .map(|artifact| target.artifact_path(artifact.kind))
        .collect();
    let mut uploads = JoinSet::new();
    for artifact in artifacts {
        let object_store = object_store.clone();
        let path = target.artifact_path(artifact.kind);
        let metadata = target.metadata(artifact.kind);
        uploads.spawn(async move {
            let bytes = artifact.bytes.len();
            let uploaded = object_store
                .put(&path, artifact.bytes, PDF_CONTENT_TYPE, &metadata)
                .await;
            (artifact.kind, path, bytes, uploaded)
        });
    }

    let mut published = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = uploads.join_next().await {
        match joined {
            Ok((kind, path, bytes, Ok(url))) => published.push(PublishedArtifact {
                kind,
                path,
                url,
                bytes,
            }),
            Ok((kind, _, _, Err(error))) => failures.push(format!("{} upload: {}", kind, error)),
            Err(error) => failures.push(format!("upload task: {}", error)),
        }
    }
    published.sort_by_key(|artifact| artifact.kind as u8);

    if failures.is_empty() {
        match status_store
            .mark_ready(&target.book_id, target.version, &published)
            .await
        {
            Ok(()) => {
                log::info!(
                    "Published version {} of book {:?}",
                    target.version,
                    target.book_id
                );
                return Ok(published);
            }
            Err(error) => failures.push(format!("status update: {}", error)),
        }
    }

    roll_back(object_store.as_ref(), &attempted_paths).await;
    Err(GenerationError::Publish(failures.join("; ")))
}

/// Deletes every path of the run, stored or not. Failures are only logged, the run is failing anyway.
async fn roll_back(object_store: &dyn ObjectStore, paths: &[String]) {
    for path in paths {
        match object_store.delete(path).await {
            Ok(()) => log::info!("Rolled back {}", path),
            Err(error) => log::warn!("Failed to roll back {}: {}", path, error),
        }
    }
}
