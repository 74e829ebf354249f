//! Upload session lifecycle.
//!
//! A session moves OPEN → COMMITTED (finalize) or OPEN → ABORTED (delete,
//! digest mismatch, or expiry). The session's authoritative offset is the
//! size of its data file; there is no in-memory counter to drift from disk,
//! and a restarted server resumes sessions where the files left them.

use std::io;
use std::sync::Arc;

use axum::body::BodyDataStream;
use oci_spec::image::Digest;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{CommitOutcome, Storage};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload session unknown: {0}")]
    Unknown(String),

    #[error("chunk starts at {given} but the session holds {current} bytes")]
    OffsetMismatch { given: u64, current: u64 },

    #[error("uploaded content does not hash to the requested digest")]
    DigestMismatch,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone)]
pub struct UploadManager {
    storage: Arc<dyn Storage>,
}

impl UploadManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        UploadManager { storage }
    }

    /// Opens a session and returns its id.
    pub async fn create(&self) -> io::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.storage.create_upload(&id).await?;
        tracing::debug!("opened upload session {id}");
        Ok(id)
    }

    /// Current byte count of the session.
    pub async fn status(&self, id: &str) -> Result<u64, UploadError> {
        self.storage
            .upload_size(id)
            .await?
            .ok_or_else(|| UploadError::Unknown(id.to_string()))
    }

    /// Appends a chunk. When the client declared a start offset it must
    /// equal the current size; chunks are strictly contiguous.
    pub async fn append(
        &self,
        id: &str,
        declared_start: Option<u64>,
        stream: BodyDataStream,
    ) -> Result<u64, UploadError> {
        let current = self.status(id).await?;
        if let Some(given) = declared_start
            && given != current
        {
            return Err(UploadError::OffsetMismatch { given, current });
        }
        Ok(self.storage.append_upload(id, stream).await?)
    }

    /// Finalizes the session: accumulated data chained with the final body
    /// is hashed while streaming to the blob store, the layer link is
    /// created in `repo`, and the session directory is destroyed. On a
    /// digest mismatch the staged blob and the session are both gone.
    pub async fn finalize(
        &self,
        repo: &str,
        id: &str,
        digest: &Digest,
        stream: BodyDataStream,
    ) -> Result<(), UploadError> {
        self.status(id).await?;
        match self.storage.commit_upload(id, digest, stream).await? {
            CommitOutcome::Committed => {
                self.storage.link_blob(repo, digest).await?;
                self.storage.delete_upload(id).await?;
                tracing::debug!("committed upload session {id} as {digest}");
                Ok(())
            }
            CommitOutcome::DigestMismatch => {
                self.storage.delete_upload(id).await?;
                tracing::debug!("destroyed upload session {id} on digest mismatch");
                Err(UploadError::DigestMismatch)
            }
        }
    }

    pub async fn abort(&self, id: &str) -> Result<(), UploadError> {
        if self.storage.delete_upload(id).await? {
            tracing::debug!("aborted upload session {id}");
            Ok(())
        } else {
            Err(UploadError::Unknown(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;
    use crate::storage::driver::filesystem::FilesystemStorage;
    use axum::body::Body;
    use tempfile::TempDir;

    fn manager() -> (TempDir, Arc<dyn Storage>, UploadManager) {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FilesystemStorage::new(dir.path()));
        let uploads = UploadManager::new(storage.clone());
        (dir, storage, uploads)
    }

    fn body_stream(bytes: &'static [u8]) -> BodyDataStream {
        Body::from(bytes).into_data_stream()
    }

    #[tokio::test]
    async fn offsets_track_the_data_file() {
        let (_dir, _storage, uploads) = manager();
        let id = uploads.create().await.unwrap();
        assert_eq!(uploads.status(&id).await.unwrap(), 0);

        let size = uploads.append(&id, Some(0), body_stream(b"hello")).await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(uploads.status(&id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn non_contiguous_chunks_are_refused() {
        let (_dir, _storage, uploads) = manager();
        let id = uploads.create().await.unwrap();
        uploads.append(&id, Some(0), body_stream(b"hello")).await.unwrap();

        let err = uploads
            .append(&id, Some(3), body_stream(b"xyz"))
            .await
            .unwrap_err();
        match err {
            UploadError::OffsetMismatch { given, current } => {
                assert_eq!(given, 3);
                assert_eq!(current, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The refused chunk left the session untouched.
        assert_eq!(uploads.status(&id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn finalize_links_and_destroys_the_session() {
        let (_dir, storage, uploads) = manager();
        let id = uploads.create().await.unwrap();
        uploads.append(&id, None, body_stream(b"hello")).await.unwrap();

        let d = digest::compute(digest::SHA256, b"hello world").unwrap();
        uploads
            .finalize("library/app", &id, &d, body_stream(b" world"))
            .await
            .unwrap();

        assert!(storage.has_blob(&d).await.unwrap());
        assert!(storage.has_layer_link("library/app", &d).await.unwrap());
        assert!(matches!(
            uploads.status(&id).await.unwrap_err(),
            UploadError::Unknown(_)
        ));
    }

    #[tokio::test]
    async fn digest_mismatch_destroys_everything() {
        let (_dir, storage, uploads) = manager();
        let id = uploads.create().await.unwrap();
        uploads.append(&id, None, body_stream(b"hello")).await.unwrap();

        let wrong = digest::compute(digest::SHA256, b"something else").unwrap();
        let err = uploads
            .finalize("library/app", &id, &wrong, body_stream(b""))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::DigestMismatch));

        assert!(!storage.has_blob(&wrong).await.unwrap());
        assert!(!storage.has_layer_link("library/app", &wrong).await.unwrap());
        assert!(matches!(
            uploads.status(&id).await.unwrap_err(),
            UploadError::Unknown(_)
        ));
    }

    #[tokio::test]
    async fn abort_removes_the_session() {
        let (_dir, _storage, uploads) = manager();
        let id = uploads.create().await.unwrap();
        uploads.abort(&id).await.unwrap();
        assert!(matches!(
            uploads.abort(&id).await.unwrap_err(),
            UploadError::Unknown(_)
        ));
    }
}
