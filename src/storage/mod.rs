use std::time::SystemTime;

use axum::body::BodyDataStream;
use chrono::{DateTime, Utc};
use oci_spec::image::Digest;
use tokio::{fs::File, io};

pub mod driver;
pub mod paths;

/// Result of streaming content to a content-addressed location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    DigestMismatch,
}

/// One stored blob file, as enumerated for garbage collection.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub digest: Digest,
    pub size: u64,
    pub modified: SystemTime,
}

/// One upload session directory, as enumerated for expiry and GC guards.
#[derive(Debug, Clone)]
pub struct UploadEntry {
    pub id: String,
    pub started_at: Option<DateTime<Utc>>,
    /// Target digest, when the session recorded one.
    pub target: Option<String>,
}

/// Storage backend contract. All inputs are validated at the HTTP boundary
/// before they reach these operations; implementations still refuse any
/// derived path that escapes their root.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // Blob store.
    async fn has_blob(&self, digest: &Digest) -> io::Result<bool>;
    async fn blob_size(&self, digest: &Digest) -> io::Result<Option<u64>>;
    async fn open_blob(&self, digest: &Digest) -> io::Result<Option<File>>;
    /// Streams to a temp file, verifies the digest, renames into place.
    /// An already-present target is success; concurrent writers of the same
    /// digest converge at the rename.
    async fn put_blob(&self, digest: &Digest, stream: BodyDataStream)
    -> io::Result<CommitOutcome>;
    async fn delete_blob(&self, digest: &Digest) -> io::Result<bool>;
    async fn list_blobs(&self) -> io::Result<Vec<BlobEntry>>;

    // Layer links.
    async fn link_blob(&self, repo: &str, digest: &Digest) -> io::Result<()>;
    async fn unlink_blob(&self, repo: &str, digest: &Digest) -> io::Result<bool>;
    async fn has_layer_link(&self, repo: &str, digest: &Digest) -> io::Result<bool>;
    /// Counts repositories holding a layer link for `digest`. The link graph
    /// itself is the source of truth; there is no side counter to drift.
    async fn count_blob_references(&self, digest: &Digest) -> io::Result<usize>;

    // Manifests.
    async fn put_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        digest: &Digest,
        bytes: axum::body::Bytes,
    ) -> io::Result<()>;
    async fn has_manifest_revision(&self, repo: &str, digest: &Digest) -> io::Result<bool>;
    async fn list_manifest_revisions(&self, repo: &str) -> io::Result<Vec<Digest>>;
    /// Removes the revision link and any tags pointing at it.
    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> io::Result<bool>;
    async fn resolve_tag(&self, repo: &str, tag: &str) -> io::Result<Option<Digest>>;

    // Tag and repository listing.
    async fn list_tags(&self, repo: &str) -> io::Result<Vec<String>>;
    async fn repository_exists(&self, repo: &str) -> io::Result<bool>;
    async fn list_repositories(&self) -> io::Result<Vec<String>>;

    // Upload sessions.
    async fn create_upload(&self, id: &str) -> io::Result<()>;
    async fn upload_size(&self, id: &str) -> io::Result<Option<u64>>;
    /// Appends the stream to the session's data file, returning the new
    /// total size. A failed append truncates back to the prior size so the
    /// reported offset stays equal to the file size.
    async fn append_upload(&self, id: &str, stream: BodyDataStream) -> io::Result<u64>;
    /// Consumes session data chained with `stream` exactly once, hashing
    /// while staging to the blob location, then verifies and renames.
    async fn commit_upload(
        &self,
        id: &str,
        digest: &Digest,
        stream: BodyDataStream,
    ) -> io::Result<CommitOutcome>;
    async fn delete_upload(&self, id: &str) -> io::Result<bool>;
    async fn list_uploads(&self) -> io::Result<Vec<UploadEntry>>;
}
