use std::path::{Path, PathBuf};

use axum::body::{BodyDataStream, Bytes};
use futures::TryStreamExt;
use futures::future::BoxFuture;
use oci_spec::image::Digest;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{self, AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter},
};
use tokio_util::io::StreamReader;
use uuid::Uuid;

use crate::digest::{self, DigestWriter};
use crate::storage::paths::{
    MANIFESTS_DIR, PathLayout, UPLOAD_DATA_FILE, UPLOAD_STARTEDAT_FILE,
};
use crate::storage::{BlobEntry, CommitOutcome, Storage, UploadEntry};
use crate::utils::validation;

pub struct FilesystemStorage {
    layout: PathLayout,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemStorage {
            layout: PathLayout::new(root),
        }
    }

    /// Refuses any derived path that lexically escapes the storage root.
    /// Inputs are validated before they reach the driver; this is the
    /// second line of defense.
    fn checked(&self, path: PathBuf) -> io::Result<PathBuf> {
        if validation::is_contained(self.layout.root(), &path) {
            Ok(path)
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "derived path escapes the storage root",
            ))
        }
    }

    /// Streams `reader` into a temp file next to the blob location while
    /// hashing, then verifies and renames into place. The loser of a rename
    /// race overwrites identical content, so both outcomes are correct.
    async fn stage_blob<R>(&self, expected: &Digest, reader: &mut R) -> io::Result<CommitOutcome>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let final_path = self.layout.blob_path(expected);
        ensure_parent(&final_path).await?;
        let tmp = final_path.with_file_name(format!(
            "{}.tmp.{}",
            expected.digest(),
            Uuid::new_v4()
        ));

        let file = File::create(&tmp).await?;
        let algorithm = expected.algorithm().to_string();
        let mut writer = DigestWriter::new(BufWriter::new(file), &algorithm)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let staged = async {
            io::copy(reader, &mut writer).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = staged {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        let (_, actual) = writer.finalize();
        if !digest::equals_constant_time(&actual, expected) {
            let _ = fs::remove_file(&tmp).await;
            return Ok(CommitOutcome::DigestMismatch);
        }

        if let Err(e) = fs::rename(&tmp, &final_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(CommitOutcome::Committed)
    }

    /// Writes a link file atomically: temp sibling, then rename.
    async fn write_link(&self, path: &Path, digest: &Digest) -> io::Result<()> {
        ensure_parent(path).await?;
        let tmp = path.with_file_name(format!("link.tmp.{}", Uuid::new_v4()));
        fs::write(&tmp, digest.to_string().as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn read_link(&self, path: &Path) -> io::Result<Option<Digest>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let parsed = digest::parse(content.trim())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(parsed))
    }

    fn walk_repositories<'a>(
        &'a self,
        dir: PathBuf,
        prefix: Option<String>,
        found: &'a mut Vec<String>,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if name.starts_with('_') {
                    continue;
                }
                let qualified = match &prefix {
                    Some(p) => format!("{p}/{name}"),
                    None => name,
                };
                if exists(&entry.path().join(MANIFESTS_DIR)).await? {
                    found.push(qualified.clone());
                }
                self.walk_repositories(entry.path(), Some(qualified), found)
                    .await?;
            }
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    async fn has_blob(&self, digest: &Digest) -> io::Result<bool> {
        exists(&self.layout.blob_path(digest)).await
    }

    async fn blob_size(&self, digest: &Digest) -> io::Result<Option<u64>> {
        match fs::metadata(self.layout.blob_path(digest)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn open_blob(&self, digest: &Digest) -> io::Result<Option<File>> {
        match File::open(self.layout.blob_path(digest)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_blob(
        &self,
        digest: &Digest,
        stream: BodyDataStream,
    ) -> io::Result<CommitOutcome> {
        let stream = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let mut reader = StreamReader::new(stream);
        self.stage_blob(digest, &mut reader).await
    }

    async fn delete_blob(&self, digest: &Digest) -> io::Result<bool> {
        match fs::remove_file(self.layout.blob_path(digest)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_blobs(&self) -> io::Result<Vec<BlobEntry>> {
        let mut blobs = Vec::new();
        let mut algorithms = match fs::read_dir(self.layout.blobs_path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(blobs),
            Err(e) => return Err(e),
        };
        while let Some(algorithm_entry) = algorithms.next_entry().await? {
            if !algorithm_entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(algorithm) = algorithm_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut prefixes = fs::read_dir(algorithm_entry.path()).await?;
            while let Some(prefix_entry) = prefixes.next_entry().await? {
                if !prefix_entry.file_type().await?.is_dir() {
                    continue;
                }
                let mut files = fs::read_dir(prefix_entry.path()).await?;
                while let Some(file_entry) = files.next_entry().await? {
                    let Some(name) = file_entry.file_name().to_str().map(str::to_string) else {
                        continue;
                    };
                    // Staged temp files are not blobs.
                    if name.contains(".tmp.") {
                        continue;
                    }
                    let parsed = match digest::parse(&format!("{algorithm}:{name}")) {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!("skipping unrecognized blob file {name}: {e}");
                            continue;
                        }
                    };
                    let meta = file_entry.metadata().await?;
                    blobs.push(BlobEntry {
                        digest: parsed,
                        size: meta.len(),
                        modified: meta.modified()?,
                    });
                }
            }
        }
        Ok(blobs)
    }

    async fn link_blob(&self, repo: &str, digest: &Digest) -> io::Result<()> {
        let path = self.checked(self.layout.layer_link_path(repo, digest))?;
        self.write_link(&path, digest).await
    }

    async fn unlink_blob(&self, repo: &str, digest: &Digest) -> io::Result<bool> {
        let link = self.checked(self.layout.layer_link_path(repo, digest))?;
        let dir = link.parent().expect("layer link has a parent directory");
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn has_layer_link(&self, repo: &str, digest: &Digest) -> io::Result<bool> {
        let path = self.checked(self.layout.layer_link_path(repo, digest))?;
        exists(&path).await
    }

    async fn count_blob_references(&self, digest: &Digest) -> io::Result<usize> {
        let mut count = 0;
        for repo in self.list_repositories().await? {
            if self.has_layer_link(&repo, digest).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn put_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        digest: &Digest,
        bytes: Bytes,
    ) -> io::Result<()> {
        let outcome = self
            .put_blob(digest, axum::body::Body::from(bytes).into_data_stream())
            .await?;
        if outcome != CommitOutcome::Committed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "manifest bytes do not match their computed digest",
            ));
        }
        let revision = self.checked(self.layout.manifest_revision_link_path(repo, digest))?;
        self.write_link(&revision, digest).await?;
        if let Some(tag) = tag {
            let tag_link = self.checked(self.layout.manifest_tag_link_path(repo, tag))?;
            self.write_link(&tag_link, digest).await?;
        }
        Ok(())
    }

    async fn has_manifest_revision(&self, repo: &str, digest: &Digest) -> io::Result<bool> {
        let path = self.checked(self.layout.manifest_revision_link_path(repo, digest))?;
        exists(&path).await
    }

    async fn list_manifest_revisions(&self, repo: &str) -> io::Result<Vec<Digest>> {
        let mut revisions = Vec::new();
        let root = self.checked(self.layout.manifest_revisions_path(repo))?;
        let mut algorithms = match fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(revisions),
            Err(e) => return Err(e),
        };
        while let Some(algorithm_entry) = algorithms.next_entry().await? {
            if !algorithm_entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(algorithm) = algorithm_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut hashes = fs::read_dir(algorithm_entry.path()).await?;
            while let Some(hash_entry) = hashes.next_entry().await? {
                let Some(hex) = hash_entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                match digest::parse(&format!("{algorithm}:{hex}")) {
                    Ok(d) => revisions.push(d),
                    Err(e) => tracing::warn!("skipping unrecognized revision {hex}: {e}"),
                }
            }
        }
        Ok(revisions)
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> io::Result<bool> {
        let link = self.checked(self.layout.manifest_revision_link_path(repo, digest))?;
        let revision_dir = link.parent().expect("revision link has a parent directory");
        match fs::remove_dir_all(revision_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }

        // Tags pointing at the removed revision are dropped with it.
        let tags_dir = self.checked(self.layout.manifest_tags_path(repo))?;
        let mut tags = match fs::read_dir(&tags_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        while let Some(tag_entry) = tags.next_entry().await? {
            let link_path = tag_entry.path().join("current").join("link");
            if let Some(target) = self.read_link(&link_path).await?
                && digest::equals_constant_time(&target, digest)
            {
                fs::remove_dir_all(tag_entry.path()).await?;
            }
        }
        Ok(true)
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> io::Result<Option<Digest>> {
        let path = self.checked(self.layout.manifest_tag_link_path(repo, tag))?;
        self.read_link(&path).await
    }

    async fn list_tags(&self, repo: &str) -> io::Result<Vec<String>> {
        let path = self.checked(self.layout.manifest_tags_path(repo))?;
        let mut tags = Vec::new();
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tags),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(tag) = entry.file_name().to_str() {
                tags.push(tag.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }

    async fn repository_exists(&self, repo: &str) -> io::Result<bool> {
        let path = self.checked(self.layout.manifests_path(repo))?;
        exists(&path).await
    }

    async fn list_repositories(&self) -> io::Result<Vec<String>> {
        let mut found = Vec::new();
        self.walk_repositories(self.layout.repositories_path(), None, &mut found)
            .await?;
        found.sort();
        Ok(found)
    }

    async fn create_upload(&self, id: &str) -> io::Result<()> {
        let dir = self.checked(self.layout.upload_path(id))?;
        fs::create_dir_all(&dir).await?;
        fs::write(
            dir.join(UPLOAD_STARTEDAT_FILE),
            chrono::Utc::now().to_rfc3339(),
        )
        .await?;
        // The data file is the authoritative offset, so it exists from the
        // start even when empty.
        File::create(dir.join(UPLOAD_DATA_FILE)).await?;
        Ok(())
    }

    async fn upload_size(&self, id: &str) -> io::Result<Option<u64>> {
        let path = self.checked(self.layout.upload_data_path(id))?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn append_upload(&self, id: &str, stream: BodyDataStream) -> io::Result<u64> {
        let path = self.checked(self.layout.upload_data_path(id))?;
        let stream = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let mut reader = StreamReader::new(stream);

        let file = OpenOptions::new().append(true).open(&path).await?;
        let prior = file.metadata().await?.len();
        let mut writer = BufWriter::new(file);

        let appended = async {
            let n = io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            Ok::<_, io::Error>(n)
        }
        .await;

        match appended {
            Ok(n) => Ok(prior + n),
            Err(e) => {
                // Roll back the partial append so the reported offset keeps
                // matching the file size and the client can resume.
                drop(writer);
                if let Ok(file) = OpenOptions::new().write(true).open(&path).await {
                    let _ = file.set_len(prior).await;
                }
                Err(e)
            }
        }
    }

    async fn commit_upload(
        &self,
        id: &str,
        digest: &Digest,
        stream: BodyDataStream,
    ) -> io::Result<CommitOutcome> {
        let data_path = self.checked(self.layout.upload_data_path(id))?;
        let accumulated: Box<dyn AsyncRead + Send + Unpin> = match File::open(&data_path).await {
            Ok(file) => Box::new(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Box::new(io::empty()),
            Err(e) => return Err(e),
        };
        let stream = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(stream);

        // One logical stream: session data followed by the final body,
        // consumed exactly once through the hashing writer.
        let mut combined = accumulated.chain(body_reader);
        self.stage_blob(digest, &mut combined).await
    }

    async fn delete_upload(&self, id: &str) -> io::Result<bool> {
        let dir = self.checked(self.layout.upload_path(id))?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_uploads(&self) -> io::Result<Vec<UploadEntry>> {
        let mut sessions = Vec::new();
        let mut entries = match fs::read_dir(self.layout.uploads_path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let started_at = match fs::read_to_string(entry.path().join(UPLOAD_STARTEDAT_FILE))
                .await
            {
                Ok(stamp) => chrono::DateTime::parse_from_rfc3339(stamp.trim())
                    .ok()
                    .map(|t| t.with_timezone(&chrono::Utc)),
                Err(_) => None,
            };
            let target = match fs::read_to_string(entry.path().join("digest")).await {
                Ok(content) => Some(content.trim().to_string()),
                Err(_) => None,
            };
            sessions.push(UploadEntry {
                id,
                started_at,
                target,
            });
        }
        Ok(sessions)
    }
}

async fn exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FilesystemStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        (dir, storage)
    }

    fn body_stream(bytes: &'static [u8]) -> BodyDataStream {
        Body::from(bytes).into_data_stream()
    }

    fn sha256_of(bytes: &[u8]) -> Digest {
        digest::compute(digest::SHA256, bytes).unwrap()
    }

    #[tokio::test]
    async fn put_blob_roundtrip_and_dedup() {
        let (_dir, storage) = storage();
        let d = sha256_of(b"hello");

        let outcome = storage.put_blob(&d, body_stream(b"hello")).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert!(storage.has_blob(&d).await.unwrap());
        assert_eq!(storage.blob_size(&d).await.unwrap(), Some(5));

        let mut file = storage.open_blob(&d).await.unwrap().unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello");

        // Re-pushing the same digest converges on the same file.
        let outcome = storage.put_blob(&d, body_stream(b"hello")).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
    }

    #[tokio::test]
    async fn put_blob_mismatch_leaves_nothing_behind() {
        let (dir, storage) = storage();
        let claimed = sha256_of(b"hello");

        let outcome = storage
            .put_blob(&claimed, body_stream(b"not hello"))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::DigestMismatch);
        assert!(!storage.has_blob(&claimed).await.unwrap());

        // No staged temp file survives the failure.
        let shard = dir.path().join("blobs/sha256/2c");
        if let Ok(mut entries) = tokio::fs::read_dir(&shard).await {
            assert!(entries.next_entry().await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn layer_links_drive_reference_counts() {
        let (_dir, storage) = storage();
        let d = sha256_of(b"layer");
        storage.put_blob(&d, body_stream(b"layer")).await.unwrap();

        storage.link_blob("alpha", &d).await.unwrap();
        storage.link_blob("beta/nested", &d).await.unwrap();
        assert!(storage.has_layer_link("alpha", &d).await.unwrap());
        assert_eq!(storage.count_blob_references(&d).await.unwrap(), 2);

        assert!(storage.unlink_blob("alpha", &d).await.unwrap());
        assert!(!storage.has_layer_link("alpha", &d).await.unwrap());
        assert_eq!(storage.count_blob_references(&d).await.unwrap(), 1);
        assert!(!storage.unlink_blob("alpha", &d).await.unwrap());
    }

    #[tokio::test]
    async fn manifest_links_and_tag_cleanup() {
        let (_dir, storage) = storage();
        let bytes = Bytes::from_static(b"{\"schemaVersion\":2}");
        let d = sha256_of(&bytes);

        storage
            .put_manifest("library/app", Some("latest"), &d, bytes)
            .await
            .unwrap();
        assert!(storage.has_manifest_revision("library/app", &d).await.unwrap());
        assert_eq!(
            storage
                .resolve_tag("library/app", "latest")
                .await
                .unwrap()
                .unwrap()
                .to_string(),
            d.to_string()
        );
        assert_eq!(
            storage.list_manifest_revisions("library/app").await.unwrap().len(),
            1
        );

        assert!(storage.delete_manifest("library/app", &d).await.unwrap());
        assert!(!storage.has_manifest_revision("library/app", &d).await.unwrap());
        assert!(storage.resolve_tag("library/app", "latest").await.unwrap().is_none());
        assert!(!storage.delete_manifest("library/app", &d).await.unwrap());
    }

    #[tokio::test]
    async fn tag_listing_is_sorted() {
        let (_dir, storage) = storage();
        for (tag, content) in [("v2", "two"), ("latest", "l"), ("v1", "one")] {
            let bytes = Bytes::from(content.as_bytes().to_vec());
            let d = sha256_of(&bytes);
            storage.put_manifest("app", Some(tag), &d, bytes).await.unwrap();
        }
        assert_eq!(storage.list_tags("app").await.unwrap(), ["latest", "v1", "v2"]);
        assert!(storage.list_tags("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repository_listing_walks_nested_names() {
        let (_dir, storage) = storage();
        for repo in ["zoo", "library/nginx", "library/nginx/dev"] {
            let bytes = Bytes::from(repo.as_bytes().to_vec());
            let d = sha256_of(&bytes);
            storage.put_manifest(repo, None, &d, bytes).await.unwrap();
        }
        assert!(storage.repository_exists("library/nginx").await.unwrap());
        assert!(!storage.repository_exists("library").await.unwrap());
        assert_eq!(
            storage.list_repositories().await.unwrap(),
            ["library/nginx", "library/nginx/dev", "zoo"]
        );
    }

    #[tokio::test]
    async fn upload_session_lifecycle() {
        let (_dir, storage) = storage();
        let id = Uuid::new_v4().to_string();

        storage.create_upload(&id).await.unwrap();
        assert_eq!(storage.upload_size(&id).await.unwrap(), Some(0));

        let size = storage.append_upload(&id, body_stream(b"hello")).await.unwrap();
        assert_eq!(size, 5);
        let size = storage.append_upload(&id, body_stream(b" world")).await.unwrap();
        assert_eq!(size, 11);

        let d = sha256_of(b"hello world");
        let outcome = storage
            .commit_upload(&id, &d, body_stream(b""))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert!(storage.has_blob(&d).await.unwrap());

        assert!(storage.delete_upload(&id).await.unwrap());
        assert_eq!(storage.upload_size(&id).await.unwrap(), None);
        assert!(!storage.delete_upload(&id).await.unwrap());
    }

    #[tokio::test]
    async fn commit_combines_session_data_with_final_body() {
        let (_dir, storage) = storage();
        let id = Uuid::new_v4().to_string();
        storage.create_upload(&id).await.unwrap();
        storage.append_upload(&id, body_stream(b"hello")).await.unwrap();

        let d = sha256_of(b"hello world");
        let outcome = storage
            .commit_upload(&id, &d, body_stream(b" world"))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        let mut file = storage.open_blob(&d).await.unwrap().unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello world");
    }

    #[tokio::test]
    async fn upload_listing_reports_stamps() {
        let (_dir, storage) = storage();
        let id = Uuid::new_v4().to_string();
        storage.create_upload(&id).await.unwrap();

        let sessions = storage.list_uploads().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert!(sessions[0].started_at.is_some());
        assert!(sessions[0].target.is_none());
    }

    #[tokio::test]
    async fn traversal_attempts_are_refused() {
        let (_dir, storage) = storage();
        let d = sha256_of(b"x");
        let err = storage.link_blob("../escape", &d).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
