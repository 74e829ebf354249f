//! Mark-and-sweep garbage collection over the repository link graph.
//!
//! Mark walks every repository's manifest revisions and tags, parses each
//! manifest, and collects every digest it reaches. Sweep enumerates the
//! blob store and classifies what mark never saw: blobs younger than the
//! safety window stay (an in-flight push may not have its manifest yet),
//! blobs claimed by an open upload session stay, the rest go.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use tokio::io::AsyncReadExt;

use crate::manifest::{self, Manifest};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy)]
pub struct GcOptions {
    /// Classify and report without deleting.
    pub dry_run: bool,
    /// Unreferenced blobs younger than this survive the sweep.
    pub min_age: Duration,
}

#[derive(Debug, Default)]
pub struct GcReport {
    pub total: u64,
    pub referenced: u64,
    pub orphaned: u64,
    pub deleted: u64,
    pub skipped_too_new: u64,
    pub skipped_active_upload: u64,
    pub bytes_reclaimed: u64,
    pub errors: u64,
    pub duration: Duration,
}

impl fmt::Display for GcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "blobs total:           {}", self.total)?;
        writeln!(f, "blobs referenced:      {}", self.referenced)?;
        writeln!(f, "blobs orphaned:        {}", self.orphaned)?;
        writeln!(f, "blobs deleted:         {}", self.deleted)?;
        writeln!(f, "skipped (too new):     {}", self.skipped_too_new)?;
        writeln!(f, "skipped (active upload): {}", self.skipped_active_upload)?;
        writeln!(f, "bytes reclaimed:       {}", self.bytes_reclaimed)?;
        writeln!(f, "errors:                {}", self.errors)?;
        write!(f, "duration:              {:.2?}", self.duration)
    }
}

pub async fn run(storage: &dyn Storage, options: &GcOptions) -> std::io::Result<GcReport> {
    let started = Instant::now();
    let mut report = GcReport::default();

    let reachable = mark(storage, &mut report).await?;
    tracing::info!("mark phase reached {} digests", reachable.len());

    sweep(storage, options, &reachable, &mut report).await?;
    report.duration = started.elapsed();
    tracing::info!(
        "sweep finished: {} deleted, {} bytes reclaimed, {} errors",
        report.deleted,
        report.bytes_reclaimed,
        report.errors
    );
    Ok(report)
}

/// Collects every digest reachable from some repository: each manifest
/// revision, each tag target, and everything those manifests reference
/// (config, layers, sub-manifests).
async fn mark(storage: &dyn Storage, report: &mut GcReport) -> std::io::Result<HashSet<String>> {
    let mut reachable: HashSet<String> = HashSet::new();

    for repo in storage.list_repositories().await? {
        let mut manifest_digests = storage.list_manifest_revisions(&repo).await?;
        for tag in storage.list_tags(&repo).await? {
            match storage.resolve_tag(&repo, &tag).await {
                Ok(Some(digest)) => manifest_digests.push(digest),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("unreadable tag {repo}:{tag}: {e}");
                    report.errors += 1;
                }
            }
        }

        for digest in manifest_digests {
            reachable.insert(digest.to_string());

            let bytes = match storage.open_blob(&digest).await {
                Ok(Some(mut file)) => {
                    let mut buffer = Vec::new();
                    if let Err(e) = file.read_to_end(&mut buffer).await {
                        tracing::warn!("unreadable manifest {digest} in {repo}: {e}");
                        report.errors += 1;
                        continue;
                    }
                    buffer
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("unreadable manifest {digest} in {repo}: {e}");
                    report.errors += 1;
                    continue;
                }
            };

            // The stored media type decides the structural shape; fall back
            // across both shapes for robustness against hand-placed files.
            let media_type = serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|v| {
                    v.get("mediaType")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| manifest::OCI_IMAGE_MANIFEST.to_string());
            match Manifest::parse(&bytes, &media_type) {
                Ok(parsed) => {
                    for referenced in parsed.referenced_digests() {
                        reachable.insert(referenced.to_string());
                    }
                }
                Err(e) => {
                    tracing::warn!("unparseable manifest {digest} in {repo}: {e}");
                    report.errors += 1;
                }
            }
        }
    }
    Ok(reachable)
}

async fn sweep(
    storage: &dyn Storage,
    options: &GcOptions,
    reachable: &HashSet<String>,
    report: &mut GcReport,
) -> std::io::Result<()> {
    // Digests claimed by open upload sessions, for sessions that recorded
    // their target.
    let mut upload_targets: HashSet<String> = HashSet::new();
    for session in storage.list_uploads().await? {
        if let Some(target) = session.target {
            upload_targets.insert(target);
        }
    }

    let now = SystemTime::now();
    for blob in storage.list_blobs().await? {
        report.total += 1;
        let key = blob.digest.to_string();
        if reachable.contains(&key) {
            report.referenced += 1;
            continue;
        }
        report.orphaned += 1;

        let age = now
            .duration_since(blob.modified)
            .unwrap_or(Duration::ZERO);
        if age < options.min_age {
            tracing::debug!("skipping {key}: {age:?} old, within the safety window");
            report.skipped_too_new += 1;
            continue;
        }
        if upload_targets.contains(&key) {
            tracing::debug!("skipping {key}: targeted by an open upload session");
            report.skipped_active_upload += 1;
            continue;
        }

        if options.dry_run {
            tracing::info!("would delete {key} ({} bytes)", blob.size);
            report.bytes_reclaimed += blob.size;
            report.deleted += 1;
            continue;
        }
        match storage.delete_blob(&blob.digest).await {
            Ok(true) => {
                tracing::info!("deleted {key} ({} bytes)", blob.size);
                report.bytes_reclaimed += blob.size;
                report.deleted += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("failed to delete {key}: {e}");
                report.errors += 1;
            }
        }
    }
    Ok(())
}
