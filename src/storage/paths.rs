// PathLayout maps storage object names to their locations on disk.
//
// The tree under the configured root is split into a content-addressable
// blob store, per-repository link directories that gate access to it, and
// transient upload sessions:
//
//	<root>
//	├── blobs
//	│   └── <algorithm>
//	│       └── <first two hex chars>
//	│           └── <full hex>                          — blob file
//	├── repositories
//	│   └── <name>
//	│       ├── _layers
//	│       │   └── <algorithm>/<hex>/link              — layer link
//	│       └── _manifests
//	│           ├── revisions/<algorithm>/<hex>/link    — manifest revision
//	│           └── tags/<tag>/current/link             — tag pointer
//	└── uploads
//	    └── <uuid>
//	        ├── data                                    — accumulating bytes
//	        └── startedat                               — RFC 3339 stamp
//
// Every link file holds a digest string; the path encodes the relationship.
// Blobs themselves are shared across repositories and only ever reachable
// through links.

use std::path::{Path, PathBuf};

use oci_spec::image::Digest;

pub const LAYERS_DIR: &str = "_layers";
pub const MANIFESTS_DIR: &str = "_manifests";
pub const LINK_FILE: &str = "link";
pub const UPLOAD_DATA_FILE: &str = "data";
pub const UPLOAD_STARTEDAT_FILE: &str = "startedat";

#[derive(Clone, Debug)]
pub struct PathLayout {
    root: PathBuf,
}

impl PathLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path to the root of the blob store,
    /// (e.g. `<root>/blobs`).
    pub fn blobs_path(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Returns the path to a single blob file,
    /// (e.g. `<root>/blobs/<algorithm>/<first two hex chars>/<hex>`).
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let encoded = digest.digest();
        // Digests shorter than the prefix cannot occur for the supported
        // algorithms; fall back to the full hex if one ever does.
        let prefix = encoded.get(..2).unwrap_or(encoded);
        self.blobs_path()
            .join(digest.algorithm().to_string())
            .join(prefix)
            .join(encoded)
    }

    /// Returns the path to the root of the repositories,
    /// (e.g. `<root>/repositories`).
    pub fn repositories_path(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Returns the path to a single repository,
    /// (e.g. `<root>/repositories/<name>`).
    pub fn repository_path(&self, name: &str) -> PathBuf {
        self.repositories_path().join(name)
    }

    /// Returns the path to a repository's layer links,
    /// (e.g. `<root>/repositories/<name>/_layers`).
    pub fn layers_path(&self, name: &str) -> PathBuf {
        self.repository_path(name).join(LAYERS_DIR)
    }

    /// Returns the path to a single layer link,
    /// (e.g. `<root>/repositories/<name>/_layers/<algorithm>/<hex>/link`).
    pub fn layer_link_path(&self, name: &str, digest: &Digest) -> PathBuf {
        self.layers_path(name)
            .join(digest.algorithm().to_string())
            .join(digest.digest())
            .join(LINK_FILE)
    }

    /// Returns the path to a repository's manifest store,
    /// (e.g. `<root>/repositories/<name>/_manifests`).
    pub fn manifests_path(&self, name: &str) -> PathBuf {
        self.repository_path(name).join(MANIFESTS_DIR)
    }

    /// Returns the path to the manifest revisions of a repository,
    /// (e.g. `<root>/repositories/<name>/_manifests/revisions`).
    pub fn manifest_revisions_path(&self, name: &str) -> PathBuf {
        self.manifests_path(name).join("revisions")
    }

    /// Returns the path to a single manifest revision link,
    /// (e.g. `<root>/repositories/<name>/_manifests/revisions/<algorithm>/<hex>/link`).
    pub fn manifest_revision_link_path(&self, name: &str, digest: &Digest) -> PathBuf {
        self.manifest_revisions_path(name)
            .join(digest.algorithm().to_string())
            .join(digest.digest())
            .join(LINK_FILE)
    }

    /// Returns the path to the manifest tags of a repository,
    /// (e.g. `<root>/repositories/<name>/_manifests/tags`).
    pub fn manifest_tags_path(&self, name: &str) -> PathBuf {
        self.manifests_path(name).join("tags")
    }

    /// Returns the path to a single manifest tag,
    /// (e.g. `<root>/repositories/<name>/_manifests/tags/<tag>`).
    pub fn manifest_tag_path(&self, name: &str, tag: &str) -> PathBuf {
        self.manifest_tags_path(name).join(tag)
    }

    /// Returns the path to the link of a single manifest tag,
    /// (e.g. `<root>/repositories/<name>/_manifests/tags/<tag>/current/link`).
    pub fn manifest_tag_link_path(&self, name: &str, tag: &str) -> PathBuf {
        self.manifest_tag_path(name, tag).join("current").join(LINK_FILE)
    }

    /// Returns the path to the root of upload sessions,
    /// (e.g. `<root>/uploads`).
    pub fn uploads_path(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Returns the path to a single upload session,
    /// (e.g. `<root>/uploads/<id>`).
    pub fn upload_path(&self, id: &str) -> PathBuf {
        self.uploads_path().join(id)
    }

    /// Returns the path to the accumulated data of an upload session,
    /// (e.g. `<root>/uploads/<id>/data`).
    pub fn upload_data_path(&self, id: &str) -> PathBuf {
        self.upload_path(id).join(UPLOAD_DATA_FILE)
    }

    /// Returns the path to the creation stamp of an upload session,
    /// (e.g. `<root>/uploads/<id>/startedat`).
    pub fn upload_startedat_path(&self, id: &str) -> PathBuf {
        self.upload_path(id).join(UPLOAD_STARTEDAT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;

    fn layout() -> PathLayout {
        PathLayout::new("/srv/registry")
    }

    #[test]
    fn blob_paths_shard_on_hex_prefix() {
        let d = digest::compute(digest::SHA256, b"hello").unwrap();
        let path = layout().blob_path(&d);
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/srv/registry/blobs/sha256/2c/{}",
                d.digest()
            ))
        );
    }

    #[test]
    fn link_paths_encode_the_relationship() {
        let d = digest::compute(digest::SHA256, b"hello").unwrap();
        let hex = d.digest();
        let l = layout();
        assert_eq!(
            l.layer_link_path("library/nginx", &d),
            PathBuf::from(format!(
                "/srv/registry/repositories/library/nginx/_layers/sha256/{hex}/link"
            ))
        );
        assert_eq!(
            l.manifest_revision_link_path("library/nginx", &d),
            PathBuf::from(format!(
                "/srv/registry/repositories/library/nginx/_manifests/revisions/sha256/{hex}/link"
            ))
        );
        assert_eq!(
            l.manifest_tag_link_path("library/nginx", "latest"),
            PathBuf::from(
                "/srv/registry/repositories/library/nginx/_manifests/tags/latest/current/link"
            )
        );
    }

    #[test]
    fn upload_paths() {
        let l = layout();
        assert_eq!(
            l.upload_data_path("some-id"),
            PathBuf::from("/srv/registry/uploads/some-id/data")
        );
        assert_eq!(
            l.upload_startedat_path("some-id"),
            PathBuf::from("/srv/registry/uploads/some-id/startedat")
        );
    }
}
