//! Manifest decoding and validation.
//!
//! The wire format is duck-typed JSON discriminated by media type; here it
//! becomes a tagged variant over the two structural shapes: an image
//! manifest (config + layers) and an index (a list of sub-manifests).
//! Docker's v2 schema shares both shapes, so the four supported media
//! types map onto the same two variants.

use oci_spec::image::{Descriptor, Digest, ImageIndex, ImageManifest};
use thiserror::Error;

use crate::digest;

pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

pub fn is_supported_media_type(media_type: &str) -> bool {
    is_image_media_type(media_type) || is_index_media_type(media_type)
}

pub fn is_image_media_type(media_type: &str) -> bool {
    media_type == OCI_IMAGE_MANIFEST || media_type == DOCKER_MANIFEST
}

pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == OCI_IMAGE_INDEX || media_type == DOCKER_MANIFEST_LIST
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("unsupported manifest media type: {0}")]
    UnsupportedMediaType(String),

    #[error("manifest is not valid JSON for its media type: {0}")]
    Malformed(String),

    #[error("unsupported schema version: {0}")]
    SchemaVersion(u32),

    #[error("manifest body carries no mediaType")]
    MediaTypeMissing,

    #[error("manifest body mediaType {body} does not match Content-Type {header}")]
    MediaTypeMismatch { body: String, header: String },

    #[error("invalid descriptor: {0}")]
    BadDescriptor(String),
}

#[derive(Debug, Clone)]
pub enum Manifest {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl Manifest {
    /// Decodes `bytes` as the structural shape selected by `media_type` and
    /// runs the structural checks: schema version 2, body/header media type
    /// agreement, and well-formed descriptors.
    pub fn parse(bytes: &[u8], media_type: &str) -> Result<Self, ManifestError> {
        let manifest = if is_image_media_type(media_type) {
            let image: ImageManifest = serde_json::from_slice(bytes)
                .map_err(|e| ManifestError::Malformed(e.to_string()))?;
            Manifest::Image(image)
        } else if is_index_media_type(media_type) {
            let index: ImageIndex = serde_json::from_slice(bytes)
                .map_err(|e| ManifestError::Malformed(e.to_string()))?;
            Manifest::Index(index)
        } else {
            return Err(ManifestError::UnsupportedMediaType(media_type.to_string()));
        };
        manifest.validate(media_type)?;
        Ok(manifest)
    }

    fn validate(&self, header_media_type: &str) -> Result<(), ManifestError> {
        let schema_version = match self {
            Manifest::Image(m) => m.schema_version(),
            Manifest::Index(m) => m.schema_version(),
        };
        if schema_version != 2 {
            return Err(ManifestError::SchemaVersion(schema_version));
        }

        let body_media_type = self
            .media_type()
            .ok_or(ManifestError::MediaTypeMissing)?;
        if body_media_type != header_media_type {
            return Err(ManifestError::MediaTypeMismatch {
                body: body_media_type,
                header: header_media_type.to_string(),
            });
        }

        for descriptor in self.descriptors() {
            validate_descriptor(descriptor)?;
        }
        Ok(())
    }

    /// The media type declared in the body.
    pub fn media_type(&self) -> Option<String> {
        match self {
            Manifest::Image(m) => m.media_type().clone().map(|mt| mt.to_string()),
            Manifest::Index(m) => m.media_type().clone().map(|mt| mt.to_string()),
        }
    }

    fn descriptors(&self) -> Vec<&Descriptor> {
        match self {
            Manifest::Image(m) => {
                let mut all = vec![m.config()];
                all.extend(m.layers().iter());
                all
            }
            Manifest::Index(m) => m.manifests().iter().collect(),
        }
    }

    /// Blob digests that must exist before the manifest is accepted:
    /// config and layers of an image manifest. Index references point at
    /// other manifests and are not required to be present.
    pub fn required_blobs(&self) -> Vec<&Digest> {
        match self {
            Manifest::Image(m) => {
                let mut digests = vec![m.config().digest()];
                digests.extend(m.layers().iter().map(|l| l.digest()));
                digests
            }
            Manifest::Index(_) => Vec::new(),
        }
    }

    /// Every digest this manifest reaches, for garbage-collection marking:
    /// config + layers for images, referenced manifests for indices.
    pub fn referenced_digests(&self) -> Vec<&Digest> {
        self.descriptors().into_iter().map(|d| d.digest()).collect()
    }
}

fn validate_descriptor(descriptor: &Descriptor) -> Result<(), ManifestError> {
    let media_type = descriptor.media_type().to_string();
    if media_type.is_empty() {
        return Err(ManifestError::BadDescriptor(
            "descriptor mediaType is empty".to_string(),
        ));
    }
    // Typed decoding already shaped the digest; re-check it against the
    // algorithms this registry actually stores.
    digest::parse(&descriptor.digest().to_string())
        .map_err(|e| ManifestError::BadDescriptor(e.to_string()))?;
    Ok(())
}
