use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::header::HeaderMap;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use oci_spec::image::Digest;
use tokio::io::AsyncReadExt;

use crate::digest;
use crate::error::{AppError, RegistryError};
use crate::manifest::{self, Manifest, ManifestError};
use crate::service::{parse_digest, require_valid_name};
use crate::utils::accept::is_acceptable;
use crate::utils::state::AppState;
use crate::utils::validation::{is_valid_digest, is_valid_reference, is_valid_tag};

/// Manifests are small JSON documents; anything beyond this is not one.
const MANIFEST_BYTE_LIMIT: usize = 4 * 1024 * 1024;

/// PUT /v2/<name>/manifests/<reference>
///
/// Buffers and validates the manifest, verifies every referenced blob
/// exists, then stores it under its content digest (plus the tag link when
/// the reference is a tag).
pub async fn put_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
    headers: HeaderMap,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    require_valid_reference(&reference)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            RegistryError::Unsupported("manifest PUT requires a Content-Type".to_string())
        })?;
    if !manifest::is_supported_media_type(&content_type) {
        return Err(
            RegistryError::Unsupported(format!("unrecognized manifest media type: {content_type}"))
                .into(),
        );
    }

    let bytes = axum::body::to_bytes(request.into_body(), MANIFEST_BYTE_LIMIT)
        .await
        .map_err(|_| {
            RegistryError::ManifestInvalid(format!(
                "manifest body unreadable or larger than {MANIFEST_BYTE_LIMIT} bytes"
            ))
        })?;

    let manifest = Manifest::parse(&bytes, &content_type).map_err(manifest_error)?;

    // Referential integrity: config and layers must already be present.
    for required in manifest.required_blobs() {
        if !state.storage.has_blob(required).await? {
            return Err(RegistryError::ManifestBlobUnknown(required.to_string()).into());
        }
    }

    let computed = computed_digest(&bytes, &reference)?;
    let tag = if is_valid_digest(&reference) {
        None
    } else {
        Some(reference.as_str())
    };
    state
        .storage
        .put_manifest(&name, tag, &computed, bytes)
        .await?;
    tracing::debug!("stored manifest {computed} in {name}");

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, format!("/v2/{name}/manifests/{computed}"))
        .header("Docker-Content-Digest", computed.to_string())
        .body(Body::empty())
        .unwrap())
}

/// GET /v2/<name>/manifests/<reference>
pub async fn get_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (bytes, digest, media_type) = fetch_manifest(&state, &name, &reference).await?;
    negotiate(&headers, &media_type)?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::from(bytes))
        .unwrap())
}

/// HEAD /v2/<name>/manifests/<reference>
///
/// Identical headers to GET, no body.
pub async fn head_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (bytes, digest, media_type) = fetch_manifest(&state, &name, &reference).await?;
    negotiate(&headers, &media_type)?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::empty())
        .unwrap())
}

/// DELETE /v2/<name>/manifests/<reference>
///
/// Only deletion by digest is supported; tags disappear with the revision
/// they point at.
pub async fn delete_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;

    if is_valid_digest(&reference) {
        let digest = parse_digest(&reference)?;
        if !state.storage.delete_manifest(&name, &digest).await? {
            return Err(RegistryError::ManifestUnknown(reference).into());
        }
        Ok(StatusCode::ACCEPTED)
    } else if is_valid_tag(&reference) {
        Err(RegistryError::Unsupported(
            "deleting manifests by tag is not supported; delete by digest".to_string(),
        )
        .into())
    } else {
        Err(RegistryError::ManifestInvalid(format!("invalid reference: {reference}")).into())
    }
}

/// Resolves a reference to (bytes, digest, media type). Digest references
/// must have a revision link in this repository; tags resolve through
/// their link file.
async fn fetch_manifest(
    state: &AppState,
    name: &str,
    reference: &str,
) -> Result<(Bytes, Digest, String), AppError> {
    require_valid_name(name)?;
    require_valid_reference(reference)?;

    let digest = if is_valid_digest(reference) {
        let digest = parse_digest(reference)?;
        if !state.storage.has_manifest_revision(name, &digest).await? {
            return Err(RegistryError::ManifestUnknown(reference.to_string()).into());
        }
        digest
    } else {
        state
            .storage
            .resolve_tag(name, reference)
            .await?
            .ok_or_else(|| RegistryError::ManifestUnknown(reference.to_string()))?
    };

    let mut file = state
        .storage
        .open_blob(&digest)
        .await?
        .ok_or_else(|| RegistryError::ManifestUnknown(reference.to_string()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;

    // Stored manifests were validated at PUT, so the media type is present.
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| RegistryError::ManifestInvalid(e.to_string()))?;
    let media_type = value
        .get("mediaType")
        .and_then(|v| v.as_str())
        .unwrap_or(manifest::DOCKER_MANIFEST)
        .to_string();

    Ok((Bytes::from(bytes), digest, media_type))
}

fn negotiate(headers: &HeaderMap, media_type: &str) -> Result<(), RegistryError> {
    let accept = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    let accept = if accept.is_empty() {
        None
    } else {
        Some(accept.as_str())
    };
    if is_acceptable(accept, media_type) {
        Ok(())
    } else {
        Err(RegistryError::ManifestUnacceptable {
            served: media_type.to_string(),
        })
    }
}

/// The manifest's digest, computed from the raw bytes. A digest reference
/// picks the hash algorithm and must match the result exactly.
fn computed_digest(bytes: &[u8], reference: &str) -> Result<Digest, AppError> {
    if is_valid_digest(reference) {
        let expected = parse_digest(reference)?;
        let computed = digest::compute(&expected.algorithm().to_string(), bytes)
            .map_err(|e| RegistryError::DigestInvalid(e.to_string()))?;
        if !digest::equals_constant_time(&computed, &expected) {
            return Err(RegistryError::DigestInvalid(format!(
                "provided digest {expected} does not match content digest {computed}"
            ))
            .into());
        }
        Ok(computed)
    } else {
        digest::compute(digest::SHA256, bytes)
            .map_err(|e| RegistryError::DigestInvalid(e.to_string()).into())
    }
}

fn require_valid_reference(reference: &str) -> Result<(), RegistryError> {
    if is_valid_reference(reference) {
        Ok(())
    } else {
        Err(RegistryError::ManifestInvalid(format!(
            "invalid reference: {reference}"
        )))
    }
}

fn manifest_error(err: ManifestError) -> AppError {
    match err {
        ManifestError::UnsupportedMediaType(mt) => {
            RegistryError::Unsupported(format!("unrecognized manifest media type: {mt}")).into()
        }
        other => RegistryError::ManifestInvalid(other.to_string()).into(),
    }
}
