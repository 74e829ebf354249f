use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderMap, LOCATION, RANGE};
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, RegistryError};
use crate::service::{parse_digest, require_valid_name, session_range, upload_error};
use crate::storage::CommitOutcome;
use crate::utils::state::AppState;
use crate::utils::validation::{is_valid_name, is_valid_session_id};

/// HEAD /v2/<name>/blobs/<digest>
pub async fn head_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    let digest = parse_digest(&digest_str)?;

    let size = state
        .storage
        .blob_size(&digest)
        .await?
        .ok_or(RegistryError::BlobUnknown(digest_str.clone()))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header("Docker-Content-Digest", digest_str)
        .body(Body::empty())
        .unwrap())
}

/// GET /v2/<name>/blobs/<digest>
///
/// Serves the full blob, or a single `bytes=start-end` range as a 206.
pub async fn get_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest_str)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    let digest = parse_digest(&digest_str)?;

    let mut file = state
        .storage
        .open_blob(&digest)
        .await?
        .ok_or(RegistryError::BlobUnknown(digest_str.clone()))?;
    let size = file.metadata().await?.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|raw| parse_byte_range(raw, size))
        .transpose()?;

    let response = match range {
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, size)
            .header("Docker-Content-Digest", digest_str)
            .body(Body::from_stream(ReaderStream::new(file)))
            .unwrap(),
        Some((start, end)) => {
            file.seek(SeekFrom::Start(start)).await?;
            let length = end - start + 1;
            let limited = file.take(length);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, length)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                .header("Docker-Content-Digest", digest_str)
                .body(Body::from_stream(ReaderStream::new(limited)))
                .unwrap()
        }
    };
    Ok(response)
}

/// DELETE /v2/<name>/blobs/<digest>
///
/// Removes this repository's link; the blob file itself goes only when the
/// last link across all repositories is gone.
pub async fn delete_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    let digest = parse_digest(&digest_str)?;

    if !state.storage.has_layer_link(&name, &digest).await? {
        return Err(RegistryError::BlobUnknown(digest_str).into());
    }
    state.storage.unlink_blob(&name, &digest).await?;
    if state.storage.count_blob_references(&digest).await? == 0 {
        state.storage.delete_blob(&digest).await?;
    }

    Ok(StatusCode::ACCEPTED)
}

/// POST /v2/<name>/blobs/uploads/
///
/// Three shapes share the route: cross-repo mount (`mount=&from=`),
/// monolithic single-request upload (`digest=`), and plain session
/// initiation. A mount that cannot be satisfied falls back to initiation.
pub async fn post_blob_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;

    if let (Some(mount), Some(from)) = (params.get("mount"), params.get("from"))
        && is_valid_name(from)
        && let Ok(digest) = crate::digest::parse(mount)
        && state.storage.has_layer_link(from, &digest).await?
        && state.storage.has_blob(&digest).await?
    {
        state.storage.link_blob(&name, &digest).await?;
        tracing::debug!("mounted {digest} from {from} into {name}");
        return Ok(Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, format!("/v2/{name}/blobs/{digest}"))
            .header("Docker-Content-Digest", digest.to_string())
            .body(Body::empty())
            .unwrap());
    }

    if let Some(digest_str) = params.get("digest") {
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                RegistryError::SizeInvalid(
                    "Content-Length header is required for monolithic upload".to_string(),
                )
            })?;
        if content_length == 0 {
            return Err(
                RegistryError::SizeInvalid("Content-Length cannot be zero".to_string()).into(),
            );
        }

        let digest = parse_digest(digest_str)?;
        let outcome = state
            .storage
            .put_blob(&digest, request.into_body().into_data_stream())
            .await?;
        if outcome == CommitOutcome::DigestMismatch {
            return Err(RegistryError::DigestInvalid(
                "uploaded content does not match digest".to_string(),
            )
            .into());
        }
        state.storage.link_blob(&name, &digest).await?;

        return Ok(Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, format!("/v2/{name}/blobs/{digest}"))
            .header("Docker-Content-Digest", digest.to_string())
            .body(Body::empty())
            .unwrap());
    }

    let session_id = state.uploads.create().await?;
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(LOCATION, format!("/v2/{name}/blobs/uploads/{session_id}"))
        .header("Docker-Upload-UUID", session_id)
        .header(RANGE, "0-0")
        .body(Body::empty())
        .unwrap())
}

/// GET /v2/<name>/blobs/uploads/<session_id>
pub async fn get_upload_status_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    require_valid_session_id(&session_id)?;

    let size = state
        .uploads
        .status(&session_id)
        .await
        .map_err(|e| upload_error(&name, &session_id, e))?;

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(LOCATION, format!("/v2/{name}/blobs/uploads/{session_id}"))
        .header(RANGE, session_range(size))
        .header("Docker-Upload-UUID", &session_id)
        .body(Body::empty())
        .unwrap())
}

/// PATCH /v2/<name>/blobs/uploads/<session_id>
pub async fn patch_upload_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    require_valid_session_id(&session_id)?;

    let declared_start = declared_content_range_start(&headers)?;
    let new_size = state
        .uploads
        .append(
            &session_id,
            declared_start,
            request.into_body().into_data_stream(),
        )
        .await
        .map_err(|e| upload_error(&name, &session_id, e))?;

    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(LOCATION, format!("/v2/{name}/blobs/uploads/{session_id}"))
        .header(RANGE, session_range(new_size))
        .header("Docker-Upload-UUID", &session_id)
        .body(Body::empty())
        .unwrap())
}

/// PUT /v2/<name>/blobs/uploads/<session_id>?digest=<digest>
pub async fn put_upload_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    require_valid_session_id(&session_id)?;

    let digest_str = params.get("digest").ok_or_else(|| {
        RegistryError::DigestInvalid(
            "digest query parameter is required to finalize upload".to_string(),
        )
    })?;
    let digest = parse_digest(digest_str)?;

    state
        .uploads
        .finalize(
            &name,
            &session_id,
            &digest,
            request.into_body().into_data_stream(),
        )
        .await
        .map_err(|e| upload_error(&name, &session_id, e))?;

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header(LOCATION, format!("/v2/{name}/blobs/{digest}"))
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::empty())
        .unwrap())
}

/// DELETE /v2/<name>/blobs/uploads/<session_id>
pub async fn delete_upload_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;
    require_valid_session_id(&session_id)?;

    state
        .uploads
        .abort(&session_id)
        .await
        .map_err(|e| upload_error(&name, &session_id, e))?;
    Ok(StatusCode::NO_CONTENT)
}

fn require_valid_session_id(id: &str) -> Result<(), RegistryError> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(RegistryError::BlobUploadInvalid(format!(
            "malformed upload session id: {id}"
        )))
    }
}

/// Declared start offset of a PATCH, from `Content-Range: <start>-<end>`
/// (a `bytes ` prefix is tolerated). When present, `Content-Length` must
/// agree with the declared span.
fn declared_content_range_start(headers: &HeaderMap) -> Result<Option<u64>, RegistryError> {
    let Some(raw) = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };

    let spec = raw
        .trim()
        .strip_prefix("bytes=")
        .or_else(|| raw.trim().strip_prefix("bytes "))
        .unwrap_or(raw.trim());
    let (start, end) = spec.split_once('-').ok_or_else(|| {
        RegistryError::BlobUploadInvalid(format!("malformed Content-Range: {raw}"))
    })?;
    let start: u64 = start.trim().parse().map_err(|_| {
        RegistryError::BlobUploadInvalid(format!("malformed Content-Range start: {raw}"))
    })?;
    let end: u64 = end.trim().parse().map_err(|_| {
        RegistryError::BlobUploadInvalid(format!("malformed Content-Range end: {raw}"))
    })?;
    if start > end {
        return Err(RegistryError::BlobUploadInvalid(format!(
            "Content-Range start exceeds end: {raw}"
        )));
    }

    if let Some(content_length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        && content_length != end - start + 1
    {
        return Err(RegistryError::SizeInvalid(
            "Content-Length does not match Content-Range".to_string(),
        ));
    }

    Ok(Some(start))
}

/// Parses a blob request's `Range: bytes=start-end` header against the blob
/// size. An omitted end means end-of-blob; an oversized end is clamped.
/// Anything unsatisfiable is a 416 carrying `bytes */<size>`.
fn parse_byte_range(raw: &str, size: u64) -> Result<(u64, u64), RegistryError> {
    let invalid = || RegistryError::BlobRangeInvalid { size };

    let spec = raw.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
    if spec.contains(',') {
        return Err(invalid());
    }
    let (start, end) = spec.split_once('-').ok_or_else(invalid)?;
    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end: u64 = match end.trim() {
        "" => size.saturating_sub(1),
        e => e.parse::<u64>().map_err(|_| invalid())?.min(size.saturating_sub(1)),
    };
    if start >= size || start > end {
        return Err(invalid());
    }
    Ok((start, end))
}
