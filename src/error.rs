use axum::Json;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_RANGE, LOCATION, RANGE};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use std::io;
use thiserror::Error;

/// Closed set of OCI error codes. Serialized exactly as they appear on the
/// wire, with a static code-to-status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "BLOB_UNKNOWN")]
    BlobUnknown,
    #[serde(rename = "BLOB_UPLOAD_INVALID")]
    BlobUploadInvalid,
    #[serde(rename = "BLOB_UPLOAD_UNKNOWN")]
    BlobUploadUnknown,
    #[serde(rename = "DIGEST_INVALID")]
    DigestInvalid,
    #[serde(rename = "MANIFEST_BLOB_UNKNOWN")]
    ManifestBlobUnknown,
    #[serde(rename = "MANIFEST_INVALID")]
    ManifestInvalid,
    #[serde(rename = "MANIFEST_UNACCEPTABLE")]
    ManifestUnacceptable,
    #[serde(rename = "MANIFEST_UNKNOWN")]
    ManifestUnknown,
    #[serde(rename = "NAME_INVALID")]
    NameInvalid,
    #[serde(rename = "NAME_UNKNOWN")]
    NameUnknown,
    #[serde(rename = "SIZE_INVALID")]
    SizeInvalid,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "DENIED")]
    Denied,
    #[serde(rename = "UNSUPPORTED")]
    Unsupported,
    #[serde(rename = "TOOMANYREQUESTS")]
    TooManyRequests,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BlobUnknown
            | Self::BlobUploadUnknown
            | Self::ManifestBlobUnknown
            | Self::ManifestUnknown
            | Self::NameUnknown => StatusCode::NOT_FOUND,
            Self::BlobUploadInvalid
            | Self::DigestInvalid
            | Self::ManifestInvalid
            | Self::NameInvalid
            | Self::SizeInvalid => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Denied => StatusCode::FORBIDDEN,
            Self::ManifestUnacceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Unsupported => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// The single OCI error envelope: `{"errors": [{code, message, detail?}]}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorEnvelope {
    pub fn single(code: ErrorCode, message: impl Into<String>, detail: Option<Value>) -> Self {
        ErrorEnvelope {
            errors: vec![ErrorEntry {
                code,
                message: message.into(),
                detail,
            }],
        }
    }
}

/// Protocol-level failures, one variant per OCI condition the endpoints
/// report. Variants carry the value that goes into the envelope `detail`.
#[allow(dead_code)]
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("blob unknown: {0}")]
    BlobUnknown(String),

    #[error("blob upload invalid: {0}")]
    BlobUploadInvalid(String),

    #[error("blob upload unknown: {0}")]
    BlobUploadUnknown(String),

    #[error("digest invalid: {0}")]
    DigestInvalid(String),

    #[error("manifest references unknown blob: {0}")]
    ManifestBlobUnknown(String),

    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("manifest media type {served} not covered by Accept")]
    ManifestUnacceptable { served: String },

    #[error("manifest unknown: {0}")]
    ManifestUnknown(String),

    #[error("invalid repository name: {0}")]
    NameInvalid(String),

    #[error("repository not known to registry: {0}")]
    NameUnknown(String),

    #[error("invalid content size: {0}")]
    SizeInvalid(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("denied: {0}")]
    Denied(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("too many requests")]
    TooManyRequests,

    /// PATCH at the wrong offset. Rendered as a bare 416 whose headers point
    /// the client back at the session's current tail.
    #[error("range not satisfiable for upload {session_id}")]
    RangeNotSatisfiable {
        repo: String,
        session_id: String,
        current_size: u64,
    },

    /// Blob GET with an unsatisfiable byte range.
    #[error("requested range exceeds blob of {size} bytes")]
    BlobRangeInvalid { size: u64 },
}

impl RegistryError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::BlobUnknown(_) => ErrorCode::BlobUnknown,
            Self::BlobUploadInvalid(_) | Self::RangeNotSatisfiable { .. } => {
                ErrorCode::BlobUploadInvalid
            }
            Self::BlobUploadUnknown(_) => ErrorCode::BlobUploadUnknown,
            Self::DigestInvalid(_) => ErrorCode::DigestInvalid,
            Self::ManifestBlobUnknown(_) => ErrorCode::ManifestBlobUnknown,
            Self::ManifestInvalid(_) => ErrorCode::ManifestInvalid,
            Self::ManifestUnacceptable { .. } => ErrorCode::ManifestUnacceptable,
            Self::ManifestUnknown(_) => ErrorCode::ManifestUnknown,
            Self::NameInvalid(_) => ErrorCode::NameInvalid,
            Self::NameUnknown(_) => ErrorCode::NameUnknown,
            Self::SizeInvalid(_) | Self::BlobRangeInvalid { .. } => ErrorCode::SizeInvalid,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Denied(_) => ErrorCode::Denied,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::TooManyRequests => ErrorCode::TooManyRequests,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            Self::BlobUnknown(digest) | Self::ManifestBlobUnknown(digest) => {
                Some(json!({ "digest": digest }))
            }
            Self::BlobUploadUnknown(session_id) => Some(json!({ "session_id": session_id })),
            Self::ManifestUnknown(reference) => Some(json!({ "reference": reference })),
            Self::NameInvalid(name) | Self::NameUnknown(name) => Some(json!({ "name": name })),
            Self::ManifestUnacceptable { served } => Some(json!({ "mediaType": served })),
            _ => None,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        match self {
            Self::RangeNotSatisfiable {
                repo,
                session_id,
                current_size,
            } => Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(LOCATION, format!("/v2/{repo}/blobs/uploads/{session_id}"))
                .header(RANGE, format!("0-{}", current_size.saturating_sub(1)))
                .header("Docker-Upload-UUID", session_id)
                .body(Body::empty())
                .unwrap(),
            Self::BlobRangeInvalid { size } => Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(CONTENT_RANGE, format!("bytes */{size}"))
                .body(Body::empty())
                .unwrap(),
            other => {
                let code = other.code();
                let body = ErrorEnvelope::single(code, other.to_string(), other.detail());
                (code.status(), Json(body)).into_response()
            }
        }
    }
}

/// Failures that are nobody's fault at the protocol level. Clients get a
/// generic 500; the real error goes to the log.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("axum error: {0}")]
    Axum(#[from] axum::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl IntoResponse for InternalError {
    fn into_response(self) -> Response {
        // Detail only in debug builds; production responses stay generic.
        let detail = if cfg!(debug_assertions) {
            Some(json!({ "cause": self.to_string() }))
        } else {
            None
        };
        let body = ErrorEnvelope::single(ErrorCode::Unsupported, "internal server error", detail);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(InternalError::Io(err))
    }
}

impl From<axum::Error> for AppError {
    fn from(err: axum::Error) -> Self {
        AppError::Internal(InternalError::Axum(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(InternalError::Json(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => tracing::error!("internal server error: {e:?}"),
            Self::Registry(e) => tracing::debug!("request failed: {e}"),
        }
        match self {
            Self::Registry(e) => e.into_response(),
            Self::Internal(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_status_table() {
        assert_eq!(ErrorCode::BlobUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::BlobUploadUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ManifestBlobUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ManifestUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::NameUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DigestInvalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::SizeInvalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::ManifestUnacceptable.status(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            ErrorCode::Unsupported.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ErrorCode::TooManyRequests.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = ErrorEnvelope::single(
            ErrorCode::BlobUnknown,
            "blob unknown",
            Some(json!({ "digest": "sha256:deadbeef" })),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "errors": [{
                    "code": "BLOB_UNKNOWN",
                    "message": "blob unknown",
                    "detail": { "digest": "sha256:deadbeef" }
                }]
            })
        );
    }

    #[test]
    fn detail_omitted_when_absent() {
        let envelope = ErrorEnvelope::single(ErrorCode::TooManyRequests, "too many requests", None);
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("detail"));
        assert!(text.contains("TOOMANYREQUESTS"));
    }
}
