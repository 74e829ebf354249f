use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;

use crate::error::AppError;
use crate::service::blob::{
    delete_blob_handler, delete_upload_handler, get_blob_handler, get_upload_status_handler,
    head_blob_handler, patch_upload_handler, post_blob_handler, put_upload_handler,
};
use crate::service::manifest::{
    delete_manifest_handler, get_manifest_handler, head_manifest_handler, put_manifest_handler,
};
use crate::service::tags::{get_catalog_handler, get_tag_list_handler};
use crate::utils::state::AppState;

pub fn create_v2_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(probe))
        .route("/{*tail}", any(dispatch_handler))
}

/// GET /v2/ — the base API check.
pub async fn probe() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({})))
}

// Repository names contain `/`, so the framework cannot split
// `/v2/<name>/manifests/<ref>` for us; one wildcard route pattern-matches
// the tail segments instead.
async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    Path(tail): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, AppError> {
    let method = request.method().clone();
    let segments: Vec<&str> = tail.split('/').collect();

    match segments.as_slice() {
        // tail: _catalog
        ["_catalog"] => {
            if method == Method::GET {
                get_catalog_handler(State(state), Query(params))
                    .await
                    .map(|res| res.into_response())
            } else {
                Ok(method_not_allowed())
            }
        }
        // tail: {name}/manifests/{reference}
        [name @ .., "manifests", reference] if !name.is_empty() => {
            let name = name.join("/");
            let reference = reference.to_string();
            match method {
                Method::GET => get_manifest_handler(State(state), Path((name, reference)), headers)
                    .await
                    .map(|res| res.into_response()),
                Method::HEAD => {
                    head_manifest_handler(State(state), Path((name, reference)), headers)
                        .await
                        .map(|res| res.into_response())
                }
                Method::PUT => {
                    put_manifest_handler(State(state), Path((name, reference)), headers, request)
                        .await
                        .map(|res| res.into_response())
                }
                Method::DELETE => delete_manifest_handler(State(state), Path((name, reference)))
                    .await
                    .map(|res| res.into_response()),
                _ => Ok(method_not_allowed()),
            }
        }
        // tail: {name}/blobs/{digest}
        [name @ .., "blobs", digest] if !name.is_empty() && *digest != "uploads" => {
            let name = name.join("/");
            let digest = digest.to_string();
            match method {
                Method::GET => get_blob_handler(State(state), Path((name, digest)), headers)
                    .await
                    .map(|res| res.into_response()),
                Method::HEAD => head_blob_handler(State(state), Path((name, digest)))
                    .await
                    .map(|res| res.into_response()),
                Method::DELETE => delete_blob_handler(State(state), Path((name, digest)))
                    .await
                    .map(|res| res.into_response()),
                _ => Ok(method_not_allowed()),
            }
        }
        // tail: {name}/blobs/uploads or {name}/blobs/uploads/
        [name @ .., "blobs", "uploads"] if !name.is_empty() => {
            upload_initiation(state, name.join("/"), method, params, headers, request).await
        }
        [name @ .., "blobs", "uploads", session_id]
            if !name.is_empty() && session_id.is_empty() =>
        {
            upload_initiation(state, name.join("/"), method, params, headers, request).await
        }
        // tail: {name}/blobs/uploads/{session_id}
        [name @ .., "blobs", "uploads", session_id] if !name.is_empty() => {
            let name = name.join("/");
            let session_id = session_id.to_string();
            match method {
                Method::PATCH => {
                    patch_upload_handler(State(state), Path((name, session_id)), headers, request)
                        .await
                        .map(|res| res.into_response())
                }
                Method::PUT => put_upload_handler(
                    State(state),
                    Path((name, session_id)),
                    Query(params),
                    request,
                )
                .await
                .map(|res| res.into_response()),
                Method::GET => get_upload_status_handler(State(state), Path((name, session_id)))
                    .await
                    .map(|res| res.into_response()),
                Method::DELETE => delete_upload_handler(State(state), Path((name, session_id)))
                    .await
                    .map(|res| res.into_response()),
                _ => Ok(method_not_allowed()),
            }
        }
        // tail: {name}/tags/list
        [name @ .., "tags", "list"] if !name.is_empty() => {
            let name = name.join("/");
            if method == Method::GET {
                get_tag_list_handler(State(state), Path(name), Query(params))
                    .await
                    .map(|res| res.into_response())
            } else {
                Ok(method_not_allowed())
            }
        }
        _ => Ok((StatusCode::NOT_FOUND, "not found").into_response()),
    }
}

async fn upload_initiation(
    state: Arc<AppState>,
    name: String,
    method: Method,
    params: HashMap<String, String>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, AppError> {
    if method == Method::POST {
        post_blob_handler(State(state), Path(name), Query(params), headers, request)
            .await
            .map(|res| res.into_response())
    } else {
        Ok(method_not_allowed())
    }
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()
}
