use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use oci_spec::distribution::TagListBuilder;
use serde::Serialize;

use crate::error::{AppError, InternalError, RegistryError};
use crate::service::require_valid_name;
use crate::utils::state::AppState;

/// GET /v2/<name>/tags/list?n=&last=
pub async fn get_tag_list_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    require_valid_name(&name)?;

    // An absent repository and a repository without tags are different
    // answers; stat the repository before listing.
    if !state.storage.repository_exists(&name).await? {
        return Err(RegistryError::NameUnknown(name).into());
    }

    let tags = state.storage.list_tags(&name).await?;
    let limit = state.config.pagination.resolve_limit(params.get("n").map(String::as_str));
    let page = paginate(tags, params.get("last").map(String::as_str), limit);

    let body = TagListBuilder::default()
        .name(name.clone())
        .tags(page.items.clone())
        .build()
        .map_err(|e| InternalError::Other(e.to_string()))?;

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Some(last) = page.next_last {
        let link = format!("</v2/{name}/tags/list?n={limit}&last={last}>; rel=\"next\"");
        response
            .headers_mut()
            .insert(header::LINK, link.parse().unwrap());
    }
    Ok(response)
}

/// GET /v2/_catalog?n=&last=
///
/// Same paging semantics as tag listing, over fully-qualified repository
/// names.
pub async fn get_catalog_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response<axum::body::Body>, AppError> {
    let repositories = state.storage.list_repositories().await?;
    let limit = state.config.pagination.resolve_limit(params.get("n").map(String::as_str));
    let page = paginate(repositories, params.get("last").map(String::as_str), limit);

    let body = CatalogBody {
        repositories: page.items.clone(),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Some(last) = page.next_last {
        let link = format!("</v2/_catalog?n={limit}&last={last}>; rel=\"next\"");
        response
            .headers_mut()
            .insert(header::LINK, link.parse().unwrap());
    }
    Ok(response)
}

#[derive(Serialize)]
struct CatalogBody {
    repositories: Vec<String>,
}

struct Page {
    items: Vec<String>,
    /// Cursor for the Link header when more results remain.
    next_last: Option<String>,
}

/// Cursor pagination over a sorted listing: everything strictly after
/// `last`, truncated to `limit`, with the cursor of the next page when the
/// listing continues past it.
fn paginate(sorted: Vec<String>, last: Option<&str>, limit: usize) -> Page {
    let mut items: Vec<String> = match last {
        Some(last) => sorted.into_iter().filter(|i| i.as_str() > last).collect(),
        None => sorted,
    };
    if items.len() > limit {
        items.truncate(limit);
        let next_last = items.last().cloned();
        Page { items, next_last }
    } else {
        Page {
            items,
            next_last: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pagination_truncates_and_cursors() {
        let page = paginate(names(&["a", "b", "c", "d"]), None, 2);
        assert_eq!(page.items, ["a", "b"]);
        assert_eq!(page.next_last.as_deref(), Some("b"));

        let page = paginate(names(&["a", "b", "c", "d"]), Some("b"), 2);
        assert_eq!(page.items, ["c", "d"]);
        assert_eq!(page.next_last, None);
    }

    #[test]
    fn pagination_excludes_the_cursor_itself() {
        let page = paginate(names(&["a", "b", "c"]), Some("a"), 10);
        assert_eq!(page.items, ["b", "c"]);
    }

    #[test]
    fn pagination_with_unknown_cursor_skips_past_it() {
        let page = paginate(names(&["a", "c"]), Some("b"), 10);
        assert_eq!(page.items, ["c"]);
    }

    #[test]
    fn exact_fit_emits_no_cursor() {
        let page = paginate(names(&["a", "b"]), None, 2);
        assert_eq!(page.items, ["a", "b"]);
        assert_eq!(page.next_last, None);
    }
}
