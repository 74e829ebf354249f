pub mod v2;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::get;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router<()> {
    // we need to handle both /v2 and /v2/
    Router::new()
        .route("/v2/", get(v2::probe))
        .nest("/v2", v2::create_v2_router())
        // Every response on this API declares the distribution version,
        // errors included.
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("docker-distribution-api-version"),
            HeaderValue::from_static("registry/2.0"),
        ))
        .with_state(state)
}
