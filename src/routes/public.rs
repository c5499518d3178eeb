use std::path::Path;

use axum::{
    Router,
    http::{HeaderValue, header},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

use crate::{AppState, handlers};

/// One year.
const STATIC_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Public Router Module
///
/// Endpoints that never touch the session: the asset tree under `/static` and
/// `GET /ping` for monitoring and load balancer checks.
pub fn public_routes(static_dir: &Path) -> Router<AppState> {
    let assets = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(STATIC_CACHE_CONTROL),
        ))
        .service(ServeDir::new(static_dir));

    Router::new()
        .route("/ping", get(handlers::ping))
        .nest_service("/static", assets)
}
