use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{get, post},
};

/// Largest accepted snippet submission.
const SNIPPET_FORM_LIMIT: usize = 4096;

/// Protected Router Module
///
/// Every route here sits behind the access gate, which runs after the identity
/// resolver. Handlers can therefore rely on the request being authenticated.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Home page listing the latest snippets.
        .route("/", get(handlers::home))
        // GET /snippet/view/{id}
        .route("/snippet/view/{id}", get(handlers::snippet_view))
        // GET/POST /snippet/create
        .route(
            "/snippet/create",
            get(handlers::snippet_create).post(
                handlers::snippet_create_post.layer(DefaultBodyLimit::max(SNIPPET_FORM_LIMIT)),
            ),
        )
        // GET /user/account/view
        .route("/user/account/view", get(handlers::account_view))
        // POST /user/logout
        // Renews the session token and removes the identity.
        .route("/user/logout", post(handlers::user_logout_post))
}
