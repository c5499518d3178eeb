use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Dynamic Router Module
///
/// Routes that need a session (flash messages, CSRF tokens, login state) but are
/// reachable without being signed in.
pub fn dynamic_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /user/signup
        .route(
            "/user/signup",
            get(handlers::user_signup).post(handlers::user_signup_post),
        )
        // GET/POST /user/login
        // A successful POST renews the session token and records the identity.
        .route(
            "/user/login",
            get(handlers::user_login).post(handlers::user_login_post),
        )
}
