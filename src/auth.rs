use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::{
    error::AppError,
    models::UserId,
    repository::RepositoryState,
    session,
};

pub const LOGIN_PATH: &str = "/user/login";
pub const MUST_AUTHENTICATE: &str = "You must be authenticated to access this page.";

/// Authentication
///
/// The per-request authentication flag. Only `authenticate` inserts it, and only
/// after confirming the session's identity still exists. A request that never
/// passed through the resolver reads as `Anonymous`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Authentication {
    #[default]
    Anonymous,
    Authenticated,
}

impl Authentication {
    pub fn is_authenticated(self) -> bool {
        matches!(self, Authentication::Authenticated)
    }
}

impl<S> FromRequestParts<S> for Authentication
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Authentication>()
            .copied()
            .unwrap_or_default())
    }
}

/// Outcome of checking a session's stored identity.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Anonymous,
    Authenticated(UserId),
    // The session names a user that no longer exists.
    Stale(UserId),
}

async fn resolve(repo: &RepositoryState, session: &Session) -> Result<Resolution, AppError> {
    let Some(id) = session::authenticated_user_id(session).await? else {
        return Ok(Resolution::Anonymous);
    };

    if repo.user_exists(id).await? {
        Ok(Resolution::Authenticated(id))
    } else {
        Ok(Resolution::Stale(id))
    }
}

/// authenticate
///
/// The identity resolver. Runs on every dynamic request, after the session is
/// loaded, with no caching, so deleting an account takes effect on the next request.
///
/// *Failure mode*: a failed existence check is a server error. It never falls back
/// to treating the request as authenticated.
pub async fn authenticate(
    State(repo): State<RepositoryState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match resolve(&repo, &session).await? {
        Resolution::Authenticated(_) => {
            request.extensions_mut().insert(Authentication::Authenticated);
        }
        Resolution::Stale(id) => {
            tracing::debug!(user_id = id, "session names a user that no longer exists");
        }
        Resolution::Anonymous => {}
    }

    Ok(next.run(request).await)
}

/// require_authentication
///
/// The access gate for protected routes. Reads the flag set by `authenticate`; it
/// never re-derives identity itself. Anonymous requests get a flash message and a
/// 303 to the login page. Authenticated responses are marked `no-store`.
pub async fn require_authentication(
    auth: Authentication,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !auth.is_authenticated() {
        session::put_flash(&session, MUST_AUTHENTICATE).await?;
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .append(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
