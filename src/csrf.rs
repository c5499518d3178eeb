use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    error::{AppError, AppResult},
    session::CSRF_TOKEN,
};

/// Form field the rendered pages carry the token in.
pub const CSRF_FORM_FIELD: &str = "csrf_token";
/// Header accepted in place of the form field.
pub const CSRF_HEADER: &str = "x-csrf-token";

const MAX_FORM_BYTES: usize = 64 * 1024;

/// CsrfToken
///
/// The verification token bound to the current session. Inserted into the request
/// extensions by `verify_csrf_token`; handlers extract it to embed in their forms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| AppError::Internal("route is not behind the CSRF guard".to_string()))
    }
}

#[derive(Deserialize)]
struct CsrfForm {
    csrf_token: Option<String>,
}

/// verify_csrf_token
///
/// Must sit inside the session layer. Every request gets a token bound to its
/// session; state-changing requests are rejected with 400 unless they submit
/// that same token, and the handler never runs.
pub async fn verify_csrf_token(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = issue_token(&session).await?;

    let mut request = if requires_validation(request.method()) {
        let (submitted, request) = submitted_token(request).await?;
        match submitted {
            Some(token) if tokens_match(&token, expected.as_str()) => request,
            _ => {
                tracing::warn!(
                    method = %request.method(),
                    uri = %request.uri(),
                    "rejected request with missing or invalid CSRF token"
                );
                return Err(AppError::BadRequest);
            }
        }
    } else {
        request
    };

    request.extensions_mut().insert(expected);
    Ok(next.run(request).await)
}

/// Reuses the session's token when one exists; only a fresh session gets a new one.
async fn issue_token(session: &Session) -> AppResult<CsrfToken> {
    if let Some(token) = session.get::<String>(CSRF_TOKEN).await? {
        return Ok(CsrfToken(token));
    }

    let token = generate_token();
    session.insert(CSRF_TOKEN, &token).await?;
    Ok(CsrfToken(token))
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn requires_validation(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Looks for the token in the header first, then in a url-encoded body. The body
/// is buffered and handed back so the handler can still decode it.
async fn submitted_token(request: Request) -> AppResult<(Option<String>, Request)> {
    let from_header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    if from_header.is_some() || !is_form(request.headers()) {
        return Ok((from_header, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| AppError::BadRequest)?;
    let token = serde_urlencoded::from_bytes::<CsrfForm>(&bytes)
        .ok()
        .and_then(|form| form.csrf_token);

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

fn tokens_match(submitted: &str, expected: &str) -> bool {
    submitted.len() == expected.len()
        && submitted
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods_skip_validation() {
        assert!(!requires_validation(&Method::GET));
        assert!(!requires_validation(&Method::HEAD));
        assert!(!requires_validation(&Method::OPTIONS));
        assert!(requires_validation(&Method::POST));
        assert!(requires_validation(&Method::PUT));
        assert!(requires_validation(&Method::DELETE));
        assert!(requires_validation(&Method::PATCH));
    }

    #[test]
    fn token_comparison_requires_exact_match() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc124", "abc123"));
        assert!(!tokens_match("abc12", "abc123"));
        assert!(!tokens_match("", "abc123"));
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_token();
        let second = generate_token();

        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[tokio::test]
    async fn form_body_is_restored_after_reading_token() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/snippet/create")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=Hello&csrf_token=secret"))
            .unwrap();

        let (token, request) = submitted_token(request).await.unwrap();

        assert_eq!(token.as_deref(), Some("secret"));
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"title=Hello&csrf_token=secret");
    }
}
