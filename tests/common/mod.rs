#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, header},
    response::Response,
};
use snippetbox::{
    AppConfig, AppError, AppResult, AppState, HtmlRenderer, MemorySessionStore, create_router,
    models::{Snippet, User, UserId},
    repository::{MemoryRepository, Repository, RepositoryState},
};
use tower::ServiceExt;

pub const NAME: &str = "Alice";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "pa55word!";

// --- App Builders ---

pub fn router_with(repo: RepositoryState, config: AppConfig) -> Router {
    router_with_store(repo, config, MemorySessionStore::new())
}

pub fn router_with_store(
    repo: RepositoryState,
    config: AppConfig,
    store: MemorySessionStore,
) -> Router {
    let state = AppState {
        repo,
        renderer: Arc::new(HtmlRenderer),
        config,
    };
    create_router(state, store)
}

/// A router over a fresh in-memory repository, plus a handle on that repository.
pub fn memory_app() -> (Router, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let router = router_with(repo.clone(), AppConfig::default());
    (router, repo)
}

// --- Test Client ---

/// Drives the router with `oneshot`, carrying the session cookie between requests
/// the way a browser would.
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            cookie: None,
        }
    }

    pub fn cookie(&self) -> Option<String> {
        self.cookie.clone()
    }

    pub fn set_cookie(&mut self, cookie: Option<String>) {
        self.cookie = cookie;
    }

    pub async fn get(&mut self, uri: &str) -> Response {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let body = serde_urlencoded::to_string(fields).unwrap();
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&mut self, mut request: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }
        let response = self.router.clone().oneshot(request).await.unwrap();
        if let Some(cookie) = session_cookie(response.headers()) {
            self.cookie = Some(cookie);
        }
        response
    }

    /// Loads a session-aware page and returns the CSRF token embedded in it.
    pub async fn csrf_token(&mut self, uri: &str) -> String {
        let response = self.get(uri).await;
        extract_csrf(&body_string(response).await)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Response {
        let token = self.csrf_token("/user/login").await;
        self.post_form(
            "/user/login",
            &[("email", email), ("password", password), ("csrf_token", &token)],
        )
        .await
    }
}

/// Creates the default account directly in the repository and signs the client in.
pub async fn signed_in(router: Router, repo: &MemoryRepository) -> TestClient {
    repo.insert_user(NAME, EMAIL, PASSWORD).await.unwrap();
    let mut client = TestClient::new(router);
    let response = client.login(EMAIL, PASSWORD).await;
    assert_eq!(location(&response), "/");
    client
}

// --- Response Helpers ---

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter(|pair| pair.starts_with("id="))
        .last()
        .map(str::to_owned)
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

pub fn extract_csrf(html: &str) -> String {
    let marker = "name=\"csrf_token\" value=\"";
    let start = html.find(marker).expect("page carries a CSRF field") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

// --- Stub Repository ---

/// Wraps the in-memory repository and can be told to fail, or panic in, the
/// identity existence check.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    pub fail_user_exists: AtomicBool,
    pub panic_user_exists: AtomicBool,
}

impl FlakyRepository {
    pub fn break_user_lookup(&self) {
        self.fail_user_exists.store(true, Ordering::SeqCst);
    }

    pub fn crash_user_lookup(&self, crash: bool) {
        self.panic_user_exists.store(crash, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: i32) -> AppResult<i64> {
        self.inner.insert_snippet(title, content, expires_days).await
    }

    async fn get_snippet(&self, id: i64) -> AppResult<Option<Snippet>> {
        self.inner.get_snippet(id).await
    }

    async fn latest_snippets(&self) -> AppResult<Vec<Snippet>> {
        self.inner.latest_snippets().await
    }

    async fn insert_user(&self, name: &str, email: &str, password: &str) -> AppResult<()> {
        self.inner.insert_user(name, email, password).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<UserId>> {
        self.inner.authenticate(email, password).await
    }

    async fn user_exists(&self, id: UserId) -> AppResult<bool> {
        if self.panic_user_exists.load(Ordering::SeqCst) {
            panic!("user lookup crashed");
        }
        if self.fail_user_exists.load(Ordering::SeqCst) {
            return Err(AppError::Internal("user lookup unavailable".to_string()));
        }
        self.inner.user_exists(id).await
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        self.inner.get_user(id).await
    }
}
