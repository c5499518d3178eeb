use axum::{
    Router,
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tower_sessions::SessionStore;
use tracing::Level;

// --- Module Structure ---

// Request pipeline stages.
pub mod auth;
pub mod csrf;
pub mod middleware;
pub mod session;
pub mod session_store;

// Application services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod render;
pub mod repository;
pub mod validator;

// Route table, split by the middleware each group receives.
pub mod routes;
use routes::{dynamic, protected, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use render::{HtmlRenderer, RendererState};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session_store::MemorySessionStore;

/// AppState
///
/// The single, thread-safe, immutable container for the services shared by every
/// request. Per-request state never lives here: it travels in the session and in
/// the request extensions.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for snippets and users, also the identity existence check.
    pub repo: RepositoryState,
    /// Turns a page description into HTML.
    pub renderer: RendererState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These let handlers and middleware pull only the component they need from AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for RendererState {
    fn from_ref(app_state: &AppState) -> RendererState {
        app_state.renderer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// The pipeline composer. Assembles the three route groups, wraps each in its
/// middleware chain, and puts the global chain around the whole tree.
///
/// Request order, outermost first:
///
/// 1. panic boundary → request id → request logger → security headers (every route)
/// 2. session load/save → CSRF guard → identity resolver (dynamic and protected)
/// 3. access gate (protected only, innermost so it sees the resolved identity)
///
/// The session layer wraps the handler, so writes made by the handler are saved
/// with the response.
pub fn create_router<Store>(state: AppState, store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    middleware::install_panic_hook();

    // Session-aware chain shared by the dynamic and protected groups.
    let session_chain = ServiceBuilder::new()
        .layer(session::session_layer(store, &state.config))
        .layer(from_fn(csrf::verify_csrf_token))
        .layer(from_fn_with_state(state.clone(), auth::authenticate));

    let dynamic_routes = dynamic::dynamic_routes().route_layer(session_chain.clone());

    // `route_layer` calls nest outward: the gate is added first so it runs last.
    let protected_routes = protected::protected_routes()
        .route_layer(from_fn(auth::require_authentication))
        .route_layer(session_chain);

    let base_router = Router::new()
        .merge(public::public_routes(&state.config.static_dir))
        .merge(dynamic_routes)
        .merge(protected_routes)
        .with_state(state.clone());

    base_router.layer(
        ServiceBuilder::new()
            // Outermost: must observe failures from every stage below it.
            .layer(from_fn_with_state(state, middleware::recover_panic))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(middleware::trace_span_logger)
                    .on_request(middleware::log_request)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(LatencyUnit::Millis),
                    )
                    // Server failures are logged once, by the panic boundary.
                    .on_failure(()),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(from_fn(middleware::common_headers)),
    )
}
