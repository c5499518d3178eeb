use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::Once,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use super::headers::apply_security_headers;
use crate::config::AppConfig;

thread_local! {
    // Number of request futures currently being polled on this thread.
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// ServerFailure
///
/// Attached to the extensions of any 500 response built from an `AppError`.
/// The boundary reads it back to log the failure against the request that caused it.
#[derive(Clone, Debug)]
pub struct ServerFailure {
    pub detail: String,
    pub trace: String,
}

/// install_panic_hook
///
/// Installs, once per process, a panic hook that records the backtrace of panics
/// raised while a request is in flight. Panics anywhere else go to the previous hook.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_DEPTH.with(Cell::get) > 0 {
                let trace = Backtrace::force_capture().to_string();
                LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

/// recover_panic
///
/// The outermost middleware. Catches panics from every inner stage and is the one
/// place where server failures are logged. The response is a generic 500 unless
/// debug mode is on, in which case detail and trace go to the body as well.
pub async fn recover_panic(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let outcome = AssertUnwindSafe(Captured::new(next.run(request)))
        .catch_unwind()
        .await;

    match outcome {
        Ok(response) => {
            let Some(failure) = response.extensions().get::<ServerFailure>().cloned() else {
                return response;
            };
            tracing::error!(%method, %uri, trace = %failure.trace, "{}", failure.detail);
            if config.debug {
                with_debug_body(response, &failure)
            } else {
                response
            }
        }
        Err(payload) => {
            let failure = ServerFailure {
                detail: panic_message(payload.as_ref()),
                trace: take_trace().unwrap_or_default(),
            };
            tracing::error!(
                %method,
                %uri,
                trace = %failure.trace,
                "request panicked: {}",
                failure.detail
            );

            let mut response = generic_response();
            if config.debug {
                response = with_debug_body(response, &failure);
            }
            let headers = response.headers_mut();
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            apply_security_headers(headers);
            response
        }
    }
}

/// Builds the 500 response for an explicit failure. Logging is deferred to the boundary.
pub(crate) fn server_failure(detail: String) -> Response {
    let failure = ServerFailure {
        detail,
        trace: Backtrace::force_capture().to_string(),
    };
    let mut response = generic_response();
    response.extensions_mut().insert(failure);
    response
}

fn generic_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn with_debug_body(response: Response, failure: &ServerFailure) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = format!("{}\n{}", failure.detail, failure.trace);
    Response::from_parts(parts, Body::from(body))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

fn take_trace() -> Option<String> {
    LAST_TRACE.with(|slot| slot.borrow_mut().take())
}

/// Marks every poll of the wrapped future as in-flight for the panic hook.
struct Captured<F> {
    inner: Pin<Box<F>>,
}

impl<F> Captured<F> {
    fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for Captured<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _scope = CaptureScope::enter();
        self.inner.as_mut().poll(cx)
    }
}

struct CaptureScope;

impl CaptureScope {
    fn enter() -> Self {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        CaptureScope
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
