//! The text surface: main handler, health, readiness and metrics.

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mimic_core::{Framing, Metrics, RequestContext, TraceContext};
use mimic_engine::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared state of the text surface.
#[derive(Clone)]
pub struct HttpState {
    /// The request engine.
    pub engine: Arc<Engine>,
    /// Flipped once every listener is bound.
    pub ready: Arc<AtomicBool>,
}

/// Builds the text-surface router.
///
/// Any path reaches the main handler; `/health` and `/ready` are carved
/// out. A panic in request-scoped code is caught here and answered with
/// a 500; the process only dies for panics the behavior asked for.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .fallback(handle)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the metrics-port router.
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(export))
        .with_state(metrics)
}

async fn export(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.export()
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<HttpState>) -> StatusCode {
    if state.ready.load(Ordering::Acquire) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn handle(
    State(state): State<HttpState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    let behavior = behavior_from(uri.query(), &headers);
    let trace = TraceContext::extract(
        headers.get("traceparent").and_then(|v| v.to_str().ok()),
        headers.get("tracestate").and_then(|v| v.to_str().ok()),
    );
    let ctx = RequestContext::new(Framing::Text, path.clone(), behavior, trace);

    let metrics = Arc::clone(state.engine.metrics());
    let _guard = metrics.track_request(Framing::Text);
    let started = Instant::now();

    let envelope = state.engine.handle(&ctx).await;

    let status_label = envelope.code.to_string();
    let labels = [
        Framing::Text.as_str(),
        method.as_str(),
        path.as_str(),
        status_label.as_str(),
    ];
    metrics.requests_total.with_label_values(&labels).inc();
    metrics
        .request_duration_seconds
        .with_label_values(&labels)
        .observe(started.elapsed().as_secs_f64());

    let status =
        StatusCode::from_u16(envelope.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

/// Resolves the behavior string: the `behavior` query parameter wins
/// over the `X-Behavior` header, and the last occurrence wins on
/// repeats of either.
fn behavior_from(query: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(query) = query {
        let mut found = None;
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("behavior=") {
                found = Some(value);
            }
        }
        if let Some(value) = found {
            return percent_decode(value);
        }
    }

    headers
        .get_all("x-behavior")
        .iter()
        .last()
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Minimal application/x-www-form-urlencoded value decoding.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                match hex.and_then(|h| u8::from_str_radix(std::str::from_utf8(h).ok()?, 16).ok()) {
                    Some(decoded) => {
                        out.push(decoded);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
