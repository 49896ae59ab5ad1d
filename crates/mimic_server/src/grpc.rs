//! The binary surface: a hand-written server for `mimic.Runtime`.
//!
//! The service has one unary method, so this sits directly on tonic's
//! codec layer in the same shape `tonic-build` would generate. Envelope
//! codes of 400 and above are mapped to gRPC statuses per the fixed
//! table, with the envelope JSON riding in the status message so the
//! calling hop can rebuild the child node.

use futures::FutureExt;
use mimic_core::{Framing, RequestContext, TraceContext};
use mimic_engine::Engine;
use mimic_proto::{CallRequest, CallResponse, CALL_PATH, SERVICE_NAME};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::codegen::*;
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::{Code, Status};

/// The `mimic.Runtime` gRPC service.
#[derive(Clone)]
pub struct RuntimeServer {
    engine: Arc<Engine>,
}

impl RuntimeServer {
    /// Wraps the engine for the binary surface.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

struct CallSvc {
    engine: Arc<Engine>,
}

impl UnaryService<CallRequest> for CallSvc {
    type Response = CallResponse;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<CallRequest>) -> Self::Future {
        let engine = Arc::clone(&self.engine);
        Box::pin(async move { handle_call(engine, request).await })
    }
}

async fn handle_call(
    engine: Arc<Engine>,
    request: tonic::Request<CallRequest>,
) -> Result<tonic::Response<CallResponse>, Status> {
    let metadata = request.metadata();
    let trace = TraceContext::extract(
        metadata.get("traceparent").and_then(|v| v.to_str().ok()),
        metadata.get("tracestate").and_then(|v| v.to_str().ok()),
    );
    let deadline = metadata
        .get("grpc-timeout")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout);

    let mut ctx = RequestContext::new(
        Framing::Binary,
        "/".to_string(),
        request.get_ref().behavior.clone(),
        trace,
    );
    if let Some(timeout) = deadline {
        ctx = ctx.with_deadline(Instant::now() + timeout);
    }

    let metrics = Arc::clone(engine.metrics());
    let _guard = metrics.track_request(Framing::Binary);
    let started = Instant::now();

    // Bug panics stop at this boundary; intentional aborts never unwind.
    let handled = std::panic::AssertUnwindSafe(engine.handle(&ctx))
        .catch_unwind()
        .await;
    let envelope = match handled {
        Ok(envelope) => envelope,
        Err(_) => {
            tracing::error!("request handler panicked");
            return Err(Status::internal("request handler panicked"));
        }
    };

    let status_label = envelope.code.to_string();
    let labels = [
        Framing::Binary.as_str(),
        "Call",
        "/",
        status_label.as_str(),
    ];
    metrics.requests_total.with_label_values(&labels).inc();
    metrics
        .request_duration_seconds
        .with_label_values(&labels)
        .observe(started.elapsed().as_secs_f64());

    if envelope.code >= 400 {
        let message =
            serde_json::to_string(&envelope).unwrap_or_else(|_| envelope.body.clone());
        return Err(Status::new(map_code(envelope.code), message));
    }
    Ok(tonic::Response::new(CallResponse::from(&envelope)))
}

/// HTTP status → gRPC code, per the fixed table.
fn map_code(code: u16) -> Code {
    match code {
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        429 => Code::ResourceExhausted,
        499 => Code::Cancelled,
        501 => Code::Unimplemented,
        503 => Code::Unavailable,
        504 => Code::DeadlineExceeded,
        _ => Code::Internal,
    }
}

/// Parses the wire `grpc-timeout` value: digits plus a unit letter.
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let (digits, unit) = value.split_at(value.len().checked_sub(1)?);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

impl<B> Service<http::Request<B>> for RuntimeServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            CALL_PATH => {
                let engine = Arc::clone(&self.engine);
                Box::pin(async move {
                    let mut grpc = Grpc::new(tonic::codec::ProstCodec::default());
                    Ok(grpc.unary(CallSvc { engine }, req).await)
                })
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", Code::Unimplemented as i32)
                    .header(
                        http::header::CONTENT_TYPE,
                        tonic::metadata::GRPC_CONTENT_TYPE,
                    )
                    .body(empty_body())
                    .unwrap())
            }),
        }
    }
}

impl NamedService for RuntimeServer {
    const NAME: &'static str = SERVICE_NAME;
}
