//! Request handler: pipeline → selection → dispatch → assembly.

use crate::pipeline::{self, PipelineOutcome};
use crate::selector::{select_upstreams, Selection};
use async_trait::async_trait;
use behavior_dsl::parse_chain;
use mimic_core::{Envelope, Metrics, RequestContext, RuntimeConfig, Sampler, UpstreamRecord};
use std::sync::Arc;

/// Status code reported when the caller abandoned the request.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Issues one downstream call and returns the child envelope.
///
/// Implemented over HTTP and gRPC by the client crate; tests substitute
/// scripted fakes.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Calls `record` with the given propagation behavior string.
    ///
    /// Must not fail: transport errors become a child envelope with code
    /// 0 and the error string populated.
    async fn call(
        &self,
        record: &UpstreamRecord,
        ctx: &RequestContext,
        propagation: &str,
    ) -> Envelope;
}

/// The per-instance request engine.
pub struct Engine {
    config: Arc<RuntimeConfig>,
    sampler: Arc<Sampler>,
    metrics: Arc<Metrics>,
    dispatcher: Arc<dyn Dispatch>,
}

impl Engine {
    /// Wires the engine together.
    #[must_use]
    pub fn new(
        config: Arc<RuntimeConfig>,
        sampler: Arc<Sampler>,
        metrics: Arc<Metrics>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            config,
            sampler,
            metrics,
            dispatcher,
        }
    }

    /// The shared runtime configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// The shared metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Runs the instance's default behavior file checks once, before the
    /// instance reports ready. A crash trigger fires here exactly as it
    /// would mid-request.
    pub async fn startup_checks(&self) {
        let behavior = parse_chain(&self.config.default_behavior)
            .chain
            .for_service(&self.config.identity.name);
        if let Some(crash) = &behavior.crash_if_file {
            crate::filecheck::crash_check(crash).await;
        }
        if let Some(check) = &behavior.error_if_file {
            if let Some((code, body)) = crate::filecheck::error_check(check).await {
                tracing::warn!(code, body = %body, "error-if-file already matching at startup");
            }
        }
    }

    /// Processes one decoded request end to end.
    pub async fn handle(&self, ctx: &RequestContext) -> Envelope {
        let service = self.config.identity.name.as_str();

        // Local defaults apply only when the request carries nothing,
        // and are never part of the propagation string.
        let raw = if ctx.behavior.is_empty() {
            self.config.default_behavior.as_str()
        } else {
            ctx.behavior.as_str()
        };
        let parsed = parse_chain(raw);
        for warning in &parsed.warnings {
            tracing::warn!(behavior = raw, %warning, "behavior entry skipped");
        }
        let behavior = parsed.chain.for_service(service);

        let mut envelope = Envelope::begin(
            self.config.identity.with_framing(ctx.framing),
            ctx.trace.trace_id.clone(),
            ctx.trace.span_id.clone(),
        );
        envelope.start_time = ctx.start_time;

        let run = pipeline::run(&behavior, ctx, &self.sampler).await;
        for tag in &run.applied {
            self.metrics.record_behavior(service, tag);
        }
        envelope.behaviors_applied.clone_from(&run.applied);

        match run.outcome {
            PipelineOutcome::EarlyExit { code, body } => {
                envelope.code = code;
                envelope.body = body;
            }
            PipelineOutcome::Cancelled => {
                envelope.code = CLIENT_CLOSED_REQUEST;
                envelope.body = "client closed request".to_string();
            }
            PipelineOutcome::Continue => {
                self.dispatch_upstreams(ctx, &behavior, &mut envelope).await;
            }
        }

        envelope.finish();
        tracing::info!(
            trace_id = %envelope.trace_id,
            span_id = %envelope.span_id,
            framing = %ctx.framing,
            path = %ctx.path,
            code = envelope.code,
            duration = %envelope.duration,
            "request handled"
        );
        envelope
    }

    async fn dispatch_upstreams(
        &self,
        ctx: &RequestContext,
        behavior: &behavior_dsl::Behavior,
        envelope: &mut Envelope,
    ) {
        let selection = select_upstreams(
            &self.config.upstreams,
            &ctx.path,
            ctx.framing,
            behavior,
            &self.sampler,
        );

        let records = match selection {
            Selection::NoMatch => {
                envelope.code = 404;
                envelope.body = format!("no upstream matches {}", ctx.path);
                return;
            }
            Selection::Selected(records) => records,
        };

        // Strictly sequential, fail-fast: the first failing child is the
        // last child present.
        for record in &records {
            let child = self.dispatcher.call(record, ctx, &ctx.behavior).await;
            let failure = child.is_failure().then(|| {
                if child.code == 0 {
                    format!(
                        "upstream {} call failed: {}",
                        record.id,
                        child.error.as_deref().unwrap_or("unknown error")
                    )
                } else {
                    format!("upstream {} returned {}", record.id, child.code)
                }
            });
            envelope.upstream_calls.push(child);
            if let Some(body) = failure {
                envelope.code = 502;
                envelope.body = body;
                return;
            }
        }

        envelope.code = 200;
        envelope.body = "ok".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_core::{Framing, ServiceIdentity, TraceContext};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted dispatcher: answers per-target with a code or an error,
    /// and records the propagation string it saw.
    struct FakeDispatch {
        codes: Vec<(String, u16)>,
        errors: Vec<String>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeDispatch {
        fn healthy() -> Self {
            Self {
                codes: Vec::new(),
                errors: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn with_code(target: &str, code: u16) -> Self {
            Self {
                codes: vec![(target.to_string(), code)],
                ..Self::healthy()
            }
        }

        fn with_error(target: &str) -> Self {
            Self {
                errors: vec![target.to_string()],
                ..Self::healthy()
            }
        }
    }

    #[async_trait]
    impl Dispatch for FakeDispatch {
        async fn call(
            &self,
            record: &UpstreamRecord,
            _ctx: &RequestContext,
            propagation: &str,
        ) -> Envelope {
            self.seen
                .lock()
                .unwrap()
                .push((record.id.clone(), propagation.to_string()));

            if self.errors.iter().any(|t| t == &record.id) {
                return Envelope::unreachable(&record.id, "connect refused".to_string());
            }
            let code = self
                .codes
                .iter()
                .find(|(t, _)| t == &record.id)
                .map_or(200, |(_, c)| *c);
            let mut child = Envelope::begin(
                ServiceIdentity {
                    name: record.id.clone(),
                    framing: record.framing,
                    ..ServiceIdentity::default()
                },
                "trace".to_string(),
                "span".to_string(),
            );
            child.code = code;
            child.body = "ok".to_string();
            child.finish();
            child
        }
    }

    fn config(upstreams: &str) -> Arc<RuntimeConfig> {
        use clap::Parser;
        let args = mimic_core::Args::parse_from(["mimic", "--service-name", "web", "--upstreams", upstreams]);
        Arc::new(RuntimeConfig::from_args(&args).unwrap())
    }

    fn engine(upstreams: &str, dispatcher: Arc<FakeDispatch>) -> Engine {
        Engine::new(
            config(upstreams),
            Arc::new(Sampler::new(Some(42))),
            Arc::new(Metrics::new().unwrap()),
            dispatcher,
        )
    }

    fn request(path: &str, behavior: &str) -> RequestContext {
        RequestContext::new(
            Framing::Text,
            path.to_string(),
            behavior.to_string(),
            TraceContext::generate(),
        )
    }

    #[tokio::test]
    async fn plain_request_calls_upstreams_and_succeeds() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let engine = engine("api=http://api:8080", Arc::clone(&dispatcher));

        let envelope = engine.handle(&request("/", "")).await;

        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.upstream_calls.len(), 1);
        assert_eq!(envelope.upstream_calls[0].service.name, "api");
        assert_eq!(envelope.upstream_calls[0].code, 200);
        assert!(envelope.behaviors_applied.is_empty());
        assert!(envelope.start_time <= envelope.end_time);
    }

    #[tokio::test]
    async fn latency_behavior_delays_and_propagates() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let engine = engine("api=http://api:8080", Arc::clone(&dispatcher));

        let envelope = engine.handle(&request("/", "latency=100ms")).await;

        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.behaviors_applied, vec!["latency:fixed:100ms"]);
        let elapsed = (envelope.end_time - envelope.start_time)
            .to_std()
            .unwrap();
        assert!(elapsed >= Duration::from_millis(100));

        // The raw external string reaches the dispatcher verbatim.
        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen[0].1, "latency=100ms");
    }

    #[tokio::test]
    async fn default_behavior_is_applied_but_not_propagated() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let config = {
            use clap::Parser;
            let args = mimic_core::Args::parse_from([
                "mimic",
                "--service-name",
                "web",
                "--upstreams",
                "api=http://api:8080",
                "--default-behavior",
                "latency=20ms",
            ]);
            Arc::new(RuntimeConfig::from_args(&args).unwrap())
        };
        let engine = Engine::new(
            config,
            Arc::new(Sampler::new(Some(1))),
            Arc::new(Metrics::new().unwrap()),
            Arc::clone(&dispatcher) as Arc<dyn Dispatch>,
        );

        let envelope = engine.handle(&request("/", "")).await;

        assert_eq!(envelope.behaviors_applied, vec!["latency:fixed:20ms"]);
        // Defaults stay local: nothing is forwarded.
        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen[0].1, "");
    }

    #[tokio::test]
    async fn path_routing_404_without_calls() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let engine = engine(
            "orderApi=http://orders:8080:match=/orders|productApi=http://products:8080:match=/products",
            Arc::clone(&dispatcher),
        );

        let envelope = engine.handle(&request("/orders/42", "")).await;
        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.upstream_calls.len(), 1);
        assert_eq!(envelope.upstream_calls[0].service.name, "orderApi");

        let envelope = engine.handle(&request("/unknown", "")).await;
        assert_eq!(envelope.code, 404);
        assert!(envelope.upstream_calls.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_fails_fast() {
        let dispatcher = Arc::new(FakeDispatch::with_code("a", 503));
        let engine = engine(
            "a=http://a:8080|b=http://b:8080",
            Arc::clone(&dispatcher),
        );

        let envelope = engine.handle(&request("/", "")).await;

        assert_eq!(envelope.code, 502);
        assert_eq!(envelope.body, "upstream a returned 503");
        // Fail-fast: b was never called.
        assert_eq!(envelope.upstream_calls.len(), 1);
        assert_eq!(dispatcher.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_502_with_code_zero_child() {
        let dispatcher = Arc::new(FakeDispatch::with_error("api"));
        let engine = engine("api=http://api:8080", Arc::clone(&dispatcher));

        let envelope = engine.handle(&request("/", "")).await;

        assert_eq!(envelope.code, 502);
        assert!(envelope.body.contains("call failed"));
        assert_eq!(envelope.upstream_calls[0].code, 0);
        assert!(envelope.upstream_calls[0].error.is_some());
    }

    #[tokio::test]
    async fn injected_error_skips_dispatch() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let engine = engine("api=http://api:8080", Arc::clone(&dispatcher));

        let envelope = engine.handle(&request("/", "error=503:1.0")).await;

        assert_eq!(envelope.code, 503);
        assert_eq!(envelope.body, "Injected error: 503");
        assert!(envelope.upstream_calls.is_empty());
        assert!(dispatcher.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn named_behavior_targets_only_that_service() {
        let dispatcher = Arc::new(FakeDispatch::healthy());
        let engine = engine("api=http://api:8080", Arc::clone(&dispatcher));

        // web applies only the global latency; the error targets order-api.
        let envelope = engine
            .handle(&request("/", "latency=10ms,order-api:error=503:1.0"))
            .await;

        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.behaviors_applied, vec!["latency:fixed:10ms"]);
        // The full chain still propagates for downstream hops to pick up.
        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen[0].1, "latency=10ms,order-api:error=503:1.0");
    }
}
