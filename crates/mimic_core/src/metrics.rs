//! Prometheus instruments for the runtime.
//!
//! One registry per process; counters and histograms are lock-free and
//! shared by the servers, the engine and the client callers.

use crate::error::Result;
use crate::identity::Framing;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// All instruments the runtime emits.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    /// `requests_total{framing,method,path,status}`
    pub requests_total: IntCounterVec,
    /// `request_duration_seconds{framing,method,path,status}`
    pub request_duration_seconds: HistogramVec,
    /// `upstream_calls_total{target,status}`
    pub upstream_calls_total: IntCounterVec,
    /// `upstream_duration_seconds{target}`
    pub upstream_duration_seconds: HistogramVec,
    /// `behavior_applied_total{service,type}`
    pub behavior_applied_total: IntCounterVec,
    /// `active_requests{framing}`
    pub active_requests: IntGaugeVec,
}

impl Metrics {
    /// Builds and registers every instrument.
    ///
    /// # Errors
    ///
    /// Fails only on duplicate registration, which would be a
    /// construction bug.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Requests received, by surface"),
            &["framing", "method", "path", "status"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "Request latency"),
            &["framing", "method", "path", "status"],
        )?;
        let upstream_calls_total = IntCounterVec::new(
            Opts::new("upstream_calls_total", "Downstream calls issued"),
            &["target", "status"],
        )?;
        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new("upstream_duration_seconds", "Downstream call latency"),
            &["target"],
        )?;
        let behavior_applied_total = IntCounterVec::new(
            Opts::new("behavior_applied_total", "Behavior perturbations applied"),
            &["service", "type"],
        )?;
        let active_requests = IntGaugeVec::new(
            Opts::new("active_requests", "Requests currently in flight"),
            &["framing"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(upstream_calls_total.clone()))?;
        registry.register(Box::new(upstream_duration_seconds.clone()))?;
        registry.register(Box::new(behavior_applied_total.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            upstream_calls_total,
            upstream_duration_seconds,
            behavior_applied_total,
            active_requests,
        })
    }

    /// Tracks one in-flight request; the gauge drops with the guard.
    #[must_use]
    pub fn track_request(&self, framing: Framing) -> ActiveRequestGuard {
        let gauge = self.active_requests.with_label_values(&[framing.as_str()]);
        gauge.inc();
        ActiveRequestGuard { gauge }
    }

    /// Records one applied-behavior tag; the metric label is the tag's
    /// leading segment (`latency`, `error`, …).
    pub fn record_behavior(&self, service: &str, tag: &str) {
        let kind = tag.split(':').next().unwrap_or(tag);
        self.behavior_applied_total
            .with_label_values(&[service, kind])
            .inc();
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn export(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Decrements `active_requests` on drop.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    gauge: IntGauge,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruments_register_and_export() {
        let metrics = Metrics::new().unwrap();
        metrics
            .requests_total
            .with_label_values(&["text", "GET", "/", "200"])
            .inc();
        metrics.record_behavior("web", "latency:fixed:100ms");

        let text = metrics.export();
        assert!(text.contains("requests_total"));
        assert!(text.contains("behavior_applied_total"));
        assert!(text.contains("type=\"latency\""));
    }

    #[test]
    fn active_request_guard_decrements() {
        let metrics = Metrics::new().unwrap();
        {
            let _guard = metrics.track_request(Framing::Text);
            assert_eq!(
                metrics.active_requests.with_label_values(&["text"]).get(),
                1
            );
        }
        assert_eq!(
            metrics.active_requests.with_label_values(&["text"]).get(),
            0
        );
    }
}
