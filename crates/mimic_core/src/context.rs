//! Per-request ephemeral context.

use crate::identity::Framing;
use crate::trace::TraceContext;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything a request carries through the pipeline.
///
/// Constructed once at ingress by whichever server decoded the frame and
/// passed by reference from there on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Wall-clock at arrival; becomes the envelope's `start_time`.
    pub start_time: DateTime<Utc>,
    /// Monotonic arrival instant for deadline math.
    pub started_at: Instant,
    /// Cancelled when the caller goes away or the server drains.
    pub cancel: CancellationToken,
    /// Absolute deadline from the inbound framing, if one was supplied.
    pub deadline: Option<Instant>,
    /// Trace identifiers for this hop.
    pub trace: TraceContext,
    /// Framing of the arriving request.
    pub framing: Framing,
    /// Raw behavior string exactly as received; empty when the request
    /// carried none. This, and only this, is what gets propagated.
    pub behavior: String,
    /// Inbound request path (`/` for binary framing).
    pub path: String,
}

impl RequestContext {
    /// Builds a context at ingress time.
    #[must_use]
    pub fn new(framing: Framing, path: String, behavior: String, trace: TraceContext) -> Self {
        Self {
            start_time: Utc::now(),
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
            deadline: None,
            trace,
            framing,
            behavior,
            path,
        }
    }

    /// Attaches an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Time left until the inbound deadline, if one exists.
    #[must_use]
    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
