//! W3C trace context: parse, mint and propagate.
//!
//! Trace identifiers are 16 bytes and span identifiers 8 bytes, carried
//! lowercase-hex in the `traceparent` header (`00-<trace>-<span>-<flags>`).
//! `tracestate` is opaque and passed through untouched.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Extracted or minted trace identifiers for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters; the span of the current hop.
    pub span_id: String,
    /// Opaque `tracestate` header value, if one arrived.
    pub state: Option<String>,
}

impl TraceContext {
    /// Mints a fresh context with random identifiers.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace = [0u8; 16];
        let mut span = [0u8; 8];
        rng.fill_bytes(&mut trace);
        rng.fill_bytes(&mut span);
        Self {
            trace_id: hex::encode(trace),
            span_id: hex::encode(span),
            state: None,
        }
    }

    /// Parses a `traceparent` header, keeping the caller's trace id and
    /// minting a new span id for this hop. Returns `None` on malformed
    /// input so the caller can fall back to [`TraceContext::generate`].
    #[must_use]
    pub fn from_traceparent(header: &str, state: Option<&str>) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_span = parts.next()?;
        let _flags = parts.next()?;

        if version.len() != 2
            || trace_id.len() != 32
            || parent_span.len() != 16
            || !is_lower_hex(trace_id)
            || !is_lower_hex(parent_span)
            || trace_id.bytes().all(|b| b == b'0')
        {
            return None;
        }

        let mut ctx = Self::generate();
        ctx.trace_id = trace_id.to_string();
        ctx.state = state.map(ToString::to_string);
        Some(ctx)
    }

    /// Extracts a context from optional header values, minting one when
    /// absent or malformed.
    #[must_use]
    pub fn extract(traceparent: Option<&str>, tracestate: Option<&str>) -> Self {
        traceparent
            .and_then(|h| Self::from_traceparent(h, tracestate))
            .unwrap_or_else(Self::generate)
    }

    /// Derives a child context for an outgoing call: same trace, fresh
    /// span id.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut rng = rand::thread_rng();
        let mut span = [0u8; 8];
        rng.fill_bytes(&mut span);
        Self {
            trace_id: self.trace_id.clone(),
            span_id: hex::encode(span),
            state: self.state.clone(),
        }
    }

    /// Renders the `traceparent` header for this context.
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
