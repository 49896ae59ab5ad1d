//! Wire types for the binary framing.
//!
//! These prost messages are maintained by hand against
//! `proto/mimic.proto`; the service surface is one unary method, so the
//! gRPC glue is written directly against tonic's codec layer rather than
//! generated at build time.

use chrono::{DateTime, SecondsFormat, Utc};
use mimic_core::{Envelope, Framing, ServiceIdentity};

/// Fully-qualified gRPC service name.
pub const SERVICE_NAME: &str = "mimic.Runtime";

/// Request path of the unary `Call` method.
pub const CALL_PATH: &str = "/mimic.Runtime/Call";

/// Request message: the behavior string travels in-band.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CallRequest {
    /// Behavior string, propagated verbatim across the call graph.
    #[prost(string, tag = "1")]
    pub behavior: String,
}

/// Identity tuple, mirroring the JSON envelope's `service` object.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Identity {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub namespace: String,
    #[prost(string, tag = "4")]
    pub pod: String,
    #[prost(string, tag = "5")]
    pub node: String,
    /// `text` or `binary`.
    #[prost(string, tag = "6")]
    pub protocol: String,
}

/// Response message: the envelope, recursively.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CallResponse {
    #[prost(message, optional, tag = "1")]
    pub service: Option<Identity>,
    /// RFC3339 with nanoseconds, matching the JSON envelope.
    #[prost(string, tag = "2")]
    pub start_time: String,
    #[prost(string, tag = "3")]
    pub end_time: String,
    #[prost(string, tag = "4")]
    pub duration: String,
    #[prost(uint32, tag = "5")]
    pub code: u32,
    #[prost(string, tag = "6")]
    pub body: String,
    /// Empty when the hop was reached successfully.
    #[prost(string, tag = "7")]
    pub error: String,
    #[prost(string, tag = "8")]
    pub trace_id: String,
    #[prost(string, tag = "9")]
    pub span_id: String,
    #[prost(message, repeated, tag = "10")]
    pub upstream_calls: Vec<CallResponse>,
    #[prost(string, repeated, tag = "11")]
    pub behaviors_applied: Vec<String>,
}

impl From<&Envelope> for CallResponse {
    fn from(envelope: &Envelope) -> Self {
        Self {
            service: Some(Identity {
                name: envelope.service.name.clone(),
                version: envelope.service.version.clone(),
                namespace: envelope.service.namespace.clone(),
                pod: envelope.service.pod.clone(),
                node: envelope.service.node.clone(),
                protocol: envelope.service.framing.as_str().to_string(),
            }),
            start_time: envelope
                .start_time
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            end_time: envelope.end_time.to_rfc3339_opts(SecondsFormat::Nanos, true),
            duration: envelope.duration.clone(),
            code: u32::from(envelope.code),
            body: envelope.body.clone(),
            error: envelope.error.clone().unwrap_or_default(),
            trace_id: envelope.trace_id.clone(),
            span_id: envelope.span_id.clone(),
            upstream_calls: envelope.upstream_calls.iter().map(Self::from).collect(),
            behaviors_applied: envelope.behaviors_applied.clone(),
        }
    }
}

impl From<CallResponse> for Envelope {
    fn from(message: CallResponse) -> Self {
        let service = message.service.unwrap_or_default();
        let framing = match service.protocol.as_str() {
            "binary" => Framing::Binary,
            _ => Framing::Text,
        };
        Self {
            service: ServiceIdentity {
                name: service.name,
                version: service.version,
                namespace: service.namespace,
                pod: service.pod,
                node: service.node,
                framing,
            },
            start_time: parse_timestamp(&message.start_time),
            end_time: parse_timestamp(&message.end_time),
            duration: message.duration,
            code: u16::try_from(message.code).unwrap_or(0),
            body: message.body,
            error: if message.error.is_empty() {
                None
            } else {
                Some(message.error)
            },
            trace_id: message.trace_id,
            span_id: message.span_id,
            upstream_calls: message.upstream_calls.into_iter().map(Self::from).collect(),
            behaviors_applied: message.behaviors_applied,
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
