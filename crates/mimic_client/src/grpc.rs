//! Binary-framed downstream calls.
//!
//! The unary glue is written directly against `tonic::client::Grpc`,
//! the same layer the generated clients sit on; the service has a
//! single method, so codegen would be more machinery than code.

use mimic_core::{Envelope, TraceContext, UpstreamRecord};
use mimic_proto::{CallRequest, CALL_PATH};
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

/// Builds a lazily-connecting channel for a `grpc://` record.
///
/// # Errors
///
/// Returns a description when the URL cannot become an endpoint.
pub fn channel_for(record: &UpstreamRecord, connect_timeout: Duration) -> Result<Channel, String> {
    // tonic speaks plain HTTP/2; the grpc:// scheme is ours.
    let url = record.url.replacen("grpc://", "http://", 1);
    let endpoint = Endpoint::from_shared(url.clone())
        .map_err(|e| format!("endpoint {url}: {e}"))?
        .connect_timeout(connect_timeout);
    Ok(endpoint.connect_lazy())
}

/// Issues the unary `Call` and decodes the envelope.
///
/// A status that carries an envelope in its message (how a mimic peer
/// reports behavior-injected failures) is decoded back into the child;
/// anything else is a transport error.
pub async fn call(
    channel: Channel,
    record: &UpstreamRecord,
    trace: &TraceContext,
    propagation: &str,
    deadline: Duration,
) -> Result<Envelope, String> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| format!("rpc {}: channel not ready: {e}", record.id))?;

    let mut request = tonic::Request::new(CallRequest {
        behavior: propagation.to_string(),
    });
    request.set_timeout(deadline);
    if let Ok(value) = MetadataValue::try_from(trace.to_traceparent()) {
        request.metadata_mut().insert("traceparent", value);
    }
    if let Some(state) = &trace.state {
        if let Ok(value) = MetadataValue::try_from(state.as_str()) {
            request.metadata_mut().insert("tracestate", value);
        }
    }

    let codec: ProstCodec<CallRequest, mimic_proto::CallResponse> = ProstCodec::default();
    let path = http::uri::PathAndQuery::from_static(CALL_PATH);

    match grpc.unary(request, path, codec).await {
        Ok(response) => Ok(Envelope::from(response.into_inner())),
        Err(status) => {
            // Behavior-injected failures ride back as the envelope JSON
            // in the status message.
            if let Ok(envelope) = serde_json::from_str::<Envelope>(status.message()) {
                return Ok(envelope);
            }
            Err(format!("rpc {}: {}: {}", record.id, status.code(), status.message()))
        }
    }
}
