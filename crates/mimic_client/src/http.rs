//! Text-framed downstream calls.

use mimic_core::{Envelope, ServiceIdentity, TraceContext, UpstreamRecord};
use std::time::Duration;

/// Header carrying the propagation behavior string.
pub const BEHAVIOR_HEADER: &str = "X-Behavior";

/// Builds the full target URL for a record.
pub fn target_url(record: &UpstreamRecord) -> String {
    format!("{}{}", record.url, record.forward_path())
}

/// Issues one GET and decodes the envelope.
///
/// # Errors
///
/// Returns a transport error string when the target cannot be reached;
/// the caller turns that into a code-0 child.
pub async fn call(
    client: &reqwest::Client,
    record: &UpstreamRecord,
    trace: &TraceContext,
    propagation: &str,
    deadline: Duration,
) -> Result<Envelope, String> {
    let url = target_url(record);
    let mut request = client
        .get(&url)
        .timeout(deadline)
        .header("traceparent", trace.to_traceparent());
    if let Some(state) = &trace.state {
        request = request.header("tracestate", state);
    }
    if !propagation.is_empty() {
        request = request.header(BEHAVIOR_HEADER, propagation);
    }

    let response = request
        .send()
        .await
        .map_err(|e| format!("GET {url}: {e}"))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| format!("GET {url}: reading body: {e}"))?;

    // A well-formed envelope carries its own status; an undecodable body
    // still records the wire status verbatim.
    match serde_json::from_slice::<Envelope>(&body) {
        Ok(envelope) => Ok(envelope),
        Err(e) => {
            let mut envelope = Envelope::begin(
                ServiceIdentity {
                    name: record.id.clone(),
                    framing: record.framing,
                    ..ServiceIdentity::default()
                },
                trace.trace_id.clone(),
                String::new(),
            );
            envelope.code = status;
            envelope.error = Some(format!("undecodable response envelope: {e}"));
            envelope.finish();
            Ok(envelope)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_core::Framing;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn record(url: &str) -> UpstreamRecord {
        UpstreamRecord {
            id: "api".to_string(),
            url: url.to_string(),
            framing: Framing::Text,
            matches: Vec::new(),
            path: String::new(),
            group: None,
            probability: 0.0,
        }
    }

    #[test]
    fn target_url_appends_forward_path() {
        assert_eq!(target_url(&record("http://api:8080")), "http://api:8080/");
        let mut with_path = record("http://api:8080");
        with_path.path = "/internal".to_string();
        assert_eq!(target_url(&with_path), "http://api:8080/internal");
    }

    /// Serves one canned HTTP response on a local socket and returns the
    /// base URL plus the request bytes the server saw.
    async fn one_shot_server(body: String) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        (format!("http://127.0.0.1:{}", addr.port()), rx)
    }

    #[tokio::test]
    async fn call_decodes_envelope_and_sends_headers() {
        let mut envelope = Envelope::begin(
            ServiceIdentity {
                name: "api".to_string(),
                ..ServiceIdentity::default()
            },
            "0af7651916cd43dd8448eb211c80319c".to_string(),
            "b7ad6b7169203331".to_string(),
        );
        envelope.code = 200;
        envelope.body = "ok".to_string();
        envelope.finish();
        let json = serde_json::to_string(&envelope).unwrap();

        let (url, seen) = one_shot_server(json).await;
        let client = reqwest::Client::new();
        let trace = TraceContext::generate();

        let child = call(
            &client,
            &record(&url),
            &trace,
            "latency=10ms",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(child.code, 200);
        assert_eq!(child.service.name, "api");

        // Header names go over the wire lowercased.
        let request = seen.await.unwrap().to_lowercase();
        assert!(request.contains("x-behavior: latency=10ms"));
        assert!(request.contains(&format!("traceparent: {}", trace.to_traceparent())));
    }

    #[tokio::test]
    async fn undecodable_body_keeps_wire_status() {
        let (url, _seen) = one_shot_server("not json".to_string()).await;
        let client = reqwest::Client::new();
        let trace = TraceContext::generate();

        let child = call(
            &client,
            &record(&url),
            &trace,
            "",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(child.code, 200);
        assert!(child.error.as_deref().unwrap().contains("undecodable"));
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        let client = reqwest::Client::new();
        let trace = TraceContext::generate();
        // Port 1 is essentially never listening.
        let result = call(
            &client,
            &record("http://127.0.0.1:1"),
            &trace,
            "",
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
