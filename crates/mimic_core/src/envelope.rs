//! The recursive response envelope.
//!
//! Every hop answers with the same shape: its own identity and timings,
//! the behaviors it applied, and one child envelope per downstream call
//! in the order the calls were issued. Under fail-fast, a failed child is
//! always the last child present.

use crate::identity::ServiceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One node of the response tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the instance that produced this node.
    pub service: ServiceIdentity,
    /// Wall-clock when the request entered this hop.
    #[serde(with = "rfc3339_nanos")]
    pub start_time: DateTime<Utc>,
    /// Wall-clock when this hop finished.
    #[serde(with = "rfc3339_nanos")]
    pub end_time: DateTime<Utc>,
    /// Elapsed time, human-rendered.
    pub duration: String,
    /// Status code; `0` means the hop was never reached.
    pub code: u16,
    /// Response body text: `ok`, or a description of the early exit.
    pub body: String,
    /// Transport-level failure talking to this hop, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 32-hex trace identifier.
    pub trace_id: String,
    /// 16-hex span identifier of this hop.
    pub span_id: String,
    /// Child envelopes, one per downstream call, in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_calls: Vec<Envelope>,
    /// Applied-behavior tags, in application order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors_applied: Vec<String>,
}

impl Envelope {
    /// Starts an envelope for the current hop; timings are provisional
    /// until [`Envelope::finish`].
    #[must_use]
    pub fn begin(service: ServiceIdentity, trace_id: String, span_id: String) -> Self {
        let now = Utc::now();
        Self {
            service,
            start_time: now,
            end_time: now,
            duration: String::new(),
            code: 0,
            body: String::new(),
            error: None,
            trace_id,
            span_id,
            upstream_calls: Vec::new(),
            behaviors_applied: Vec::new(),
        }
    }

    /// Stamps the end time and elapsed duration.
    pub fn finish(&mut self) {
        self.end_time = Utc::now();
        let elapsed = (self.end_time - self.start_time)
            .to_std()
            .unwrap_or_default();
        self.duration = format!("{elapsed:?}");
    }

    /// A placeholder child for a hop that could not be reached: code 0
    /// and the transport error string populated.
    #[must_use]
    pub fn unreachable(target: &str, error: String) -> Self {
        let mut envelope = Self::begin(
            ServiceIdentity {
                name: target.to_string(),
                ..ServiceIdentity::default()
            },
            String::new(),
            String::new(),
        );
        envelope.error = Some(error);
        envelope.finish();
        envelope
    }

    /// True when this node reports a failure a parent must surface:
    /// unreachable, a transport error, or a non-2xx code.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.code == 0 || self.code >= 300 || self.error.is_some()
    }
}

/// RFC3339 with nanosecond precision, the envelope's timestamp format.
mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Framing;

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            name: "web".to_string(),
            version: "1.0.0".to_string(),
            namespace: "default".to_string(),
            pod: "web-0".to_string(),
            node: "node-a".to_string(),
            framing: Framing::Text,
        }
    }

    #[test]
    fn finish_orders_timestamps() {
        let mut envelope = Envelope::begin(identity(), "t".into(), "s".into());
        envelope.finish();
        assert!(envelope.start_time <= envelope.end_time);
        assert!(!envelope.duration.is_empty());
    }

    #[test]
    fn json_shape_matches_contract() {
        let mut envelope = Envelope::begin(
            identity(),
            "0af7651916cd43dd8448eb211c80319c".into(),
            "b7ad6b7169203331".into(),
        );
        envelope.code = 200;
        envelope.body = "ok".to_string();
        envelope.behaviors_applied.push("latency:fixed:100ms".into());
        envelope.finish();

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["service"]["protocol"], "text");
        assert_eq!(json["code"], 200);
        assert_eq!(json["trace_id"], "0af7651916cd43dd8448eb211c80319c");
        assert!(json["start_time"].as_str().unwrap().ends_with('Z'));
        assert!(json.get("error").is_none());
        assert_eq!(json["behaviors_applied"][0], "latency:fixed:100ms");
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let mut parent = Envelope::begin(identity(), "t".into(), "s".into());
        parent.code = 502;
        parent
            .upstream_calls
            .push(Envelope::unreachable("api", "connect refused".into()));
        parent.finish();

        let json = serde_json::to_string(&parent).unwrap();
        let decoded: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, parent);
        assert!(decoded.upstream_calls[0].is_failure());
    }

    #[test]
    fn failure_detection() {
        let mut envelope = Envelope::begin(identity(), "t".into(), "s".into());
        envelope.code = 200;
        assert!(!envelope.is_failure());
        envelope.code = 303;
        assert!(envelope.is_failure());
        envelope.code = 200;
        envelope.error = Some("timeout".into());
        assert!(envelope.is_failure());
    }
}
