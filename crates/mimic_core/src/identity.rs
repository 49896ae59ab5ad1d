//! Service identity and wire framing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The wire encoding of a request: text-line HTTP/JSON or binary HTTP/2 RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// HTTP/1.1 with a JSON envelope body.
    #[default]
    Text,
    /// gRPC over HTTP/2.
    Binary,
}

impl Framing {
    /// Derives the framing from an upstream URL scheme.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Text),
            "grpc" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Stable label used in metrics and the envelope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity tuple an instance stamps on every response it assembles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Logical service name; the behavior-target key.
    pub name: String,
    /// Service version label.
    pub version: String,
    /// Kubernetes namespace, or `default`.
    pub namespace: String,
    /// Pod name, when running under an orchestrator.
    #[serde(default)]
    pub pod: String,
    /// Node name, when running under an orchestrator.
    #[serde(default)]
    pub node: String,
    /// Framing of the request this response answers.
    #[serde(rename = "protocol")]
    pub framing: Framing,
}

impl ServiceIdentity {
    /// Returns a copy of this identity tagged with `framing`.
    #[must_use]
    pub fn with_framing(&self, framing: Framing) -> Self {
        Self {
            framing,
            ..self.clone()
        }
    }
}
