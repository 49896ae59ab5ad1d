//! Upstream peer records and the `UPSTREAMS` configuration grammar.
//!
//! ```text
//! records := record ( '|' record )*
//! record  := id '=' url ( ':' param )*
//! param   := 'match' '=' path (',' path)*
//!          | 'path'  '=' fwdpath
//!          | 'group' '=' name
//!          | 'prob'  '=' float
//! url     := ('http'|'grpc') '://' host ':' port
//! ```
//!
//! A legacy comma-separated `id:url` form is accepted when the string
//! contains no `=` at all.

use crate::error::{Error, Result};
use crate::identity::Framing;
use serde::{Deserialize, Serialize};

/// A configured downstream peer plus its routing annotations.
///
/// Constructed once at process start, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRecord {
    /// Unique identifier; the behavior-target key for weights.
    pub id: String,
    /// Target base URL, `scheme://host:port`.
    pub url: String,
    /// Framing derived from the URL scheme.
    pub framing: Framing,
    /// Inbound path prefixes that activate this record; empty = catch-all.
    pub matches: Vec<String>,
    /// Forward path on the target; empty means `/`.
    pub path: String,
    /// Weighted-group name, if this record competes in a group.
    pub group: Option<String>,
    /// Independent call probability; `0` disables the gate.
    pub probability: f64,
}

impl UpstreamRecord {
    /// True when the record is eligible for every inbound path.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.matches.is_empty()
    }

    /// The path appended to the base URL for text-framed calls.
    #[must_use]
    pub fn forward_path(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }

    /// True when any configured prefix matches the inbound path.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        self.matches.iter().any(|p| path_has_prefix(path, p))
    }
}

/// Prefix match on path-segment boundaries: `/orders` matches `/orders`,
/// `/orders/` and `/orders/1`, but not `/order` or `/orders1`.
#[must_use]
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    path.len() == prefix.len()
        || prefix.ends_with('/')
        || path.as_bytes()[prefix.len()] == b'/'
}

/// Parses the `UPSTREAMS` value into records, preserving order.
///
/// # Errors
///
/// Any malformed record is a fatal configuration error; an instance with
/// a bad upstream table must not start.
pub fn parse_upstreams(spec: &str) -> Result<Vec<UpstreamRecord>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    if !spec.contains('=') {
        return spec.split(',').map(parse_legacy_record).collect();
    }
    spec.split('|').map(parse_record).collect()
}

fn parse_record(record: &str) -> Result<UpstreamRecord> {
    let record = record.trim();
    let (id, rest) = record.split_once('=').ok_or_else(|| Error::InvalidUpstream {
        record: record.to_string(),
        reason: "expected id=url".to_string(),
    })?;
    let id = valid_id(record, id)?;

    // The URL is the leading ':'-joined run of segments without '='; the
    // params that follow each carry one.
    let mut url_segments: Vec<&str> = Vec::new();
    let mut params: Vec<&str> = Vec::new();
    for segment in rest.split(':') {
        if params.is_empty() && !segment.contains('=') {
            url_segments.push(segment);
        } else {
            params.push(segment);
        }
    }
    let url = url_segments.join(":");
    let (url, framing) = valid_url(record, &url)?;

    let mut matches = Vec::new();
    let mut path = String::new();
    let mut group = None;
    let mut probability = 0.0;

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            return Err(Error::InvalidUpstream {
                record: record.to_string(),
                reason: format!("expected key=value parameter, got '{param}'"),
            });
        };
        match key {
            "match" => {
                matches = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            "path" => path = value.to_string(),
            "group" => group = Some(value.to_string()),
            "prob" => {
                probability = value.parse().map_err(|_| Error::InvalidUpstream {
                    record: record.to_string(),
                    reason: format!("invalid probability '{value}'"),
                })?;
                if !(0.0..=1.0).contains(&probability) {
                    return Err(Error::InvalidUpstream {
                        record: record.to_string(),
                        reason: format!("probability {probability} outside [0, 1]"),
                    });
                }
            }
            other => {
                return Err(Error::InvalidUpstream {
                    record: record.to_string(),
                    reason: format!("unknown parameter '{other}'"),
                })
            }
        }
    }

    Ok(UpstreamRecord {
        id,
        url,
        framing,
        matches,
        path,
        group,
        probability,
    })
}

/// Legacy `id:url` form.
fn parse_legacy_record(record: &str) -> Result<UpstreamRecord> {
    let record = record.trim();
    let (id, url) = record.split_once(':').ok_or_else(|| Error::InvalidUpstream {
        record: record.to_string(),
        reason: "expected id:url".to_string(),
    })?;
    let id = valid_id(record, id)?;
    let (url, framing) = valid_url(record, url)?;
    Ok(UpstreamRecord {
        id,
        url,
        framing,
        matches: Vec::new(),
        path: String::new(),
        group: None,
        probability: 0.0,
    })
}

fn valid_id(record: &str, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        return Err(Error::InvalidUpstream {
            record: record.to_string(),
            reason: format!("invalid id '{id}'"),
        });
    }
    Ok(id.to_string())
}

fn valid_url(record: &str, url: &str) -> Result<(String, Framing)> {
    let (scheme, host_port) = url.split_once("://").ok_or_else(|| Error::InvalidUpstream {
        record: record.to_string(),
        reason: format!("url '{url}' missing scheme"),
    })?;
    let framing = Framing::from_scheme(scheme).ok_or_else(|| Error::InvalidUpstream {
        record: record.to_string(),
        reason: format!("unsupported scheme '{scheme}' (expected http or grpc)"),
    })?;
    let (host, port) = host_port
        .split_once(':')
        .ok_or_else(|| Error::InvalidUpstream {
            record: record.to_string(),
            reason: format!("url '{url}' missing port"),
        })?;
    if host.is_empty() {
        return Err(Error::InvalidUpstream {
            record: record.to_string(),
            reason: format!("url '{url}' has an empty host"),
        });
    }
    let _: u16 = port.parse().map_err(|_| Error::InvalidUpstream {
        record: record.to_string(),
        reason: format!("invalid port '{port}'"),
    })?;
    Ok((url.to_string(), framing))
}
