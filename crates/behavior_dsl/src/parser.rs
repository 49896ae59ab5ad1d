//! Behavior DSL parser.
//!
//! Grammar (informal):
//!
//! ```text
//! chain      := entry (',' entry)*
//! entry      := [serviceName ':'] key '=' value
//! serviceName:= [A-Za-z][A-Za-z0-9-]*
//! value      := token (':' token)*
//! ```
//!
//! Values use `;` as their intra-token separator so the outer `,` stays
//! unambiguous, e.g. `crash-if-file=/etc/app.conf:bad;worse`.
//!
//! Parsing never fails a request: malformed entries and unknown keys are
//! skipped and reported as warnings alongside the partial parse.

use crate::chain::BehaviorChain;
use crate::error::{Error, Result};
use crate::model::{
    Behavior, ByteSize, CpuSpike, CrashFile, DiskFill, ErrorFile, ErrorInjection, Latency,
    MemoryLoad, DEFAULT_CPU_DURATION, DEFAULT_CPU_INTENSITY, DEFAULT_ERROR_CODE,
    DEFAULT_FILE_ERROR_CODE, DEFAULT_LEAK_DURATION, DEFAULT_SPIKE_DURATION,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of parsing a behavior string: the partial parse plus warnings
/// for every entry that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct ChainParse {
    /// Successfully parsed entries, in input order.
    pub chain: BehaviorChain,
    /// One message per skipped entry.
    pub warnings: Vec<String>,
}

/// Parses a behavior string into a [`BehaviorChain`].
///
/// Entries without a leading `name:` inherit the most recent preceding
/// name, or are global if none has appeared yet.
///
/// # Example
///
/// ```rust
/// let parsed = behavior_dsl::parse_chain("latency=10ms,order-api:error=503:1.0");
/// assert!(parsed.warnings.is_empty());
/// assert_eq!(parsed.chain.entries.len(), 2);
/// ```
#[must_use]
pub fn parse_chain(input: &str) -> ChainParse {
    let mut parse = ChainParse::default();
    let mut current: Option<String> = None;

    for raw in input.split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let Some((lhs, value)) = entry.split_once('=') else {
            parse
                .warnings
                .push(format!("skipping '{entry}': expected key=value"));
            continue;
        };

        let key = match lhs.split_once(':') {
            Some((service, key)) => {
                if is_service_name(service) {
                    current = Some(service.to_string());
                } else {
                    parse
                        .warnings
                        .push(format!("skipping '{entry}': invalid service name '{service}'"));
                    continue;
                }
                key.trim()
            }
            None => lhs.trim(),
        };

        match parse_entry(key, value.trim()) {
            Ok(fragment) => parse.chain.push(current.clone(), fragment),
            Err(e) => parse.warnings.push(format!("skipping '{entry}': {e}")),
        }
    }

    parse
}

/// `[A-Za-z][A-Za-z0-9-]*`
fn is_service_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Parses one `key=value` entry into a single-key behavior fragment.
fn parse_entry(key: &str, value: &str) -> Result<Behavior> {
    let mut behavior = Behavior::default();
    match key {
        "latency" => behavior.latency = Some(parse_latency(value)?),
        "error" => behavior.error = Some(parse_error(value)?),
        "panic" => behavior.panic = Some(parse_probability(value)?),
        "cpu" => behavior.cpu = Some(parse_cpu(value)?),
        "memory" => behavior.memory = Some(parse_memory(value)?),
        "disk" => behavior.disk = Some(parse_disk(value)?),
        "crash-if-file" => behavior.crash_if_file = Some(parse_crash_if_file(value)?),
        "error-if-file" => behavior.error_if_file = Some(parse_error_if_file(value)?),
        "upstreamWeights" => behavior.upstream_weights = Some(parse_weights(value)?),
        other => {
            return Err(Error::InvalidValue {
                key: other.to_string(),
                reason: "unknown key".to_string(),
            })
        }
    }
    Ok(behavior)
}

/// `latency=<dur>` or `latency=<min>-<max>`; a bare-number minimum
/// inherits the maximum's unit.
fn parse_latency(value: &str) -> Result<Latency> {
    let Some((min_str, max_str)) = value.split_once('-') else {
        return Ok(Latency::Fixed(parse_duration(value)?));
    };

    let (max_value, max_unit) = split_duration(max_str)?;
    let max = duration_from(max_value, max_unit)?;
    let min = match parse_duration(min_str) {
        Ok(d) => d,
        // No unit suffix: inherit the maximum's.
        Err(_) => {
            let value: u64 = min_str
                .trim()
                .parse()
                .map_err(|_| Error::InvalidDuration(min_str.to_string()))?;
            duration_from(value, max_unit)?
        }
    };

    if min > max {
        return Err(Error::InvalidValue {
            key: "latency".to_string(),
            reason: format!("range minimum {min_str} exceeds maximum {max_str}"),
        });
    }
    Ok(Latency::Range { min, max })
}

/// `error=<p>` | `error=<code>` | `error=<code>:<p>`.
fn parse_error(value: &str) -> Result<ErrorInjection> {
    match value.split_once(':') {
        Some((code, p)) => Ok(ErrorInjection {
            code: parse_status_code(code)?,
            probability: parse_probability(p)?,
        }),
        None => {
            // A bare token is a status code when it looks like one,
            // otherwise a probability with the default code.
            if let Ok(code) = parse_status_code(value) {
                Ok(ErrorInjection {
                    code,
                    probability: 1.0,
                })
            } else {
                Ok(ErrorInjection {
                    code: DEFAULT_ERROR_CODE,
                    probability: parse_probability(value)?,
                })
            }
        }
    }
}

/// `cpu=spike[:<dur>[:<intensity%>]]`.
fn parse_cpu(value: &str) -> Result<CpuSpike> {
    let mut tokens = value.split(':');
    match tokens.next() {
        Some("spike") => {}
        _ => {
            return Err(Error::InvalidValue {
                key: "cpu".to_string(),
                reason: format!("expected 'spike[:dur[:intensity]]', got '{value}'"),
            })
        }
    }

    let duration = match tokens.next() {
        Some(d) => parse_duration(d)?,
        None => DEFAULT_CPU_DURATION,
    };
    let intensity = match tokens.next() {
        Some(i) => {
            let i: u8 = i.trim_end_matches('%').parse().map_err(|_| Error::InvalidValue {
                key: "cpu".to_string(),
                reason: format!("invalid intensity '{i}'"),
            })?;
            if i == 0 || i > 100 {
                return Err(Error::InvalidValue {
                    key: "cpu".to_string(),
                    reason: format!("intensity {i} outside 1..=100"),
                });
            }
            i
        }
        None => DEFAULT_CPU_INTENSITY,
    };
    Ok(CpuSpike {
        duration,
        intensity,
    })
}

/// `memory=leak-slow|leak-fast[:<dur>]` or `memory=spike:<size>[:<dur>]`.
fn parse_memory(value: &str) -> Result<MemoryLoad> {
    let mut tokens = value.split(':');
    match tokens.next() {
        Some("leak-slow") => {
            let duration = match tokens.next() {
                Some(d) => parse_duration(d)?,
                None => DEFAULT_LEAK_DURATION,
            };
            Ok(MemoryLoad::LeakSlow { duration })
        }
        Some("leak-fast") => {
            let duration = match tokens.next() {
                Some(d) => parse_duration(d)?,
                None => DEFAULT_LEAK_DURATION,
            };
            Ok(MemoryLoad::LeakFast { duration })
        }
        Some("spike") => {
            let size = match tokens.next() {
                Some(s) => parse_size(s)?,
                None => {
                    return Err(Error::InvalidValue {
                        key: "memory".to_string(),
                        reason: "spike requires a size".to_string(),
                    })
                }
            };
            let duration = match tokens.next() {
                Some(d) => parse_duration(d)?,
                None => DEFAULT_SPIKE_DURATION,
            };
            Ok(MemoryLoad::Spike { size, duration })
        }
        _ => Err(Error::InvalidValue {
            key: "memory".to_string(),
            reason: format!("expected leak-slow, leak-fast or spike, got '{value}'"),
        }),
    }
}

/// `disk=fill:<size>:<path>:<dur>`.
fn parse_disk(value: &str) -> Result<DiskFill> {
    let tokens: Vec<&str> = value.split(':').collect();
    let ["fill", size, path, duration] = tokens.as_slice() else {
        return Err(Error::InvalidValue {
            key: "disk".to_string(),
            reason: format!("expected 'fill:<size>:<path>:<dur>', got '{value}'"),
        });
    };
    let ByteSize::Bytes(size) = parse_size(size)? else {
        return Err(Error::InvalidValue {
            key: "disk".to_string(),
            reason: "disk fill size must be absolute bytes".to_string(),
        });
    };
    Ok(DiskFill {
        size,
        path: (*path).to_string(),
        duration: parse_duration(duration)?,
    })
}

/// `crash-if-file=<path>:<needle>[;<needle>]*`.
fn parse_crash_if_file(value: &str) -> Result<CrashFile> {
    let (path, needles) = split_file_trigger("crash-if-file", value)?;
    Ok(CrashFile { path, needles })
}

/// `error-if-file=<path>:<needle>[;<needle>]*[:<code>]`.
fn parse_error_if_file(value: &str) -> Result<ErrorFile> {
    let (rest, code) = match value.rsplit_once(':') {
        Some((rest, last)) if last.chars().all(|c| c.is_ascii_digit()) => {
            (rest, parse_status_code(last)?)
        }
        _ => (value, DEFAULT_FILE_ERROR_CODE),
    };
    let (path, needles) = split_file_trigger("error-if-file", rest)?;
    Ok(ErrorFile {
        path,
        needles,
        code,
    })
}

fn split_file_trigger(key: &str, value: &str) -> Result<(String, Vec<String>)> {
    let Some((path, needles)) = value.split_once(':') else {
        return Err(Error::InvalidValue {
            key: key.to_string(),
            reason: format!("expected '<path>:<needle>[;<needle>]*', got '{value}'"),
        });
    };
    let needles: Vec<String> = needles
        .split(';')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToString::to_string)
        .collect();
    if needles.is_empty() {
        return Err(Error::InvalidValue {
            key: key.to_string(),
            reason: "at least one needle is required".to_string(),
        });
    }
    Ok((path.to_string(), needles))
}

/// `upstreamWeights=<id>:<w>[;<id>:<w>]*`.
fn parse_weights(value: &str) -> Result<BTreeMap<String, u32>> {
    let mut weights = BTreeMap::new();
    for pair in value.split(';') {
        let Some((id, w)) = pair.split_once(':') else {
            return Err(Error::InvalidValue {
                key: "upstreamWeights".to_string(),
                reason: format!("expected '<id>:<weight>', got '{pair}'"),
            });
        };
        let w: u32 = w.trim().parse().map_err(|_| Error::InvalidValue {
            key: "upstreamWeights".to_string(),
            reason: format!("invalid weight '{w}'"),
        })?;
        weights.insert(id.trim().to_string(), w);
    }
    Ok(weights)
}

fn parse_status_code(s: &str) -> Result<u16> {
    let code: u16 = s
        .trim()
        .parse()
        .map_err(|_| Error::InvalidValue {
            key: "error".to_string(),
            reason: format!("invalid status code '{s}'"),
        })?;
    if (100..=599).contains(&code) {
        Ok(code)
    } else {
        Err(Error::InvalidValue {
            key: "error".to_string(),
            reason: format!("status code {code} outside 100..=599"),
        })
    }
}

fn parse_probability(s: &str) -> Result<f64> {
    let p: f64 = s
        .trim()
        .parse()
        .map_err(|_| Error::InvalidProbability(s.to_string()))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(Error::InvalidProbability(s.to_string()))
    }
}

/// Parses a duration literal: `<number><ns|us|ms|s|m|h>`.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] when the literal has no digits, no
/// recognized unit, or does not fit a `u64`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let (value, unit) = split_duration(s)?;
    duration_from(value, unit)
}

fn split_duration(s: &str) -> Result<(u64, &str)> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::InvalidDuration(s.to_string()))?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidDuration(s.to_string()))?;
    Ok((value, unit))
}

fn duration_from(value: u64, unit: &str) -> Result<Duration> {
    match unit {
        "ns" => Ok(Duration::from_nanos(value)),
        "us" | "µs" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(Error::InvalidDuration(format!("{value}{other}"))),
    }
}

/// Renders a duration canonically: seconds when whole, else the smallest
/// unit that keeps the value integral.
#[must_use]
pub fn fmt_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0ms".to_string();
    }
    if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{nanos}ns")
    }
}

/// Parses a size literal: raw bytes, `Ki`/`Mi`/`Gi`, or a percent of the
/// container memory limit.
///
/// # Errors
///
/// Returns [`Error::InvalidSize`] on anything else.
pub fn parse_size(s: &str) -> Result<ByteSize> {
    let s = s.trim();
    if let Some(percent) = s.strip_suffix('%') {
        let p: f64 = percent
            .parse()
            .map_err(|_| Error::InvalidSize(s.to_string()))?;
        if !(0.0..=100.0).contains(&p) {
            return Err(Error::InvalidSize(s.to_string()));
        }
        return Ok(ByteSize::Percent(p));
    }

    let (digits, multiplier) = if let Some(d) = s.strip_suffix("Gi") {
        (d, 1u64 << 30)
    } else if let Some(d) = s.strip_suffix("Mi") {
        (d, 1u64 << 20)
    } else if let Some(d) = s.strip_suffix("Ki") {
        (d, 1u64 << 10)
    } else {
        (s, 1)
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidSize(s.to_string()))?;
    value
        .checked_mul(multiplier)
        .map(ByteSize::Bytes)
        .ok_or_else(|| Error::InvalidSize(s.to_string()))
}

/// Renders a size canonically with the largest exact binary suffix.
#[must_use]
pub fn fmt_size(size: ByteSize) -> String {
    match size {
        ByteSize::Percent(p) => format!("{p}%"),
        ByteSize::Bytes(n) if n > 0 && n % (1 << 30) == 0 => format!("{}Gi", n >> 30),
        ByteSize::Bytes(n) if n > 0 && n % (1 << 20) == 0 => format!("{}Mi", n >> 20),
        ByteSize::Bytes(n) if n > 0 && n % (1 << 10) == 0 => format!("{}Ki", n >> 10),
        ByteSize::Bytes(n) => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_fixed_latency() {
        let parsed = parse_chain("latency=100ms");
        assert!(parsed.warnings.is_empty());
        let behavior = parsed.chain.for_service("web");
        assert_eq!(
            behavior.latency,
            Some(Latency::Fixed(Duration::from_millis(100)))
        );
    }

    #[test]
    fn parse_latency_range_inherits_unit() {
        let behavior = parse_chain("latency=10-50ms").chain.for_service("web");
        assert_eq!(
            behavior.latency,
            Some(Latency::Range {
                min: Duration::from_millis(10),
                max: Duration::from_millis(50),
            })
        );
    }

    #[test]
    fn parse_latency_range_with_units() {
        let behavior = parse_chain("latency=500ms-2s").chain.for_service("web");
        assert_eq!(
            behavior.latency,
            Some(Latency::Range {
                min: Duration::from_millis(500),
                max: Duration::from_secs(2),
            })
        );
    }

    #[test]
    fn parse_latency_rejects_inverted_range() {
        let parsed = parse_chain("latency=5s-1s");
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.chain.for_service("web").latency.is_none());
    }

    #[test]
    fn parse_error_forms() {
        let p = parse_chain("error=0.5").chain.for_service("web");
        assert_eq!(p.error.as_ref().unwrap().code, 500);
        assert!((p.error.unwrap().probability - 0.5).abs() < f64::EPSILON);

        let p = parse_chain("error=503").chain.for_service("web");
        assert_eq!(p.error.as_ref().unwrap().code, 503);
        assert!((p.error.unwrap().probability - 1.0).abs() < f64::EPSILON);

        let p = parse_chain("error=429:0.25").chain.for_service("web");
        assert_eq!(p.error.as_ref().unwrap().code, 429);
        assert!((p.error.unwrap().probability - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_cpu_defaults() {
        let p = parse_chain("cpu=spike").chain.for_service("web");
        let cpu = p.cpu.unwrap();
        assert_eq!(cpu.duration, Duration::from_secs(5));
        assert_eq!(cpu.intensity, 80);

        let p = parse_chain("cpu=spike:2s:50%").chain.for_service("web");
        let cpu = p.cpu.unwrap();
        assert_eq!(cpu.duration, Duration::from_secs(2));
        assert_eq!(cpu.intensity, 50);
    }

    #[test]
    fn parse_memory_forms() {
        let p = parse_chain("memory=leak-slow:30s").chain.for_service("web");
        assert_eq!(
            p.memory,
            Some(MemoryLoad::LeakSlow {
                duration: Duration::from_secs(30)
            })
        );

        let p = parse_chain("memory=spike:64Mi").chain.for_service("web");
        assert_eq!(
            p.memory,
            Some(MemoryLoad::Spike {
                size: ByteSize::Bytes(64 << 20),
                duration: Duration::from_secs(10),
            })
        );

        let p = parse_chain("memory=spike:10%:5s").chain.for_service("web");
        assert_eq!(
            p.memory,
            Some(MemoryLoad::Spike {
                size: ByteSize::Percent(10.0),
                duration: Duration::from_secs(5),
            })
        );
    }

    #[test]
    fn parse_disk_fill() {
        let p = parse_chain("disk=fill:1Mi:/tmp/fill.dat:10s")
            .chain
            .for_service("web");
        assert_eq!(
            p.disk,
            Some(DiskFill {
                size: 1 << 20,
                path: "/tmp/fill.dat".to_string(),
                duration: Duration::from_secs(10),
            })
        );
    }

    #[test]
    fn parse_file_triggers() {
        let p = parse_chain("crash-if-file=/tmp/x:invalid;bad")
            .chain
            .for_service("web");
        let crash = p.crash_if_file.unwrap();
        assert_eq!(crash.path, "/tmp/x");
        assert_eq!(crash.needles, vec!["invalid", "bad"]);

        let p = parse_chain("error-if-file=/tmp/x:denied:403")
            .chain
            .for_service("web");
        let err = p.error_if_file.unwrap();
        assert_eq!(err.code, 403);
        assert_eq!(err.needles, vec!["denied"]);

        let p = parse_chain("error-if-file=/tmp/x:denied")
            .chain
            .for_service("web");
        assert_eq!(p.error_if_file.unwrap().code, 401);
    }

    #[test]
    fn parse_upstream_weights() {
        let p = parse_chain("upstreamWeights=ok:85;fail:15")
            .chain
            .for_service("web");
        let weights = p.upstream_weights.unwrap();
        assert_eq!(weights["ok"], 85);
        assert_eq!(weights["fail"], 15);
    }

    #[test]
    fn unknown_key_is_skipped_with_warning() {
        let parsed = parse_chain("latency=10ms,jitter=5ms");
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("unknown key"));
        assert!(parsed.chain.for_service("web").latency.is_some());
    }

    #[test]
    fn malformed_entry_keeps_rest_of_chain() {
        let parsed = parse_chain("latency=oops,error=503");
        assert_eq!(parsed.warnings.len(), 1);
        let behavior = parsed.chain.for_service("web");
        assert!(behavior.latency.is_none());
        assert_eq!(behavior.error.unwrap().code, 503);
    }

    #[test]
    fn entries_inherit_most_recent_service_name() {
        let parsed = parse_chain("latency=10ms,order-api:error=503,panic=0.5");
        assert!(parsed.warnings.is_empty());

        // panic attaches to order-api, not to the globals.
        let order = parsed.chain.for_service("order-api");
        assert!(order.latency.is_none());
        assert!(order.error.is_some());
        assert!(order.panic.is_some());

        let other = parsed.chain.for_service("product-api");
        assert!(other.latency.is_some());
        assert!(other.panic.is_none());
    }

    #[test]
    fn zero_duration_latency_parses() {
        let behavior = parse_chain("latency=0ms").chain.for_service("web");
        assert_eq!(behavior.latency, Some(Latency::Fixed(Duration::ZERO)));
    }

    #[test]
    fn duration_formatting_is_canonical() {
        assert_eq!(fmt_duration(Duration::from_millis(100)), "100ms");
        assert_eq!(fmt_duration(Duration::from_secs(5)), "5s");
        assert_eq!(fmt_duration(Duration::from_micros(250)), "250us");
        assert_eq!(fmt_duration(Duration::ZERO), "0ms");
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn size_formatting_is_canonical() {
        assert_eq!(fmt_size(ByteSize::Bytes(64 << 20)), "64Mi");
        assert_eq!(fmt_size(ByteSize::Bytes(2 << 30)), "2Gi");
        assert_eq!(fmt_size(ByteSize::Bytes(1000)), "1000");
        assert_eq!(fmt_size(ByteSize::Percent(12.5)), "12.5%");
    }

    fn duration_strategy() -> impl Strategy<Value = Duration> {
        (1u64..10_000).prop_map(Duration::from_millis)
    }

    fn probability_strategy() -> impl Strategy<Value = f64> {
        (0u32..=100).prop_map(|n| f64::from(n) / 100.0)
    }

    fn behavior_strategy() -> impl Strategy<Value = Behavior> {
        let latency = prop_oneof![
            duration_strategy().prop_map(Latency::Fixed),
            (duration_strategy(), duration_strategy()).prop_map(|(a, b)| Latency::Range {
                min: a.min(b),
                max: a.max(b),
            }),
        ];
        let error = (100u16..=599, probability_strategy())
            .prop_map(|(code, probability)| ErrorInjection { code, probability });
        let cpu = (duration_strategy(), 1u8..=100).prop_map(|(duration, intensity)| CpuSpike {
            duration,
            intensity,
        });
        let memory = prop_oneof![
            duration_strategy().prop_map(|duration| MemoryLoad::LeakSlow { duration }),
            duration_strategy().prop_map(|duration| MemoryLoad::LeakFast { duration }),
            (1u64..1_000_000, duration_strategy()).prop_map(|(size, duration)| {
                MemoryLoad::Spike {
                    size: ByteSize::Bytes(size),
                    duration,
                }
            }),
        ];
        let weights = proptest::collection::btree_map("[a-z][a-z0-9-]{1,8}", 0u32..=100, 1..4);

        (
            proptest::option::of(latency),
            proptest::option::of(error),
            proptest::option::of(probability_strategy()),
            proptest::option::of(cpu),
            proptest::option::of(memory),
            proptest::option::of(weights),
        )
            .prop_map(|(latency, error, panic, cpu, memory, upstream_weights)| Behavior {
                latency,
                error,
                panic,
                cpu,
                memory,
                upstream_weights,
                ..Behavior::default()
            })
    }

    proptest! {
        #[test]
        fn reserialize_roundtrips(behavior in behavior_strategy()) {
            let dsl = behavior.to_dsl();
            let parsed = parse_chain(&dsl);
            prop_assert!(parsed.warnings.is_empty(), "warnings: {:?}", parsed.warnings);
            let reparsed = parsed.chain.for_service("any");
            prop_assert_eq!(&reparsed, &behavior);
            prop_assert_eq!(reparsed.to_dsl(), dsl);
        }
    }
}
