//! Typed behavior plan model.
//!
//! A [`Behavior`] is the parsed form of one or more DSL entries addressed to
//! the same target. Every sub-plan is optional; an empty behavior is a no-op.

use crate::parser::{fmt_duration, fmt_size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

/// Default status code for injected errors.
pub const DEFAULT_ERROR_CODE: u16 = 500;

/// Default status code for `error-if-file` matches.
pub const DEFAULT_FILE_ERROR_CODE: u16 = 401;

/// Default CPU spike duration.
pub const DEFAULT_CPU_DURATION: Duration = Duration::from_secs(5);

/// Default CPU spike intensity, in percent of one worker.
pub const DEFAULT_CPU_INTENSITY: u8 = 80;

/// Default window for memory leak patterns.
pub const DEFAULT_LEAK_DURATION: Duration = Duration::from_secs(60);

/// Default hold window for memory spikes.
pub const DEFAULT_SPIKE_DURATION: Duration = Duration::from_secs(10);

/// A parsed fault-injection plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Behavior {
    /// Added response latency, fixed or sampled from a range.
    pub latency: Option<Latency>,
    /// Probabilistic error injection.
    pub error: Option<ErrorInjection>,
    /// Probability of aborting the process.
    pub panic: Option<f64>,
    /// CPU burn plan.
    pub cpu: Option<CpuSpike>,
    /// Memory allocation plan.
    pub memory: Option<MemoryLoad>,
    /// Disk fill plan.
    pub disk: Option<DiskFill>,
    /// Abort the process if a file contains a forbidden substring.
    pub crash_if_file: Option<CrashFile>,
    /// Return an error if a file contains a forbidden substring.
    pub error_if_file: Option<ErrorFile>,
    /// Relative weights overriding grouped upstream selection.
    pub upstream_weights: Option<BTreeMap<String, u32>>,
}

/// Added latency: a fixed duration or a closed range sampled per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Latency {
    /// Sleep for exactly this long.
    Fixed(Duration),
    /// Sleep for a uniform sample in `[min, max]`.
    Range {
        /// Lower bound of the sample.
        min: Duration,
        /// Upper bound of the sample.
        max: Duration,
    },
}

/// Probabilistic error injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInjection {
    /// Status code to return when the injection fires.
    pub code: u16,
    /// Probability in `[0, 1]` that the injection fires.
    pub probability: f64,
}

/// A CPU burn: busy-loop one worker at `intensity` percent for `duration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSpike {
    /// How long the burn runs.
    pub duration: Duration,
    /// Duty cycle of the burn, in percent.
    pub intensity: u8,
}

/// A memory allocation pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryLoad {
    /// Ramp allocation gradually across the window.
    LeakSlow {
        /// Window over which the leak grows.
        duration: Duration,
    },
    /// Ramp allocation aggressively across the window.
    LeakFast {
        /// Window over which the leak grows.
        duration: Duration,
    },
    /// Allocate `size` immediately and hold it for the window.
    Spike {
        /// Amount to allocate.
        size: ByteSize,
        /// How long the allocation is held.
        duration: Duration,
    },
}

/// A byte amount, absolute or relative to the container memory limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ByteSize {
    /// Absolute size in bytes.
    Bytes(u64),
    /// Percent of the container memory limit.
    Percent(f64),
}

/// A disk fill: create `path`, write `size` bytes, hold for `duration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskFill {
    /// Bytes to write.
    pub size: u64,
    /// Target file path.
    pub path: String,
    /// How long the file is held before removal.
    pub duration: Duration,
}

/// Abort the process when `path` contains any of `needles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashFile {
    /// File to scan.
    pub path: String,
    /// Forbidden substrings.
    pub needles: Vec<String>,
}

/// Return `code` when `path` contains any of `needles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFile {
    /// File to scan.
    pub path: String,
    /// Forbidden substrings.
    pub needles: Vec<String>,
    /// Status code to return on a match.
    pub code: u16,
}

impl Behavior {
    /// Returns true if no sub-plan is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlays `other` onto this behavior; keys set in `other` win.
    ///
    /// This is the "last key-value wins" rule for repeated entries
    /// addressed to the same service.
    pub fn merge(&mut self, other: &Self) {
        if other.latency.is_some() {
            self.latency.clone_from(&other.latency);
        }
        if other.error.is_some() {
            self.error.clone_from(&other.error);
        }
        if other.panic.is_some() {
            self.panic = other.panic;
        }
        if other.cpu.is_some() {
            self.cpu.clone_from(&other.cpu);
        }
        if other.memory.is_some() {
            self.memory.clone_from(&other.memory);
        }
        if other.disk.is_some() {
            self.disk.clone_from(&other.disk);
        }
        if other.crash_if_file.is_some() {
            self.crash_if_file.clone_from(&other.crash_if_file);
        }
        if other.error_if_file.is_some() {
            self.error_if_file.clone_from(&other.error_if_file);
        }
        if other.upstream_weights.is_some() {
            self.upstream_weights.clone_from(&other.upstream_weights);
        }
    }

    /// Reserializes this behavior to DSL text.
    ///
    /// The output is canonical: parsing it back yields an equal behavior,
    /// and reserializing that parse yields the same text.
    #[must_use]
    pub fn to_dsl(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        match &self.latency {
            Some(Latency::Fixed(d)) => parts.push(format!("latency={}", fmt_duration(*d))),
            Some(Latency::Range { min, max }) => parts.push(format!(
                "latency={}-{}",
                fmt_duration(*min),
                fmt_duration(*max)
            )),
            None => {}
        }
        if let Some(err) = &self.error {
            parts.push(format!("error={}:{}", err.code, err.probability));
        }
        if let Some(p) = self.panic {
            parts.push(format!("panic={p}"));
        }
        if let Some(cpu) = &self.cpu {
            parts.push(format!(
                "cpu=spike:{}:{}",
                fmt_duration(cpu.duration),
                cpu.intensity
            ));
        }
        match &self.memory {
            Some(MemoryLoad::LeakSlow { duration }) => {
                parts.push(format!("memory=leak-slow:{}", fmt_duration(*duration)));
            }
            Some(MemoryLoad::LeakFast { duration }) => {
                parts.push(format!("memory=leak-fast:{}", fmt_duration(*duration)));
            }
            Some(MemoryLoad::Spike { size, duration }) => {
                parts.push(format!(
                    "memory=spike:{}:{}",
                    fmt_size(*size),
                    fmt_duration(*duration)
                ));
            }
            None => {}
        }
        if let Some(disk) = &self.disk {
            parts.push(format!(
                "disk=fill:{}:{}:{}",
                fmt_size(ByteSize::Bytes(disk.size)),
                disk.path,
                fmt_duration(disk.duration)
            ));
        }
        if let Some(crash) = &self.crash_if_file {
            parts.push(format!(
                "crash-if-file={}:{}",
                crash.path,
                crash.needles.join(";")
            ));
        }
        if let Some(err) = &self.error_if_file {
            parts.push(format!(
                "error-if-file={}:{}:{}",
                err.path,
                err.needles.join(";"),
                err.code
            ));
        }
        if let Some(weights) = &self.upstream_weights {
            let mut s = String::from("upstreamWeights=");
            for (i, (id, w)) in weights.iter().enumerate() {
                if i > 0 {
                    s.push(';');
                }
                let _ = write!(s, "{id}:{w}");
            }
            parts.push(s);
        }

        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_behavior_is_empty() {
        assert!(Behavior::default().is_empty());
    }

    #[test]
    fn merge_overrides_set_keys_only() {
        let mut base = Behavior {
            latency: Some(Latency::Fixed(Duration::from_millis(10))),
            error: Some(ErrorInjection {
                code: 500,
                probability: 0.5,
            }),
            ..Behavior::default()
        };
        let overlay = Behavior {
            error: Some(ErrorInjection {
                code: 503,
                probability: 1.0,
            }),
            ..Behavior::default()
        };

        base.merge(&overlay);

        assert_eq!(
            base.latency,
            Some(Latency::Fixed(Duration::from_millis(10)))
        );
        assert_eq!(base.error.unwrap().code, 503);
    }

    #[test]
    fn to_dsl_orders_keys_canonically() {
        let behavior = Behavior {
            error: Some(ErrorInjection {
                code: 503,
                probability: 1.0,
            }),
            latency: Some(Latency::Fixed(Duration::from_millis(100))),
            ..Behavior::default()
        };

        assert_eq!(behavior.to_dsl(), "latency=100ms,error=503:1");
    }

    #[test]
    fn to_dsl_renders_weights_sorted() {
        let mut weights = BTreeMap::new();
        weights.insert("fail".to_string(), 15);
        weights.insert("ok".to_string(), 85);
        let behavior = Behavior {
            upstream_weights: Some(weights),
            ..Behavior::default()
        };

        assert_eq!(behavior.to_dsl(), "upstreamWeights=fail:15;ok:85");
    }
}
