//! The fixed-phase behavior pipeline.
//!
//! Phases run in a fixed order and short-circuit on the first decision
//! to return: perturbations (latency → cpu → memory), disk fill,
//! crash-if-file, error-if-file, panic, error injection. Each applied
//! phase appends a tag; the tag list rides on the envelope and feeds the
//! `behavior_applied_total` counter.

use crate::diskfill;
use crate::filecheck;
use crate::perturb;
use behavior_dsl::{fmt_duration, Behavior, ByteSize, Latency, MemoryLoad};
use mimic_core::{RequestContext, Sampler};

/// What the pipeline decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Proceed to upstream dispatch.
    Continue,
    /// Stop now and answer with this status and body.
    EarlyExit {
        /// Response status code.
        code: u16,
        /// Response body text.
        body: String,
    },
    /// The caller went away mid-pipeline.
    Cancelled,
}

/// Applied tags plus the outcome.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Tags in application order.
    pub applied: Vec<String>,
    /// The decision.
    pub outcome: PipelineOutcome,
}

impl PipelineRun {
    fn exit(applied: Vec<String>, code: u16, body: String) -> Self {
        Self {
            applied,
            outcome: PipelineOutcome::EarlyExit { code, body },
        }
    }
}

/// Runs every phase of `behavior` for one request.
pub async fn run(behavior: &Behavior, ctx: &RequestContext, sampler: &Sampler) -> PipelineRun {
    let mut applied: Vec<String> = Vec::new();

    // Phase 1: non-terminating perturbations, in declaration order.
    if let Some(latency) = &behavior.latency {
        let (duration, tag) = match latency {
            Latency::Fixed(d) => (*d, format!("latency:fixed:{}", fmt_duration(*d))),
            Latency::Range { min, max } => {
                let sampled = sampler.duration_between(*min, *max);
                (
                    sampled,
                    format!(
                        "latency:range:{}-{}:{}",
                        fmt_duration(*min),
                        fmt_duration(*max),
                        fmt_duration(sampled)
                    ),
                )
            }
        };
        if !duration.is_zero() {
            if !perturb::sleep_cancellable(duration, &ctx.cancel).await {
                return PipelineRun {
                    applied,
                    outcome: PipelineOutcome::Cancelled,
                };
            }
            applied.push(tag);
        }
    }

    if let Some(cpu) = &behavior.cpu {
        perturb::spawn_cpu_spike(cpu, ctx.cancel.clone());
        applied.push(format!(
            "cpu:spike:{}:{}",
            fmt_duration(cpu.duration),
            cpu.intensity
        ));
    }

    if let Some(memory) = &behavior.memory {
        perturb::spawn_memory_load(memory, ctx.cancel.clone());
        applied.push(memory_tag(memory));
    }

    // Phase 2: disk fill.
    if let Some(disk) = &behavior.disk {
        match diskfill::fill(disk, &ctx.cancel).await {
            Ok(()) => applied.push(format!(
                "disk:fill:{}:{}:{}",
                disk.size,
                disk.path,
                fmt_duration(disk.duration)
            )),
            Err(e) => {
                return PipelineRun::exit(
                    applied,
                    507,
                    format!("disk fill of {} failed: {e}", disk.path),
                )
            }
        }
    }

    // Phase 3: crash-if-file. Does not return on a match.
    if let Some(crash) = &behavior.crash_if_file {
        filecheck::crash_check(crash).await;
    }

    // Phase 4: error-if-file.
    if let Some(check) = &behavior.error_if_file {
        if let Some((code, body)) = filecheck::error_check(check).await {
            applied.push(format!("error-if-file:{code}"));
            return PipelineRun::exit(applied, code, body);
        }
    }

    // Phase 5: panic.
    if let Some(p) = behavior.panic {
        if sampler.chance(p) {
            tracing::error!(probability = p, "panic behavior fired, aborting process");
            std::process::abort();
        }
    }

    // Phase 6: error injection.
    if let Some(error) = &behavior.error {
        if sampler.chance(error.probability) {
            applied.push(format!("error:{}:{:.2}", error.code, error.probability));
            return PipelineRun::exit(
                applied,
                error.code,
                format!("Injected error: {}", error.code),
            );
        }
    }

    PipelineRun {
        applied,
        outcome: PipelineOutcome::Continue,
    }
}

fn memory_tag(memory: &MemoryLoad) -> String {
    match memory {
        MemoryLoad::LeakSlow { duration } => {
            format!("memory:leak-slow:{}", fmt_duration(*duration))
        }
        MemoryLoad::LeakFast { duration } => {
            format!("memory:leak-fast:{}", fmt_duration(*duration))
        }
        MemoryLoad::Spike { size, duration } => {
            let size = match size {
                ByteSize::Bytes(n) => n.to_string(),
                ByteSize::Percent(p) => format!("{p}%"),
            };
            format!("memory:spike:{size}:{}", fmt_duration(*duration))
        }
    }
}
