//! Non-terminating perturbations: latency, CPU burn, memory load.
//!
//! CPU and memory work runs on short-lived background workers bounded by
//! the configured duration; the pipeline does not wait for them. Memory
//! is always released when the worker's scope ends, whether it ran out
//! its window or was cancelled.

use behavior_dsl::{ByteSize, CpuSpike, MemoryLoad};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sleeps cooperatively; returns false if cancelled first.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Burn window granularity; also the cancellation check interval.
const BURN_WINDOW: Duration = Duration::from_millis(10);

/// Spawns a blocking worker that busy-loops one core at the spike's duty
/// cycle until the duration elapses or the request is cancelled.
pub fn spawn_cpu_spike(spike: &CpuSpike, cancel: CancellationToken) {
    let duration = spike.duration;
    let busy = BURN_WINDOW.mul_f64(f64::from(spike.intensity) / 100.0);
    let idle = BURN_WINDOW.saturating_sub(busy);

    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        while started.elapsed() < duration && !cancel.is_cancelled() {
            let spin_until = Instant::now() + busy;
            while Instant::now() < spin_until {
                std::hint::spin_loop();
            }
            if !idle.is_zero() {
                std::thread::sleep(idle);
            }
        }
    });
}

/// Chunk granularity for leak patterns.
const LEAK_CHUNK: usize = 1 << 20;

/// Allocation cadence for the two leak speeds.
const LEAK_SLOW_INTERVAL: Duration = Duration::from_millis(500);
const LEAK_FAST_INTERVAL: Duration = Duration::from_millis(50);

/// Spawns a worker that applies the memory pattern and releases every
/// byte when its scope exits.
pub fn spawn_memory_load(load: &MemoryLoad, cancel: CancellationToken) {
    let load = load.clone();
    tokio::spawn(async move {
        match load {
            MemoryLoad::Spike { size, duration } => {
                let bytes = resolve_bytes(size);
                let held = allocate(bytes);
                tracing::debug!(bytes = held.len(), "memory spike allocated");
                let _ = sleep_cancellable(duration, &cancel).await;
                // `held` drops here, releasing the spike.
            }
            MemoryLoad::LeakSlow { duration } => {
                leak(duration, LEAK_SLOW_INTERVAL, &cancel).await;
            }
            MemoryLoad::LeakFast { duration } => {
                leak(duration, LEAK_FAST_INTERVAL, &cancel).await;
            }
        }
    });
}

async fn leak(duration: Duration, interval: Duration, cancel: &CancellationToken) {
    let started = Instant::now();
    let mut held: Vec<Vec<u8>> = Vec::new();
    while started.elapsed() < duration {
        if !sleep_cancellable(interval, cancel).await {
            break;
        }
        held.push(allocate(LEAK_CHUNK as u64));
    }
    tracing::debug!(chunks = held.len(), "memory leak window ended");
    // `held` drops here, releasing the leak.
}

/// Allocates and touches `bytes` so pages are actually committed.
fn allocate(bytes: u64) -> Vec<u8> {
    let len = usize::try_from(bytes).unwrap_or(usize::MAX);
    vec![0xAA; len]
}

/// Resolves a size against the container memory limit when relative.
fn resolve_bytes(size: ByteSize) -> u64 {
    match size {
        ByteSize::Bytes(n) => n,
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        ByteSize::Percent(p) => ((container_memory_limit() as f64) * p / 100.0) as u64,
    }
}

/// Reads the cgroup memory limit, falling back to total system memory.
fn container_memory_limit() -> u64 {
    // cgroup v2, then v1, then /proc/meminfo.
    if let Ok(raw) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
        if let Ok(limit) = raw.trim().parse::<u64>() {
            return limit;
        }
    }
    if let Ok(raw) = std::fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        if let Ok(limit) = raw.trim().parse::<u64>() {
            return limit;
        }
    }
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                let kb: u64 = rest
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .unwrap_or(0);
                if kb > 0 {
                    return kb * 1024;
                }
            }
        }
    }
    1 << 30
}
