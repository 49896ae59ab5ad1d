//! Configuration ingestion.
//!
//! One environment key per concern, mirrored as CLI flags for local runs.
//! The parsed [`RuntimeConfig`] is immutable; everything downstream takes
//! it by shared reference.

use crate::error::{Error, Result};
use crate::identity::{Framing, ServiceIdentity};
use crate::upstream::{parse_upstreams, UpstreamRecord};
use std::time::Duration;

/// Environment-driven arguments.
#[derive(clap::Parser, Debug, Clone)]
#[command(name = "mimic")]
#[command(about = "Synthetic microservice runtime for chaos and resilience testing")]
#[command(version)]
pub struct Args {
    /// Logical service name; the behavior-target key for this instance.
    #[arg(long, env = "SERVICE_NAME", default_value = "mimic")]
    pub service_name: String,

    /// Service version label stamped on responses.
    #[arg(long, env = "SERVICE_VERSION", default_value = "0.1.0")]
    pub service_version: String,

    /// Kubernetes namespace label.
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Pod name label.
    #[arg(long, env = "POD_NAME", default_value = "")]
    pub pod_name: String,

    /// Node name label.
    #[arg(long, env = "NODE_NAME", default_value = "")]
    pub node_name: String,

    /// Port for the text (HTTP/JSON) surface.
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Port for the binary (gRPC) surface. Equal ports multiplex one
    /// listener.
    #[arg(long, env = "GRPC_PORT", default_value_t = 9090)]
    pub grpc_port: u16,

    /// Port for the Prometheus text exposition.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9102)]
    pub metrics_port: u16,

    /// Upstream records, `id=url(:param)*` joined by `|`.
    #[arg(long, env = "UPSTREAMS", default_value = "")]
    pub upstreams: String,

    /// Behavior applied when a request carries none.
    #[arg(long, env = "DEFAULT_BEHAVIOR", default_value = "")]
    pub default_behavior: String,

    /// Telemetry collector endpoint; informational, logged at startup.
    #[arg(long, env = "TELEMETRY_ENDPOINT", default_value = "")]
    pub telemetry_endpoint: String,

    /// Log filter, e.g. `info` or `mimic_engine=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-downstream-call deadline, in milliseconds.
    #[arg(long, env = "CLIENT_TIMEOUT_MS", default_value_t = 30_000)]
    pub client_timeout_ms: u64,

    /// Fixed PRNG seed for reproducible selection; entropy when unset.
    #[arg(long, env = "RNG_SEED")]
    pub rng_seed: Option<u64>,

    /// Startup equivalent of `crash-if-file`, as `<path>:<needle>[;…]`.
    #[arg(long, env = "CRASH_ON_FILE_CONTENT", default_value = "")]
    pub crash_on_file_content: String,

    /// Startup equivalent of `error-if-file`, as
    /// `<path>:<needle>[;…][:<code>]`.
    #[arg(long, env = "ERROR_ON_FILE_CONTENT", default_value = "")]
    pub error_on_file_content: String,
}

/// Immutable per-instance configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// This instance's identity; framing is stamped per surface.
    pub identity: ServiceIdentity,
    /// Text surface port.
    pub http_port: u16,
    /// Binary surface port.
    pub grpc_port: u16,
    /// Metrics port.
    pub metrics_port: u16,
    /// Configured downstream peers, in declaration order.
    pub upstreams: Vec<UpstreamRecord>,
    /// Default behavior string, with the `*_ON_FILE_CONTENT` checks
    /// folded in. Applied when a request carries no behavior; never
    /// propagated downstream.
    pub default_behavior: String,
    /// Telemetry collector endpoint, if configured.
    pub telemetry_endpoint: Option<String>,
    /// Log filter directive.
    pub log_level: String,
    /// Per-downstream-call deadline.
    pub client_timeout: Duration,
    /// Fixed PRNG seed, if configured.
    pub rng_seed: Option<u64>,
}

impl RuntimeConfig {
    /// Validates and converts parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns a fatal error on a malformed upstream table or an
    /// unusable default behavior.
    pub fn from_args(args: &Args) -> Result<Self> {
        let upstreams = parse_upstreams(&args.upstreams)?;

        let mut behavior_parts: Vec<String> = Vec::new();
        if !args.default_behavior.trim().is_empty() {
            behavior_parts.push(args.default_behavior.trim().to_string());
        }
        if !args.crash_on_file_content.trim().is_empty() {
            behavior_parts.push(format!(
                "crash-if-file={}",
                args.crash_on_file_content.trim()
            ));
        }
        if !args.error_on_file_content.trim().is_empty() {
            behavior_parts.push(format!(
                "error-if-file={}",
                args.error_on_file_content.trim()
            ));
        }
        let default_behavior = behavior_parts.join(",");

        // The default must parse cleanly: a typo here would silently
        // disable the instance's configured faults.
        let parsed = behavior_dsl::parse_chain(&default_behavior);
        if !parsed.warnings.is_empty() {
            return Err(Error::Config(format!(
                "default behavior '{default_behavior}': {}",
                parsed.warnings.join("; ")
            )));
        }

        if args.client_timeout_ms == 0 {
            return Err(Error::Config(
                "CLIENT_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        Ok(Self {
            identity: ServiceIdentity {
                name: args.service_name.clone(),
                version: args.service_version.clone(),
                namespace: args.namespace.clone(),
                pod: args.pod_name.clone(),
                node: args.node_name.clone(),
                framing: Framing::Text,
            },
            http_port: args.http_port,
            grpc_port: args.grpc_port,
            metrics_port: args.metrics_port,
            upstreams,
            default_behavior,
            telemetry_endpoint: if args.telemetry_endpoint.is_empty() {
                None
            } else {
                Some(args.telemetry_endpoint.clone())
            },
            log_level: args.log_level.clone(),
            client_timeout: Duration::from_millis(args.client_timeout_ms),
            rng_seed: args.rng_seed,
        })
    }

    /// True when both surfaces share one port and must be multiplexed.
    #[must_use]
    pub fn multiplexed(&self) -> bool {
        self.http_port == self.grpc_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mimic"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_build_a_runtime_config() {
        let config = RuntimeConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.identity.name, "mimic");
        assert_eq!(config.http_port, 8080);
        assert!(config.upstreams.is_empty());
        assert!(config.default_behavior.is_empty());
        assert_eq!(config.client_timeout, Duration::from_secs(30));
        assert!(!config.multiplexed());
    }

    #[test]
    fn file_content_checks_fold_into_default_behavior() {
        let config = RuntimeConfig::from_args(&args(&[
            "--default-behavior",
            "latency=5ms",
            "--crash-on-file-content",
            "/etc/app.conf:invalid",
            "--error-on-file-content",
            "/etc/app.conf:denied:403",
        ]))
        .unwrap();
        assert_eq!(
            config.default_behavior,
            "latency=5ms,crash-if-file=/etc/app.conf:invalid,error-if-file=/etc/app.conf:denied:403"
        );
    }

    #[test]
    fn malformed_default_behavior_is_fatal() {
        let result = RuntimeConfig::from_args(&args(&["--default-behavior", "latency=oops"]));
        assert!(result.is_err());
    }

    #[test]
    fn equal_ports_mean_multiplexing() {
        let config =
            RuntimeConfig::from_args(&args(&["--http-port", "8080", "--grpc-port", "8080"]))
                .unwrap();
        assert!(config.multiplexed());
    }
}
