//! mimic: one instance of the synthetic microservice runtime.
//!
//! Configuration arrives through the environment (or equivalent flags);
//! the instance then serves its text and binary surfaces until it is
//! signalled to stop, crashes on purpose, or hits a fatal config error.

use anyhow::Context;
use clap::Parser;
use mimic_client::Caller;
use mimic_core::{Args, Metrics, RuntimeConfig, Sampler};
use mimic_engine::Engine;
use std::sync::Arc;
use tokio::signal::unix;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(RuntimeConfig::from_args(&args).context("loading configuration")?);
    tracing::info!(
        service = %config.identity.name,
        version = %config.identity.version,
        namespace = %config.identity.namespace,
        upstreams = config.upstreams.len(),
        telemetry_endpoint = config.telemetry_endpoint.as_deref().unwrap_or("none"),
        "starting"
    );

    let metrics = Arc::new(Metrics::new().context("registering metrics")?);
    let sampler = Arc::new(Sampler::new(config.rng_seed));
    let caller = Arc::new(
        Caller::new(&config, Arc::clone(&metrics)).context("building downstream clients")?,
    );
    let engine = Arc::new(Engine::new(
        Arc::clone(&config),
        sampler,
        metrics,
        caller,
    ));

    // File-content triggers fire at startup too, before readiness.
    engine.startup_checks().await;

    // Gracefully exit on either SIGINT (ctrl-c) or SIGTERM.
    let shutdown = CancellationToken::new();
    let mut sigint = unix::signal(unix::SignalKind::interrupt())?;
    let mut sigterm = unix::signal(unix::SignalKind::terminate())?;
    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => (),
        }
        tracing::info!("caught signal to exit");
        stop.cancel();
    });

    mimic_server::serve(engine, shutdown)
        .await
        .context("serving")?;

    tracing::info!("graceful stop");
    Ok(())
}
