//! The dual-protocol server surface.
//!
//! An instance listens on one or two TCP ports. With distinct ports the
//! text and binary surfaces run as independent listeners; with equal
//! ports a byte-prefix classifier hands each accepted connection to the
//! matching sub-server. Metrics are always exposed on their own port.

mod grpc;
mod http;
mod mux;

pub use grpc::RuntimeServer;
pub use http::{metrics_router, router, HttpState};

use mimic_engine::Engine;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;

/// Errors that keep the server from starting or tear it down.
#[derive(Debug, Error)]
pub enum ServeError {
    /// A listener could not be bound or accepted.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The gRPC transport failed.
    #[error("grpc transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Listener construction failed.
    #[error("listener: {0}")]
    Listener(String),

    /// A server task aborted.
    #[error("server task: {0}")]
    Task(String),
}

/// Binds every configured listener, flips readiness, and serves until
/// the shutdown token fires or a server fails.
///
/// # Errors
///
/// Returns the first bind or serve failure.
pub async fn serve(engine: Arc<Engine>, shutdown: CancellationToken) -> Result<(), ServeError> {
    let config = Arc::clone(engine.config());
    let ready = Arc::new(AtomicBool::new(false));
    let state = HttpState {
        engine: Arc::clone(&engine),
        ready: Arc::clone(&ready),
    };
    let router = router(state);
    let grpc = RuntimeServer::new(Arc::clone(&engine));

    let mut tasks: JoinSet<Result<(), ServeError>> = JoinSet::new();

    // Metrics exposition, always on its own port.
    let metrics_listener = TcpListener::bind(addr(config.metrics_port)).await?;
    let metrics = metrics_router(Arc::clone(engine.metrics()));
    let stop = shutdown.clone();
    tasks.spawn(async move {
        axum::serve(metrics_listener, metrics)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
            .map_err(ServeError::Io)
    });

    if config.multiplexed() {
        let listener = TcpListener::bind(addr(config.http_port)).await?;
        let stop = shutdown.clone();
        tasks.spawn(mux::serve_multiplexed(listener, router, grpc, stop));
    } else {
        let http_listener = TcpListener::bind(addr(config.http_port)).await?;
        let stop = shutdown.clone();
        tasks.spawn(async move {
            axum::serve(http_listener, router)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
                .map_err(ServeError::Io)
        });

        let incoming = TcpIncoming::new(addr(config.grpc_port), true, None)
            .map_err(|e| ServeError::Listener(e.to_string()))?;
        let stop = shutdown.clone();
        tasks.spawn(async move {
            tonic::transport::Server::builder()
                .add_service(grpc)
                .serve_with_incoming_shutdown(incoming, stop.cancelled_owned())
                .await
                .map_err(ServeError::Transport)
        });
    }

    ready.store(true, Ordering::Release);
    tracing::info!(
        http_port = config.http_port,
        grpc_port = config.grpc_port,
        metrics_port = config.metrics_port,
        multiplexed = config.multiplexed(),
        "serving"
    );

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| ServeError::Task(e.to_string()))??;
    }
    Ok(())
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}
