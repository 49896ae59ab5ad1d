//! Shared-port multiplexing.
//!
//! When the text and binary ports are equal, each accepted connection is
//! classified by peeking at its first bytes: an HTTP/2 connection opens
//! with the fixed preface `PRI * HTTP/2.0`, anything else is HTTP/1.1.
//! Peeking leaves the bytes in the socket, so the chosen sub-server
//! reads the stream from the start and no re-injection is needed.

use crate::grpc::RuntimeServer;
use crate::ServeError;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use mimic_core::Framing;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// The discriminating prefix of the HTTP/2 connection preface.
const H2_PREFIX: &[u8] = b"PRI ";

/// How long the classifier will wait for the first bytes.
const CLASSIFY_ATTEMPTS: u32 = 20;
const CLASSIFY_BACKOFF: Duration = Duration::from_millis(5);

/// Accept loop for the shared port.
pub async fn serve_multiplexed(
    listener: TcpListener,
    router: Router,
    grpc: RuntimeServer,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let router = router.clone();
                let grpc = grpc.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, router, grpc).await {
                        tracing::debug!(%peer, error = %e, "connection ended");
                    }
                });
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    router: Router,
    grpc: RuntimeServer,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let framing = classify(&stream).await?;
    let io = TokioIo::new(stream);
    match framing {
        Framing::Binary => {
            hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                .serve_connection(io, TowerToHyperService::new(grpc))
                .await?;
        }
        Framing::Text => {
            hyper::server::conn::http1::Builder::new()
                .serve_connection(io, TowerToHyperService::new(router))
                .await?;
        }
    }
    Ok(())
}

/// Stateless byte-prefix sniff.
async fn classify(stream: &TcpStream) -> std::io::Result<Framing> {
    let mut buf = [0u8; 4];
    for _ in 0..CLASSIFY_ATTEMPTS {
        let n = stream.peek(&mut buf).await?;
        if n >= H2_PREFIX.len() {
            return Ok(if &buf[..] == H2_PREFIX {
                Framing::Binary
            } else {
                Framing::Text
            });
        }
        if buf[..n] != H2_PREFIX[..n] {
            return Ok(Framing::Text);
        }
        // A short read that is still a preface prefix: wait for more.
        tokio::time::sleep(CLASSIFY_BACKOFF).await;
    }
    Ok(Framing::Text)
}
