//! The dispatch implementation: one downstream call per invocation,
//! framing chosen by the record, transport failures folded into code-0
//! children.

use crate::{grpc, http};
use async_trait::async_trait;
use mimic_core::{Envelope, Framing, Metrics, RequestContext, RuntimeConfig, UpstreamRecord};
use mimic_engine::Dispatch;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tonic::transport::Channel;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues downstream calls for the engine.
pub struct Caller {
    http: reqwest::Client,
    /// Lazily-built channels per binary target, keyed by record id.
    channels: Mutex<HashMap<String, Channel>>,
    deadline: Duration,
    metrics: Arc<Metrics>,
}

impl Caller {
    /// Builds the caller from runtime configuration.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(config: &RuntimeConfig, metrics: Arc<Metrics>) -> mimic_core::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| mimic_core::Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            channels: Mutex::new(HashMap::new()),
            deadline: config.client_timeout,
            metrics,
        })
    }

    /// Per-call deadline: the configured cap, tightened by whatever is
    /// left of the inbound deadline.
    fn call_deadline(&self, ctx: &RequestContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => self.deadline.min(remaining),
            None => self.deadline,
        }
    }

    async fn channel(&self, record: &UpstreamRecord) -> Result<Channel, String> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(&record.id) {
            return Ok(channel.clone());
        }
        let channel = grpc::channel_for(record, CONNECT_TIMEOUT)?;
        channels.insert(record.id.clone(), channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl Dispatch for Caller {
    async fn call(
        &self,
        record: &UpstreamRecord,
        ctx: &RequestContext,
        propagation: &str,
    ) -> Envelope {
        let deadline = self.call_deadline(ctx);
        // Each outgoing call is its own span on the shared trace.
        let trace = ctx.trace.child();
        let started = Instant::now();

        let result = match record.framing {
            Framing::Text => {
                http::call(&self.http, record, &trace, propagation, deadline).await
            }
            Framing::Binary => match self.channel(record).await {
                Ok(channel) => {
                    grpc::call(channel, record, &trace, propagation, deadline).await
                }
                Err(e) => Err(e),
            },
        };

        let child = result.unwrap_or_else(|error| {
            tracing::warn!(target_id = %record.id, error = %error, "upstream call failed");
            Envelope::unreachable(&record.id, error)
        });

        self.metrics
            .upstream_calls_total
            .with_label_values(&[record.id.as_str(), &child.code.to_string()])
            .inc();
        self.metrics
            .upstream_duration_seconds
            .with_label_values(&[record.id.as_str()])
            .observe(started.elapsed().as_secs_f64());

        child
    }
}
