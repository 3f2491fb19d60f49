//! Reload trigger
//!
//! Sends an empty POST to the reload endpoint. No retries happen here; the
//! watch loop retries by comparing fingerprints again on the next tick.

use crate::error::{Result, TransportError, WatchError};
use crate::shutdown::shutdown_requested;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// How much of the response body is read before the connection is released
const DRAIN_LIMIT: usize = 1024;

/// Something that can ask the watched server to reload
#[async_trait]
pub trait Reload: Send + Sync {
    /// Issue one reload request, abandoning it if shutdown is requested
    async fn reload(&self, shutdown: watch::Receiver<bool>) -> Result<()>;
}

/// Reload trigger backed by an HTTP POST
#[derive(Debug, Clone)]
pub struct HttpReloadTrigger {
    client: reqwest::Client,
    url: String,
}

impl HttpReloadTrigger {
    /// Create a trigger for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatchError::Transport {
                url: url.clone(),
                source: TransportError::Http(e),
            })?;

        Ok(Self { client, url })
    }

    async fn send(&self) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .send()
            .await
            .map_err(|e| self.transport_error(TransportError::Http(e)))?;

        let status = response.status();
        drain(response).await;

        if !status.is_success() {
            return Err(WatchError::ReloadRejected {
                status: status.as_u16(),
            });
        }

        debug!(url = %self.url, status = status.as_u16(), "Reload accepted");
        Ok(())
    }

    fn transport_error(&self, source: TransportError) -> WatchError {
        WatchError::Transport {
            url: self.url.clone(),
            source,
        }
    }
}

#[async_trait]
impl Reload for HttpReloadTrigger {
    async fn reload(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(url = %self.url, "Triggering reload");

        tokio::select! {
            result = self.send() => result,
            _ = shutdown_requested(&mut shutdown) => {
                Err(self.transport_error(TransportError::Cancelled))
            }
        }
    }
}

async fn drain(mut response: reqwest::Response) {
    let mut read = 0;
    while read < DRAIN_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => read += chunk.len(),
            _ => break,
        }
    }
}
