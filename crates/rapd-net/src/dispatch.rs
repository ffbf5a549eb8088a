//! Outbound delivery of framed messages to a launcher or control process.

use std::sync::Arc;
use std::time::Duration;

use rapd_core::wire::{self, WireError};
use rapd_model::Address;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

/// Fixed-interval connect retry. No backoff and no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("cannot encode message: {0}")]
    Encode(#[from] WireError),

    #[error("{target} unreachable after {attempts} attempts: {source}")]
    Unreachable {
        target: Address,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("connection broken after {sent} of {total} bytes")]
    Broken { sent: usize, total: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One message on its way to one peer.
///
/// The payload is framed once at construction. Delivery is best effort: the peer sends no
/// acknowledgement, and only the connect step is retried.
#[derive(Clone, Debug)]
pub struct LaunchAction {
    target: Address,
    frame: Arc<str>,
    policy: RetryPolicy,
}

impl LaunchAction {
    pub fn new<T: Serialize + ?Sized>(target: Address, payload: &T) -> Result<Self, DispatchError> {
        Ok(Self {
            target,
            frame: wire::frame(payload)?.into(),
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target(&self) -> &Address {
        &self.target
    }

    /// Framed bytes that will be written.
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Connect, write the whole frame and close. Returns the number of bytes written.
    #[instrument(level = "debug", skip(self), fields(peer = %self.target))]
    pub async fn send(&self) -> Result<usize, DispatchError> {
        let mut stream = self.connect().await?;
        let bytes = self.frame.as_bytes();

        let mut sent = 0;
        while sent < bytes.len() {
            let n = stream.write(&bytes[sent..]).await?;
            if n == 0 {
                return Err(DispatchError::Broken {
                    sent,
                    total: bytes.len(),
                });
            }
            sent += n;
            trace!(target: "rapd.net.dispatch", sent, total = bytes.len(), "partial write");
        }
        stream.shutdown().await?;

        debug!(target: "rapd.net.dispatch", bytes = sent, "delivered");
        Ok(sent)
    }

    /// Run [`LaunchAction::send`] on its own task. Failures are logged there as well.
    pub fn spawn(self) -> JoinHandle<Result<usize, DispatchError>> {
        tokio::spawn(async move {
            let res = self.send().await;
            if let Err(e) = &res {
                warn!(target: "rapd.net.dispatch", peer = %self.target, error = %e, "dispatch failed");
            }
            res
        })
    }

    async fn connect(&self) -> Result<TcpStream, DispatchError> {
        let attempts = self.policy.attempts.max(1);
        let authority = self.target.authority();

        let mut attempt = 1;
        loop {
            match TcpStream::connect(&authority).await {
                Ok(stream) => {
                    trace!(target: "rapd.net.dispatch", attempt, "connected");
                    return Ok(stream);
                }
                Err(source) if attempt >= attempts => {
                    return Err(DispatchError::Unreachable {
                        target: self.target.clone(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    debug!(target: "rapd.net.dispatch", attempt, error = %e, "connect failed; retrying");
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }
}

/// Frame `payload` and deliver it to `target` with the default retry policy.
pub async fn dispatch<T: Serialize + ?Sized>(target: Address, payload: &T) -> Result<usize, DispatchError> {
    LaunchAction::new(target, payload)?.send().await
}
