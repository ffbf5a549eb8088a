//! Inbound side: accept connections, cut framed messages out of them, hand them on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rapd_core::wire::{self, DEFAULT_MAX_FRAME, FrameDecoder, WireError};
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Longest the accept loop blocks before it re-checks for a stop request.
    pub accept_timeout: Duration,
    /// A connection that stays silent this long is closed. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub max_frame: usize,
    /// Connection handlers running at once; further accepts wait for a free slot.
    pub max_connections: usize,
    pub read_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            accept_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            max_frame: DEFAULT_MAX_FRAME,
            max_connections: 64,
            read_chunk: 8192,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
enum ConnError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("idle for {0:?}")]
    Idle(Duration),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Consumer of decoded messages.
///
/// Called from connection tasks, possibly concurrently; there is no ordering between
/// connections.
#[async_trait]
pub trait CommandReceiver: Send + Sync + 'static {
    async fn receive(&self, message: Value, peer: SocketAddr);
}

/// A decoded message and the peer it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Received {
    pub message: Value,
    pub peer: SocketAddr,
}

#[async_trait]
impl CommandReceiver for mpsc::Sender<Received> {
    async fn receive(&self, message: Value, peer: SocketAddr) {
        if self.send(Received { message, peer }).await.is_err() {
            debug!(target: "rapd.net.server", %peer, "receiver closed; message dropped");
        }
    }
}

pub struct ControlServer {
    listener: TcpListener,
    cfg: ServerConfig,
}

impl ControlServer {
    pub async fn bind(addr: &str, cfg: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { listener, cfg })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the accept loop on its own task. It stops when `token` (or the handle) is cancelled.
    pub fn spawn<R: CommandReceiver>(
        self,
        receiver: Arc<R>,
        token: CancellationToken,
    ) -> Result<ServerHandle, ServerError> {
        let local_addr = self.local_addr()?;
        let token = token.child_token();
        let join = tokio::spawn(self.serve(receiver, token.clone()));
        Ok(ServerHandle {
            token,
            join,
            local_addr,
        })
    }

    /// Accept until `token` is cancelled.
    ///
    /// Handlers already running are left to finish on their own; the read timeout bounds them.
    pub async fn serve<R: CommandReceiver>(
        self,
        receiver: Arc<R>,
        token: CancellationToken,
    ) -> Result<(), ServerError> {
        let local = self.listener.local_addr()?;
        let slots = Arc::new(Semaphore::new(self.cfg.max_connections.max(1)));
        let cfg = Arc::new(self.cfg);
        info!(target: "rapd.net.server", %local, "listening");

        loop {
            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                res = tokio::time::timeout(cfg.accept_timeout, self.listener.accept()) => res,
            };

            let (stream, peer) = match accepted {
                Err(_) => {
                    trace!(target: "rapd.net.server", "accept timeout");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(target: "rapd.net.server", error = %e, "accept failed");
                    continue;
                }
                Ok(Ok(conn)) => conn,
            };

            trace!(target: "rapd.net.server", %peer, "accepted");
            let receiver = receiver.clone();
            let cfg = cfg.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match handle_connection(stream, peer, receiver.as_ref(), &cfg).await {
                    Ok(frames) => debug!(target: "rapd.net.server", %peer, frames, "connection closed"),
                    Err(e) => warn!(target: "rapd.net.server", %peer, error = %e, "connection dropped"),
                }
            });
        }

        info!(target: "rapd.net.server", %local, "stopped");
        Ok(())
    }
}

async fn handle_connection<R: CommandReceiver + ?Sized>(
    mut stream: TcpStream,
    peer: SocketAddr,
    receiver: &R,
    cfg: &ServerConfig,
) -> Result<usize, ConnError> {
    let mut decoder = FrameDecoder::new(cfg.max_frame);
    let mut chunk = vec![0u8; cfg.read_chunk.max(1)];
    let mut frames = 0;

    loop {
        let n = match cfg.read_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.read(&mut chunk))
                .await
                .map_err(|_| ConnError::Idle(limit))??,
            None => stream.read(&mut chunk).await?,
        };
        if n == 0 {
            break;
        }
        decoder.push(&chunk[..n]);

        while let Some(body) = decoder.next_frame()? {
            match wire::decode_body::<Value>(&body) {
                Ok(message) => {
                    frames += 1;
                    receiver.receive(message, peer).await;
                }
                Err(e) => warn!(target: "rapd.net.server", %peer, error = %e, "frame rejected"),
            }
        }
    }

    if decoder.discarded() > 0 {
        debug!(target: "rapd.net.server", %peer, bytes = decoder.discarded(), "bytes outside frames ignored");
    }
    if decoder.in_frame() {
        warn!(target: "rapd.net.server", %peer, bytes = decoder.buffered(), "connection closed mid-frame");
    }
    Ok(frames)
}

/// Handle to a spawned accept loop.
pub struct ServerHandle {
    token: CancellationToken,
    join: JoinHandle<Result<(), ServerError>>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the accept loop to stop. Returns immediately.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Wait for the accept loop to exit.
    pub async fn join(self) -> Result<(), ServerError> {
        self.join.await?
    }

    /// Stop and wait.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.stop();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    async fn start(cfg: ServerConfig) -> (ServerHandle, mpsc::Receiver<Received>) {
        let (tx, rx) = mpsc::channel(16);
        let server = ControlServer::bind("127.0.0.1:0", cfg).await.unwrap();
        let handle = server.spawn(Arc::new(tx), CancellationToken::new()).unwrap();
        (handle, rx)
    }

    #[tokio::test]
    async fn every_frame_on_a_connection_is_delivered() {
        let (handle, mut rx) = start(ServerConfig::default()).await;
        let mut conn = TcpStream::connect(handle.local_addr()).await.unwrap();
        conn.write_all(b"noise<rapd_start>{\"n\":1}<rapd_end><rapd_start>{\"n\":2}<rapd_end>")
            .await
            .unwrap();
        conn.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message, serde_json::json!({"n": 1}));
        assert_eq!(rx.recv().await.unwrap().message, serde_json::json!({"n": 2}));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bad_json_does_not_stop_the_connection() {
        let (handle, mut rx) = start(ServerConfig::default()).await;
        let mut conn = TcpStream::connect(handle.local_addr()).await.unwrap();
        conn.write_all(b"<rapd_start>{oops<rapd_end><rapd_start>[1]<rapd_end>").await.unwrap();
        conn.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message, serde_json::json!([1]));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let cfg = ServerConfig {
            read_timeout: Some(Duration::from_millis(50)),
            ..ServerConfig::default()
        };
        let (handle, _rx) = start(cfg).await;
        let mut conn = TcpStream::connect(handle.local_addr()).await.unwrap();
        conn.write_all(b"<rapd_start>{").await.unwrap();

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), conn.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_closes_the_connection() {
        let cfg = ServerConfig {
            max_frame: 16,
            ..ServerConfig::default()
        };
        let (handle, mut rx) = start(cfg).await;
        let mut conn = TcpStream::connect(handle.local_addr()).await.unwrap();
        let _ = conn.write_all(format!("<rapd_start>\"{}\"<rapd_end>", "x".repeat(64)).as_bytes()).await;
        let _ = conn.shutdown().await;

        let mut conn = TcpStream::connect(handle.local_addr()).await.unwrap();
        conn.write_all(b"<rapd_start>2<rapd_end>").await.unwrap();
        conn.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message, serde_json::json!(2));
        handle.shutdown().await.unwrap();
    }

    #[test]
    fn default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.accept_timeout, Duration::from_secs(5));
        assert_eq!(cfg.read_chunk, 8192);
        assert_eq!(cfg.max_connections, 64);
    }
}
