use crate::error::{PeerWireError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded wait on each accept so the stop signal is observed between
/// attempts
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Background worker that accepts inbound peer connections and hands
/// them to the owning application through a pending-connections queue.
///
/// Accept never blocks on application processing: accepted streams go
/// into an unbounded queue and wait there to be promoted to sessions.
pub struct Welcomer {
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    pending_tx: Option<mpsc::UnboundedSender<TcpStream>>,
    pending: mpsc::UnboundedReceiver<TcpStream>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Welcomer {
    /// Bind the welcome socket
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            PeerWireError::Peer(format!(
                "Failed to bind welcome socket on port {}: {}",
                port, e
            ))
        })?;
        let local_addr = listener.local_addr()?;
        info!("Listening for peers on port {}", local_addr.port());

        let (pending_tx, pending) = mpsc::unbounded_channel();
        Ok(Self {
            local_addr,
            listener: Some(listener),
            pending_tx: Some(pending_tx),
            pending,
            cancel: CancellationToken::new(),
            worker: None,
        })
    }

    /// Start the accept loop on its own task
    pub fn start(&mut self) {
        let (Some(listener), Some(pending_tx)) = (self.listener.take(), self.pending_tx.take())
        else {
            return;
        };
        let cancel = self.cancel.clone();
        self.worker = Some(tokio::spawn(accept_loop(listener, pending_tx, cancel)));
    }

    /// Request the accept loop to stop
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking removal of the next pending connection
    pub fn next_connection(&mut self) -> Option<TcpStream> {
        self.pending.try_recv().ok()
    }

    /// Wait for the next pending connection; None once the worker has
    /// stopped and the queue is drained
    pub async fn recv_connection(&mut self) -> Option<TcpStream> {
        self.pending.recv().await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Welcomer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    pending: mpsc::UnboundedSender<TcpStream>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Welcomer stopped");
                return;
            }
            accepted = timeout(ACCEPT_TIMEOUT, listener.accept()) => match accepted {
                Ok(Ok((stream, addr))) => {
                    debug!("Accepted connection from {}", addr);
                    if pending.send(stream).is_err() {
                        debug!("Pending-connections queue closed");
                        return;
                    }
                }
                Ok(Err(e)) => {
                    // a single failed accept never takes the worker down
                    warn!("Accept failed: {}", e);
                }
                Err(_) => {
                    // timed out with no connection attempt, go around
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_accepted_connection_reaches_pending_queue() {
        let mut welcomer = Welcomer::bind(0).await.unwrap();
        let port = welcomer.local_addr().port();
        welcomer.start();

        let _client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

        let accepted = welcomer.recv_connection().await;
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn test_connections_queue_in_order_without_consumer() {
        let mut welcomer = Welcomer::bind(0).await.unwrap();
        let port = welcomer.local_addr().port();
        welcomer.start();

        let _first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let _second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

        assert!(welcomer.recv_connection().await.is_some());
        assert!(welcomer.recv_connection().await.is_some());
        assert!(welcomer.next_connection().is_none());
    }

    #[tokio::test]
    async fn test_stop_terminates_worker() {
        let mut welcomer = Welcomer::bind(0).await.unwrap();
        welcomer.start();
        let worker = welcomer.worker.take().unwrap();

        welcomer.stop();

        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
