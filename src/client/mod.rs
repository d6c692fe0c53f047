use crate::error::Result;
use crate::peer::PeerSession;
use crate::welcomer::Welcomer;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Configuration for a swarm peer endpoint
pub struct EndpointConfig {
    /// Port the welcomer listens on for inbound peers
    pub listen_port: u16,
    /// Shared content identifier both handshake sides must reference
    pub content_id: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            listen_port: 6881,
            content_id: String::new(),
        }
    }
}

/// Owning-application side of the peer protocol: dials known peers,
/// admits inbound ones, and polls their sessions for decoded messages.
/// The swarm strategy layer (who to request what from) sits above this.
pub struct PeerEndpoint {
    config: EndpointConfig,
}

impl PeerEndpoint {
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    /// Actively connect to a known peer and complete the handshake
    pub async fn dial(&self, addr: SocketAddr) -> Result<PeerSession> {
        let mut session = PeerSession::new(addr);
        session.connect().await?;
        session.send_handshake(&self.config.content_id).await?;
        session.receive_handshake(&self.config.content_id).await?;

        info!(
            "Peer {} joined (id {})",
            session.identity(),
            hex::encode(session.identity().id())
        );
        Ok(session)
    }

    /// Promote an accepted connection to a full session: verify the
    /// initiator's handshake, then answer with our own
    pub async fn admit(&self, stream: TcpStream) -> Result<PeerSession> {
        let mut session = PeerSession::from_stream(stream)?;
        session.receive_handshake(&self.config.content_id).await?;
        session.send_handshake(&self.config.content_id).await?;

        info!(
            "Peer {} joined (id {})",
            session.identity(),
            hex::encode(session.identity().id())
        );
        Ok(session)
    }

    /// Accept inbound peers and poll their sessions until shut down
    pub async fn serve(&self) -> Result<()> {
        let mut welcomer = Welcomer::bind(self.config.listen_port).await?;
        welcomer.start();

        let mut sessions: Vec<PeerSession> = Vec::new();
        let mut poll = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    welcomer.stop();
                    return Ok(());
                }
                accepted = welcomer.recv_connection() => {
                    let Some(stream) = accepted else {
                        // welcomer stopped and the queue drained
                        return Ok(());
                    };
                    match self.admit(stream).await {
                        Ok(session) => sessions.push(session),
                        Err(e) => warn!("Rejected inbound peer: {}", e),
                    }
                }
                _ = poll.tick() => {
                    drain_messages(&mut sessions);
                }
            }
        }
    }
}

/// Pull every queued message out of every live session and drop the
/// sessions whose reader has stopped
fn drain_messages(sessions: &mut Vec<PeerSession>) {
    for session in sessions.iter_mut() {
        while let Some(message) = session.next_message() {
            info!(
                "Message from {}: {} byte payload",
                session.identity(),
                message.payload.len()
            );
        }
    }

    sessions.retain(|session| {
        if session.is_terminated() {
            info!("Peer {} disconnected", session.identity());
            false
        } else {
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn endpoint(content_id: &str) -> PeerEndpoint {
        PeerEndpoint::new(EndpointConfig {
            listen_port: 0,
            content_id: content_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_dial_and_admit_complete_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let admitting = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            endpoint("abc").admit(stream).await
        });

        let dialed = endpoint("abc").dial(addr).await;
        let admitted = admitting.await.unwrap();

        assert!(dialed.is_ok());
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn test_admit_rejects_wrong_content() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let admitting = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            endpoint("abc").admit(stream).await
        });

        let dialed = endpoint("xyz").dial(addr).await;
        let admitted = admitting.await.unwrap();

        assert!(dialed.is_err());
        assert!(admitted.is_err());
    }

    #[tokio::test]
    async fn test_admitted_session_receives_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let admitting = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            endpoint("abc").admit(stream).await.unwrap()
        });

        let mut dialed = endpoint("abc").dial(addr).await.unwrap();
        let mut admitted = admitting.await.unwrap();

        dialed.write(&Message::new(vec![42]).encode()).await;

        let mut received = None;
        for _ in 0..100 {
            if let Some(message) = admitted.next_message() {
                received = Some(message);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.unwrap().payload, vec![42]);
    }
}
