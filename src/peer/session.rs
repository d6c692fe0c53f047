use super::reader::{MessageReader, MESSAGE_BACKLOG};
use super::{Handshake, PeerIdentity, PeerState, CONTENT_PREFIX_LEN, HANDSHAKE_LEN};
use crate::bitfield;
use crate::error::{PeerWireError, Result};
use crate::wire::{read_fully, Message};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Manages one connection to a remote peer: transport lifecycle,
/// handshake, the bounded message queue fed by this session's reader,
/// and the per-peer piece state used to drive exchange.
///
/// A session is driven by a single owning task. Any handshake mismatch,
/// connection failure, or reader desynchronization is terminal for this
/// session; the swarm layer decides whether to retry with a fresh one.
pub struct PeerSession {
    identity: PeerIdentity,
    stream: Option<TcpStream>,
    writer: Option<OwnedWriteHalf>,
    messages: Option<mpsc::Receiver<Message>>,
    reader_cancel: Option<CancellationToken>,
    reader_finished: bool,
    remote_bitfield: Option<Vec<bool>>,
    /// Choke/interest relationship flags, driven by the owning task
    pub state: PeerState,
    /// Piece indices currently requested from this peer
    pub outstanding_requests: HashSet<u32>,
}

impl PeerSession {
    /// Session for a peer known by address, before any network I/O.
    /// Call `connect` to open the transport.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            identity: PeerIdentity::new(addr),
            stream: None,
            writer: None,
            messages: None,
            reader_cancel: None,
            reader_finished: false,
            remote_bitfield: None,
            state: PeerState::default(),
            outstanding_requests: HashSet::new(),
        }
    }

    /// Session for a peer received off the welcome socket
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let addr = stream.peer_addr()?;
        let mut session = Self::new(addr);
        session.stream = Some(stream);
        Ok(session)
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Open the transport connection to the peer
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to peer: {}", self.identity);

        let stream = TcpStream::connect(self.identity.addr()).await.map_err(|e| {
            PeerWireError::Peer(format!("Failed to connect to {}: {}", self.identity, e))
        })?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Build and write the fixed 68-byte handshake frame
    pub async fn send_handshake(&mut self, content_id: &str) -> Result<()> {
        let frame = Handshake::for_content(content_id, self.identity.id()).to_bytes();
        self.write_all(&frame).await.map_err(|e| {
            PeerWireError::Peer(format!("Failed to send handshake to {}: {}", self.identity, e))
        })?;

        debug!("Sent handshake to {}", self.identity);
        Ok(())
    }

    /// Read the remote handshake, verify it references the same shared
    /// content, and on success start this session's reader.
    ///
    /// Only the first 48 bytes are compared; the trailing 20 bytes carry
    /// the remote peer's self-asserted identifier, which is never
    /// validated. Failure is terminal for this session.
    pub async fn receive_handshake(&mut self, content_id: &str) -> Result<()> {
        let mut stream = self.stream.take().ok_or_else(|| {
            PeerWireError::Peer(format!("No open transport to {}", self.identity))
        })?;

        let mut frame = [0u8; HANDSHAKE_LEN];
        let read = read_fully(&mut stream, &mut frame).await?;
        if read < HANDSHAKE_LEN {
            return Err(PeerWireError::Handshake(format!(
                "Peer {} closed before completing handshake ({} of {} bytes)",
                self.identity, read, HANDSHAKE_LEN
            )));
        }

        let expected = Handshake::for_content(content_id, self.identity.id()).to_bytes();
        if frame[..CONTENT_PREFIX_LEN] != expected[..CONTENT_PREFIX_LEN] {
            return Err(PeerWireError::Handshake(format!(
                "Peer {} references different shared content",
                self.identity
            )));
        }

        info!("Handshake complete with {}", self.identity);

        // Handshake verified; hand the read half to a background reader
        // feeding this session's bounded queue.
        let (read_half, write_half) = stream.into_split();
        let (queue_tx, queue_rx) = mpsc::channel(MESSAGE_BACKLOG);
        let cancel = CancellationToken::new();
        MessageReader::new(read_half, queue_tx, cancel.clone()).spawn();

        self.writer = Some(write_half);
        self.messages = Some(queue_rx);
        self.reader_cancel = Some(cancel);

        Ok(())
    }

    /// Best-effort raw write with flush; failures are logged, not
    /// propagated
    pub async fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.write_all(bytes).await {
            warn!("Write to {} failed: {}", self.identity, e);
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).await?;
            writer.flush().await
        } else if let Some(stream) = self.stream.as_mut() {
            stream.write_all(bytes).await?;
            stream.flush().await
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, "transport not open"))
        }
    }

    /// Non-blocking removal of the oldest queued message. Returns None
    /// when no reader is active yet or the queue is currently empty;
    /// removing an item wakes a reader suspended on a full queue.
    pub fn next_message(&mut self) -> Option<Message> {
        let queue = self.messages.as_mut()?;
        match queue.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.reader_finished = true;
                None
            }
        }
    }

    /// True once this session's reader has stopped (clean close,
    /// desynchronization, or teardown) and the queue is drained
    pub fn is_terminated(&self) -> bool {
        self.reader_finished
    }

    pub fn bitfield(&self) -> Option<&[bool]> {
        self.remote_bitfield.as_deref()
    }

    /// Replace the peer's declared bitfield
    pub fn set_bitfield(&mut self, bits: Vec<bool>) {
        debug!("Bitfield from {}: {}", self.identity, bitfield::bit_string(&bits));
        self.remote_bitfield = Some(bits);
    }

    /// Mark a single piece as held by the peer
    pub fn mark_have(&mut self, index: usize) {
        if let Some(bits) = self.remote_bitfield.as_mut() {
            if index < bits.len() {
                bits[index] = true;
            }
        }
    }

    /// Pick a piece the peer holds and the local side lacks, uniformly
    /// at random. Spread across many sessions this approximates
    /// rarest-first demand. None if either bitfield is absent or no
    /// such piece exists.
    pub fn select_rare_piece(&self, local_bitfield: &[bool]) -> Option<usize> {
        let remote = self.remote_bitfield.as_ref()?;

        let candidates: Vec<usize> = remote
            .iter()
            .zip(local_bitfield)
            .enumerate()
            .filter(|&(_, (&remote_has, &local_has))| remote_has && !local_has)
            .map(|(i, _)| i)
            .collect();

        candidates.choose(&mut rand::thread_rng()).copied()
    }

    /// Tear the connection down and stop the reader. The session is not
    /// reusable afterwards.
    pub fn close(&mut self) {
        if let Some(cancel) = self.reader_cancel.take() {
            cancel.cancel();
        }
        self.stream = None;
        self.writer = None;
        self.messages = None;
        self.reader_finished = true;
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if let Some(cancel) = &self.reader_cancel {
            cancel.cancel();
        }
    }
}
