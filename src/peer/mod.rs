mod handshake;
mod identity;
mod reader;
mod session;

pub use handshake::{Handshake, CONTENT_PREFIX_LEN, HANDSHAKE_LEN, PROTOCOL_STRING};
pub use identity::PeerIdentity;
pub use reader::{MessageReader, MESSAGE_BACKLOG};
pub use session::PeerSession;

// Peer relationship flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerState {
    /// Whether the peer is choking this client
    pub local_is_choked: bool,
    /// Whether this client is choking the peer
    pub remote_is_choked: bool,
    /// Whether this client is interested in the peer
    pub local_is_interested: bool,
    /// Whether the peer is interested in us
    pub remote_is_interested: bool,
}

impl Default for PeerState {
    fn default() -> Self {
        // peers start out mutually choked and uninterested
        Self {
            local_is_choked: true,
            remote_is_choked: true,
            local_is_interested: false,
            remote_is_interested: false,
        }
    }
}
