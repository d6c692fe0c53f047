use crate::hash::sha1_digest;

pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// Total size of a handshake frame
pub const HANDSHAKE_LEN: usize = 68;

/// Number of leading handshake bytes that identify the shared content.
/// The trailing 20 bytes carry the sender's own identifier and are not
/// compared on receive.
pub const CONTENT_PREFIX_LEN: usize = 48;

/// Handshake frame for the peer wire protocol
/// Format: <pstrlen><pstr><reserved><content digest><peer id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub content_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Build a handshake for the given content identifier. Both sides
    /// digest the identifier the same way, so the first 48 bytes come
    /// out identical whenever they share the same content.
    pub fn for_content(content_id: &str, peer_id: [u8; 20]) -> Self {
        Self {
            content_hash: sha1_digest(content_id),
            peer_id,
        }
    }

    /// Serialize to the fixed 68-byte wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_LEN);

        // Protocol string length
        buf.push(PROTOCOL_STRING.len() as u8);

        // Protocol string
        buf.extend_from_slice(PROTOCOL_STRING);

        // Reserved bytes (8 bytes, all zeros)
        buf.extend_from_slice(&[0u8; 8]);

        // Content digest
        buf.extend_from_slice(&self.content_hash);

        // Peer ID
        buf.extend_from_slice(&self.peer_id);

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let handshake = Handshake::for_content("abc", [2u8; 20]);
        let bytes = handshake.to_bytes();

        assert_eq!(bytes.len(), HANDSHAKE_LEN);
        assert_eq!(bytes[0], 19); // pstrlen
        assert_eq!(&bytes[1..20], PROTOCOL_STRING);
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..48], &handshake.content_hash);
        assert_eq!(&bytes[48..68], &[2u8; 20]);
    }

    #[test]
    fn test_content_prefix_is_peer_independent() {
        let a = Handshake::for_content("abc", [1u8; 20]).to_bytes();
        let b = Handshake::for_content("abc", [9u8; 20]).to_bytes();

        assert_eq!(&a[..CONTENT_PREFIX_LEN], &b[..CONTENT_PREFIX_LEN]);
        assert_ne!(&a[CONTENT_PREFIX_LEN..], &b[CONTENT_PREFIX_LEN..]);
    }

    #[test]
    fn test_content_digest_differs_by_content() {
        let a = Handshake::for_content("abc", [1u8; 20]).to_bytes();
        let b = Handshake::for_content("abd", [1u8; 20]).to_bytes();

        assert_ne!(&a[..CONTENT_PREFIX_LEN], &b[..CONTENT_PREFIX_LEN]);
    }
}
