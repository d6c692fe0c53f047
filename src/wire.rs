use crate::error::{PeerWireError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the big-endian length prefix on every frame
pub const LENGTH_PREFIX_LEN: usize = 4;

/// One framed wire message: the declared payload length and the payload
/// itself. Payload structure is the concern of the layer above; this
/// codec only guarantees the framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            length: payload.len() as u32,
            payload,
        }
    }

    /// Build from a declared length and payload taken as-is. Used by the
    /// reader when a stream ends mid-frame and the two legitimately
    /// disagree.
    pub(crate) fn from_parts(length: u32, payload: Vec<u8>) -> Self {
        Self { length, payload }
    }

    /// Serialize to the wire format: <length prefix><payload>
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Deserialize from the wire format, validating the declared length
    /// against the bytes actually supplied
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < LENGTH_PREFIX_LEN {
            return Err(PeerWireError::Frame(
                "Frame shorter than length prefix".to_string(),
            ));
        }

        let length = data.get_u32();

        if data.len() != length as usize {
            return Err(PeerWireError::Frame(format!(
                "Declared length {} but payload has {} bytes",
                length,
                data.len()
            )));
        }

        Ok(Self {
            length,
            payload: data.to_vec(),
        })
    }
}

/// Read exactly `buf.len()` bytes, looping on partial reads.
///
/// Returns the number of bytes obtained, which is short only if the
/// stream ended first. Both the handshake and the frame reader go
/// through here.
pub async fn read_fully<R>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0;
    while total < buf.len() {
        let n = stream.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
