use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerWireError {
    #[error("Peer connection error: {0}")]
    Peer(String),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Framing error: {0}")]
    Frame(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerWireError>;
