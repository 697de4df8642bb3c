#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("handshake with peer failed after exhausting retries")]
    HandshakeFailed,

    #[error("segment {seq} exceeded its retry budget")]
    RetryExhausted { seq: u32 },

    #[error("END exchange failed after exhausting retries")]
    EndFailed,

    #[error("size mismatch: expected {expected} bytes, received {received}")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("zero-length transfer is not supported")]
    EmptyTransfer,
}
