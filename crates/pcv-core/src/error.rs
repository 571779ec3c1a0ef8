use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PcvResult<T> = Result<T, PcvError>;

#[derive(Debug, Error)]
pub enum PcvError {
    /// Recomputed key fingerprint differs from the stored one.
    #[error("incorrect password")]
    WrongPassword,

    /// A redundancy-coded header field could not be reconstructed.
    #[error("header field '{field}' is damaged beyond repair")]
    CorruptHeaderField { field: &'static str },

    #[error("nonce table failed authentication")]
    CorruptNonceTable,

    #[error("chunk {index} failed authentication")]
    CorruptChunk { index: u64 },

    /// Every chunk verified but the whole-file digest did not match.
    #[error("integrity digest mismatch: the container is damaged or was modified")]
    IntegrityMismatch,

    #[error("truncated input: {0}")]
    TruncatedInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    /// Cooperative cancellation observed at a chunk boundary. Not a failure:
    /// the pipeline maps it to `Outcome::Cancelled`.
    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PcvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PcvError::WrongPassword => ErrorKind::WrongPassword,
            PcvError::CorruptHeaderField { .. } => ErrorKind::CorruptHeaderField,
            PcvError::CorruptNonceTable => ErrorKind::CorruptNonceTable,
            PcvError::CorruptChunk { .. } => ErrorKind::CorruptChunk,
            PcvError::IntegrityMismatch => ErrorKind::IntegrityMismatch,
            PcvError::TruncatedInput(_) => ErrorKind::TruncatedInput,
            PcvError::InvalidInput(_) => ErrorKind::InvalidInput,
            PcvError::Config(_) => ErrorKind::Config,
            PcvError::Crypto(_) => ErrorKind::Crypto,
            PcvError::Cancelled => ErrorKind::Cancelled,
            PcvError::Io(_) => ErrorKind::Io,
        }
    }

    /// Map a short read to `TruncatedInput`, keep every other I/O error as is.
    pub fn from_read(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            PcvError::TruncatedInput(format!("unexpected end of input while reading {what}"))
        } else {
            PcvError::Io(err)
        }
    }
}

/// Copyable discriminant of [`PcvError`], carried by `Outcome::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    WrongPassword,
    CorruptHeaderField,
    CorruptNonceTable,
    CorruptChunk,
    IntegrityMismatch,
    TruncatedInput,
    InvalidInput,
    Config,
    Crypto,
    Cancelled,
    Io,
    /// The worker thread panicked.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::WrongPassword => "wrong password",
            ErrorKind::CorruptHeaderField => "corrupt header field",
            ErrorKind::CorruptNonceTable => "corrupt nonce table",
            ErrorKind::CorruptChunk => "corrupt chunk",
            ErrorKind::IntegrityMismatch => "integrity mismatch",
            ErrorKind::TruncatedInput => "truncated input",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Config => "config",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "I/O",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}
