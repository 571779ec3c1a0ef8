use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ErrorKind;

/// File extension of a sealed container
pub const CONTAINER_EXTENSION: &str = "pcv";

/// Direction of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Encrypt,
    Decrypt,
}

impl Mode {
    /// Containers are recognised by their `.pcv` extension; anything else is plaintext.
    pub fn infer(input: &Path) -> Self {
        match input.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(CONTAINER_EXTENSION) => Mode::Decrypt,
            _ => Mode::Encrypt,
        }
    }

    /// Default output path: `x` → `x.pcv` when encrypting, `x.pcv` → `x` when decrypting.
    pub fn default_output(&self, input: &Path) -> PathBuf {
        match self {
            Mode::Encrypt => {
                let mut name = input.as_os_str().to_owned();
                name.push(".");
                name.push(CONTAINER_EXTENSION);
                PathBuf::from(name)
            }
            Mode::Decrypt => {
                if Mode::infer(input) == Mode::Decrypt {
                    input.with_extension("")
                } else {
                    let mut name = input.as_os_str().to_owned();
                    name.push(".out");
                    PathBuf::from(name)
                }
            }
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Encrypt => f.write_str("encrypt"),
            Mode::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Container flags. Stored as a 5-byte field; byte 0 is the fast-mode bit,
/// the rest are reserved and written as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub fast: bool,
}

impl Flags {
    pub const LEN: usize = 5;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = u8::from(self.fast);
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        Self { fast: bytes[0] == 1 }
    }
}

/// Per-chunk progress snapshot reported to the front end
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    /// Plaintext bytes processed so far
    pub bytes_done: u64,
    /// Plaintext bytes in the whole run
    pub bytes_total: u64,
    pub chunks_done: u64,
    pub chunk_count: u64,
    /// bytes_done / bytes_total, clamped to [0, 1]; 1.0 for an empty run
    pub fraction: f64,
    /// Throughput in MB/s (10^6 bytes)
    pub speed_mbps: f64,
    /// Estimated seconds remaining
    pub eta_secs: f64,
}

impl Progress {
    /// Human-readable status line, e.g. `Working at 412.07 MB/s (ETA: 3.2s)`
    pub fn status(&self) -> String {
        format!(
            "Working at {:.2} MB/s (ETA: {:.1}s)",
            self.speed_mbps, self.eta_secs
        )
    }

    pub fn percent(&self) -> String {
        format!("{:.2}%", self.fraction * 100.0)
    }
}

/// Progress callback, invoked once per chunk
pub type ProgressFn = Box<dyn Fn(&Progress) + Send + Sync>;

/// Cooperative cancellation flag, polled once per chunk boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary attached to a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: Option<Mode>,
    pub chunks: u64,
    /// Plaintext bytes read (encrypt) or written (decrypt)
    pub bytes: u64,
    /// Chunks that failed authentication but were kept
    pub corrupted_chunks: u64,
    /// False when a kept run finished with a whole-file digest mismatch
    pub digest_ok: bool,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.corrupted_chunks == 0 && self.digest_ok
    }
}

/// Terminal outcome of a pipeline run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Done(RunSummary),
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
