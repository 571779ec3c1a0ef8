//! Chunked XChaCha20-Poly1305 payload encryption
//!
//! Stored chunk format (both modes):
//! ```text
//! [N bytes: ciphertext][16 bytes: Poly1305 tag]    N = 1 MiB except the last chunk
//! ```
//! Secure mode seals with a detached tag and feeds ciphertext and tag to a
//! running BLAKE3 digest that is checked after the last chunk. Fast mode
//! seals each chunk as a single AEAD call and keeps no digest.

use std::io::{Read, Write};
use std::time::Instant;

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::XChaCha20;
use chacha20poly1305::{
    aead::{Aead, AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};
use tracing::{debug, warn};
use zeroize::Zeroize;

use pcv_core::{CancelToken, PcvError, PcvResult, Progress, ProgressFn};

use crate::kdf::DerivedKey;
use crate::nonces::NonceTable;
use crate::{CHUNK_SIZE, DIGEST_SIZE, NONCE_SIZE, TAG_SIZE};

/// Bytes a full chunk occupies on disk
pub const STORED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

/// Number of chunks for a plaintext of `len` bytes; empty input has none.
pub fn chunk_count_for(len: u64) -> u64 {
    len.div_ceil(CHUNK_SIZE as u64)
}

/// Front-end hooks polled once per chunk boundary.
#[derive(Clone, Copy, Default)]
pub struct StreamHooks<'a> {
    pub progress: Option<&'a ProgressFn>,
    pub cancel: Option<&'a CancelToken>,
}

impl StreamHooks<'_> {
    fn check_cancel(&self) -> PcvResult<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(PcvError::Cancelled),
            _ => Ok(()),
        }
    }

    fn report(&self, progress: &Progress) {
        if let Some(cb) = self.progress {
            cb(progress);
        }
    }
}

/// Turns byte counts into progress snapshots with throughput and ETA.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    started: Instant,
    bytes_total: u64,
    chunk_count: u64,
}

impl ProgressTracker {
    pub fn new(bytes_total: u64, chunk_count: u64) -> Self {
        Self {
            started: Instant::now(),
            bytes_total,
            chunk_count,
        }
    }

    pub fn snapshot(&self, bytes_done: u64, chunks_done: u64) -> Progress {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.snapshot_at(bytes_done, chunks_done, elapsed)
    }

    pub fn snapshot_at(&self, bytes_done: u64, chunks_done: u64, elapsed_secs: f64) -> Progress {
        let fraction = if self.bytes_total == 0 {
            1.0
        } else {
            (bytes_done as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
        };
        let rate = if elapsed_secs > 0.0 {
            bytes_done as f64 / elapsed_secs
        } else {
            0.0
        };
        let remaining = self.bytes_total.saturating_sub(bytes_done) as f64;
        let eta_secs = if rate > 0.0 { remaining / rate } else { 0.0 };

        Progress {
            bytes_done,
            bytes_total: self.bytes_total,
            chunks_done,
            chunk_count: self.chunk_count,
            fraction,
            speed_mbps: rate / 1_000_000.0,
            eta_secs,
        }
    }
}

/// Result of streaming every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStats {
    pub chunks: u64,
    /// Plaintext bytes read (encrypt) or written (decrypt)
    pub bytes: u64,
    /// Chunks that failed authentication and were kept
    pub corrupted: u64,
    /// BLAKE3 over every stored chunk; all zero in fast mode
    pub digest: [u8; DIGEST_SIZE],
    pub digest_ok: bool,
}

impl ChunkStats {
    /// Enforce the whole-file digest after the last chunk: a mismatch is
    /// `IntegrityMismatch` unless corrupted output is being kept.
    pub fn verify_integrity(&self, keep_corrupted: bool) -> PcvResult<()> {
        if self.digest_ok {
            return Ok(());
        }
        if keep_corrupted {
            warn!(
                corrupted = self.corrupted,
                "integrity digest mismatch, output kept"
            );
            Ok(())
        } else {
            Err(PcvError::IntegrityMismatch)
        }
    }
}

/// Seals and opens the chunk stream under one derived key.
pub struct ChunkEngine<'k> {
    key: &'k DerivedKey,
    cipher: XChaCha20Poly1305,
    fast: bool,
}

impl<'k> ChunkEngine<'k> {
    pub fn new(key: &'k DerivedKey, fast: bool) -> Self {
        Self {
            key,
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            fast,
        }
    }

    pub fn is_fast(&self) -> bool {
        self.fast
    }

    /// Seal one chunk. Returns `ciphertext || tag`.
    pub fn seal_chunk(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> PcvResult<Vec<u8>> {
        let nonce = XNonce::from_slice(nonce);
        if self.fast {
            return self
                .cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| PcvError::Crypto(format!("chunk encryption failed: {e}")));
        }

        let mut sealed = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        sealed.extend_from_slice(plaintext);
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut sealed)
            .map_err(|e| PcvError::Crypto(format!("chunk encryption failed: {e}")))?;
        sealed.extend_from_slice(&tag);
        Ok(sealed)
    }

    /// Open one stored chunk (`ciphertext || tag`).
    pub fn open_chunk(
        &self,
        index: u64,
        nonce: &[u8; NONCE_SIZE],
        stored: &[u8],
    ) -> PcvResult<Vec<u8>> {
        if stored.len() < TAG_SIZE {
            return Err(PcvError::TruncatedInput(format!(
                "chunk {index} is {} bytes, shorter than its tag",
                stored.len()
            )));
        }
        let nonce = XNonce::from_slice(nonce);
        if self.fast {
            return self
                .cipher
                .decrypt(nonce, stored)
                .map_err(|_| PcvError::CorruptChunk { index });
        }

        let (ciphertext, tag) = stored.split_at(stored.len() - TAG_SIZE);
        let mut plaintext = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(nonce, b"", &mut plaintext, Tag::from_slice(tag))
            .map_err(|_| PcvError::CorruptChunk { index })?;
        Ok(plaintext)
    }

    /// Best-effort plaintext for a chunk whose tag did not verify: the raw
    /// XChaCha20 keystream from block 1, the same stream the AEAD uses.
    pub fn recover_chunk(&self, nonce: &[u8; NONCE_SIZE], stored: &[u8]) -> Vec<u8> {
        let ciphertext = &stored[..stored.len().saturating_sub(TAG_SIZE)];
        let mut plaintext = ciphertext.to_vec();
        let mut stream = XChaCha20::new(
            chacha20::Key::from_slice(self.key.as_bytes()),
            chacha20::XNonce::from_slice(nonce),
        );
        stream.seek(64u64);
        stream.apply_keystream(&mut plaintext);
        plaintext
    }

    /// Encrypt exactly `plaintext_len` bytes from `input`, drawing one nonce
    /// per chunk from `table`.
    pub fn encrypt<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        plaintext_len: u64,
        table: &mut NonceTable,
        hooks: StreamHooks<'_>,
    ) -> PcvResult<ChunkStats> {
        let chunk_count = chunk_count_for(plaintext_len);
        let tracker = ProgressTracker::new(plaintext_len, chunk_count);
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut done = 0u64;

        for index in 0..chunk_count {
            hooks.check_cancel()?;

            let len = (plaintext_len - done).min(CHUNK_SIZE as u64) as usize;
            input
                .read_exact(&mut buf[..len])
                .map_err(|e| PcvError::from_read(e, "plaintext"))?;

            let nonce = table.next_nonce();
            let sealed = self.seal_chunk(&nonce, &buf[..len])?;
            if !self.fast {
                hasher.update(&sealed);
            }
            output.write_all(&sealed)?;

            done += len as u64;
            debug!(index, len, "sealed chunk");
            hooks.report(&tracker.snapshot(done, index + 1));
        }
        buf.zeroize();

        if chunk_count == 0 {
            hooks.report(&tracker.snapshot(0, 0));
        }

        let digest = if self.fast {
            [0u8; DIGEST_SIZE]
        } else {
            *hasher.finalize().as_bytes()
        };
        Ok(ChunkStats {
            chunks: chunk_count,
            bytes: done,
            corrupted: 0,
            digest,
            digest_ok: true,
        })
    }

    /// Decrypt a `payload_len`-byte chunk stream, one chunk per table entry.
    ///
    /// Without `keep_corrupted` the first chunk that fails authentication
    /// aborts with `CorruptChunk`. With it, failing chunks are written
    /// best-effort and counted. The digest is compared but not enforced;
    /// see [`ChunkStats::verify_integrity`].
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        payload_len: u64,
        table: &NonceTable,
        keep_corrupted: bool,
        expected_digest: &[u8; DIGEST_SIZE],
        hooks: StreamHooks<'_>,
    ) -> PcvResult<ChunkStats> {
        let chunk_count = table.len() as u64;
        let plaintext_total = payload_len.saturating_sub(chunk_count * TAG_SIZE as u64);
        let tracker = ProgressTracker::new(plaintext_total, chunk_count);
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; STORED_CHUNK_SIZE];
        let mut remaining = payload_len;
        let mut done = 0u64;
        let mut corrupted = 0u64;

        for index in 0..chunk_count {
            hooks.check_cancel()?;

            let len = remaining.min(STORED_CHUNK_SIZE as u64) as usize;
            if len <= TAG_SIZE {
                return Err(PcvError::TruncatedInput(format!(
                    "chunk {index} is {len} bytes, expected ciphertext and tag"
                )));
            }
            input
                .read_exact(&mut buf[..len])
                .map_err(|e| PcvError::from_read(e, "chunk stream"))?;
            remaining -= len as u64;

            let stored = &buf[..len];
            if !self.fast {
                hasher.update(stored);
            }

            let nonce = table.get(index).ok_or(PcvError::CorruptNonceTable)?;
            let mut plaintext = match self.open_chunk(index, nonce, stored) {
                Ok(plaintext) => plaintext,
                Err(PcvError::CorruptChunk { .. }) if keep_corrupted => {
                    corrupted += 1;
                    warn!(index, "chunk failed authentication, keeping best-effort plaintext");
                    self.recover_chunk(nonce, stored)
                }
                Err(e) => return Err(e),
            };
            output.write_all(&plaintext)?;
            done += plaintext.len() as u64;
            plaintext.zeroize();

            debug!(index, len, "opened chunk");
            hooks.report(&tracker.snapshot(done, index + 1));
        }

        if remaining != 0 {
            return Err(PcvError::InvalidInput(format!(
                "{remaining} unexpected bytes after the last chunk"
            )));
        }
        if chunk_count == 0 {
            hooks.report(&tracker.snapshot(0, 0));
        }

        let (digest, digest_ok) = if self.fast {
            ([0u8; DIGEST_SIZE], true)
        } else {
            let digest = *hasher.finalize().as_bytes();
            (digest, digest == *expected_digest)
        };
        if !digest_ok {
            debug!(
                expected = %hex::encode(expected_digest),
                computed = %hex::encode(digest),
                "integrity digest differs"
            );
        }

        Ok(ChunkStats {
            chunks: chunk_count,
            bytes: done,
            corrupted,
            digest,
            digest_ok,
        })
    }
}
