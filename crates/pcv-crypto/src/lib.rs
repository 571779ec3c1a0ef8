//! pcv-crypto: the sealed container format
//!
//! A container is one file recoverable only with the password it was sealed
//! under:
//! ```text
//! version(5) | metadata length(10, decimal) | metadata (raw) | flags(5)
//! salt(16) | header nonce(24) | key fingerprint(64) | digest(32)
//! nonce table (24 × chunks) | nonce-table tag(16)
//! chunk 0 (ciphertext || tag) | chunk 1 | ...
//! ```
//! Every fixed-size field is stored through the Reed-Solomon field codec
//! (k data bytes + 128 parity bytes). Metadata is stored raw and is not
//! authenticated.
//!
//! Key: Argon2id(password, salt) → 256-bit key, verified with a SHA3-512
//! fingerprint before any plaintext is produced. Chunks are 1 MiB of
//! plaintext sealed with XChaCha20-Poly1305 under a fresh random nonce; the
//! nonces are themselves sealed as one unit under the header nonce.

pub mod container;
pub mod fec;
pub mod kdf;
pub mod nonces;
pub mod stream;

pub use container::{ContainerEncryptor, ContainerInfo, Header, Layout, OpenedContainer};
pub use fec::{Decoded, FecError, Field, FieldCodec, FieldCodecs};
pub use kdf::{derive_key, fingerprint, verify_fingerprint, DerivedKey, KdfParams};
pub use nonces::{NonceTable, SealedNonceTable};
pub use stream::{ChunkEngine, ChunkStats, ProgressTracker, StreamHooks};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the Argon2id salt
pub const SALT_SIZE: usize = 16;

/// Size of the SHA3-512 key fingerprint
pub const FINGERPRINT_SIZE: usize = 64;

/// Size of the BLAKE3 whole-file digest
pub const DIGEST_SIZE: usize = 32;

/// Plaintext bytes per chunk (the last chunk may be shorter)
pub const CHUNK_SIZE: usize = 1 << 20;

/// Parity bytes appended to every coded header field
pub const PARITY_SHARDS: usize = 128;

/// Format version tag written at offset 0
pub const FORMAT_VERSION: &[u8; 5] = b"pcv-1";
