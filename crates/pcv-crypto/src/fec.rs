//! Byte-level Reed-Solomon coding for fixed-size header fields
//!
//! Each payload byte is one data shard of length 1 over GF(2^8), followed by
//! 128 parity shards:
//! ```text
//! [k bytes: payload][128 bytes: parity]
//! ```
//! The code has minimum distance 129, so any 128 bytes at known positions
//! can be rebuilt. Bytes corrupted at unknown positions are located by
//! trial erasure: a single bad byte is found and repaired, anything more is
//! reported as unrecoverable.

use reed_solomon_erasure::galois_8::ReedSolomon;
use thiserror::Error;
use tracing::warn;

use pcv_core::{PcvError, PcvResult};

use crate::PARITY_SHARDS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FecError {
    #[error("coded field is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("erasure position {position} is outside the {len}-byte field")]
    ErasureOutOfRange { position: usize, len: usize },

    #[error("field cannot be reconstructed")]
    Unrecoverable,

    #[error("reed-solomon: {0}")]
    Codec(String),
}

fn codec_err(e: reed_solomon_erasure::Error) -> FecError {
    FecError::Codec(format!("{e:?}"))
}

/// Result of decoding one coded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub data: Vec<u8>,
    /// Coded bytes (payload or parity) that differed from the repaired codeword
    pub repaired: usize,
}

impl Decoded {
    pub fn is_repaired(&self) -> bool {
        self.repaired > 0
    }
}

/// Codec for one payload size `k`: `k` bytes in, `k + 128` bytes out.
pub struct FieldCodec {
    data_len: usize,
    rs: ReedSolomon,
}

impl FieldCodec {
    pub fn new(data_len: usize) -> Result<Self, FecError> {
        let rs = ReedSolomon::new(data_len, PARITY_SHARDS).map_err(codec_err)?;
        Ok(Self { data_len, rs })
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn encoded_len(&self) -> usize {
        self.data_len + PARITY_SHARDS
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, FecError> {
        if data.len() != self.data_len {
            return Err(FecError::LengthMismatch {
                expected: self.data_len,
                actual: data.len(),
            });
        }
        let mut shards: Vec<Vec<u8>> = data
            .iter()
            .map(|&b| vec![b])
            .chain(std::iter::repeat_with(|| vec![0u8]).take(PARITY_SHARDS))
            .collect();
        self.rs.encode(&mut shards).map_err(codec_err)?;
        Ok(shards.into_iter().flatten().collect())
    }

    /// Decode a field whose corrupted positions (if any) are unknown.
    ///
    /// A consistent codeword is returned untouched. Otherwise every position
    /// is tried as an erasure; with distance 129 at most one trial can yield
    /// a consistent codeword, and only when exactly one byte was wrong.
    pub fn decode(&self, coded: &[u8]) -> Result<Decoded, FecError> {
        self.check_len(coded)?;
        let shards: Vec<Vec<u8>> = coded.iter().map(|&b| vec![b]).collect();

        if self.rs.verify(&shards).map_err(codec_err)? {
            return Ok(Decoded {
                data: coded[..self.data_len].to_vec(),
                repaired: 0,
            });
        }

        for position in 0..coded.len() {
            let mut trial: Vec<Option<Vec<u8>>> = shards.iter().cloned().map(Some).collect();
            trial[position] = None;
            if let Some(codeword) = self.rebuild(trial)? {
                return Ok(self.finish(coded, codeword));
            }
        }
        Err(FecError::Unrecoverable)
    }

    /// Decode a field with bytes at known positions marked as erased.
    /// Up to 128 erasures are rebuilt; the remaining bytes must be intact.
    pub fn decode_with_erasures(
        &self,
        coded: &[u8],
        erasures: &[usize],
    ) -> Result<Decoded, FecError> {
        self.check_len(coded)?;
        let mut trial: Vec<Option<Vec<u8>>> = coded.iter().map(|&b| Some(vec![b])).collect();
        for &position in erasures {
            let slot = trial.get_mut(position).ok_or(FecError::ErasureOutOfRange {
                position,
                len: coded.len(),
            })?;
            *slot = None;
        }

        let erased = trial.iter().filter(|s| s.is_none()).count();
        if erased > PARITY_SHARDS {
            return Err(FecError::Unrecoverable);
        }

        match self.rebuild(trial)? {
            Some(codeword) => Ok(self.finish(coded, codeword)),
            None => Err(FecError::Unrecoverable),
        }
    }

    fn check_len(&self, coded: &[u8]) -> Result<(), FecError> {
        if coded.len() != self.encoded_len() {
            return Err(FecError::LengthMismatch {
                expected: self.encoded_len(),
                actual: coded.len(),
            });
        }
        Ok(())
    }

    /// Fill the erased shards, then accept the result only if every parity
    /// byte agrees with it.
    fn rebuild(&self, mut shards: Vec<Option<Vec<u8>>>) -> Result<Option<Vec<u8>>, FecError> {
        self.rs.reconstruct(&mut shards).map_err(codec_err)?;
        let Some(full) = shards.into_iter().collect::<Option<Vec<Vec<u8>>>>() else {
            return Ok(None);
        };
        if !self.rs.verify(&full).map_err(codec_err)? {
            return Ok(None);
        }
        Ok(Some(full.into_iter().flatten().collect()))
    }

    fn finish(&self, coded: &[u8], codeword: Vec<u8>) -> Decoded {
        let repaired = coded.iter().zip(&codeword).filter(|(a, b)| a != b).count();
        let mut data = codeword;
        data.truncate(self.data_len);
        Decoded { data, repaired }
    }
}

/// The fixed-size fields of a container, each with its own payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Version,
    MetadataLength,
    Flags,
    Salt,
    HeaderNonce,
    Fingerprint,
    Digest,
    NonceGroup,
    TableTag,
}

impl Field {
    pub const fn payload_len(self) -> usize {
        match self {
            Field::Version | Field::Flags => 5,
            Field::MetadataLength => 10,
            Field::Salt | Field::TableTag => 16,
            Field::HeaderNonce | Field::NonceGroup => 24,
            Field::Digest => 32,
            Field::Fingerprint => 64,
        }
    }

    pub const fn encoded_len(self) -> usize {
        self.payload_len() + PARITY_SHARDS
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::Version => "version",
            Field::MetadataLength => "metadata length",
            Field::Flags => "flags",
            Field::Salt => "salt",
            Field::HeaderNonce => "header nonce",
            Field::Fingerprint => "key fingerprint",
            Field::Digest => "integrity digest",
            Field::NonceGroup => "nonce table",
            Field::TableTag => "nonce table tag",
        }
    }
}

/// One codec per distinct payload size, built once per run.
pub struct FieldCodecs {
    k5: FieldCodec,
    k10: FieldCodec,
    k16: FieldCodec,
    k24: FieldCodec,
    k32: FieldCodec,
    k64: FieldCodec,
}

impl FieldCodecs {
    pub fn new() -> PcvResult<Self> {
        let build = |k| FieldCodec::new(k).map_err(|e| PcvError::Crypto(e.to_string()));
        Ok(Self {
            k5: build(5)?,
            k10: build(10)?,
            k16: build(16)?,
            k24: build(24)?,
            k32: build(32)?,
            k64: build(64)?,
        })
    }

    pub fn codec(&self, field: Field) -> &FieldCodec {
        match field.payload_len() {
            5 => &self.k5,
            10 => &self.k10,
            16 => &self.k16,
            24 => &self.k24,
            32 => &self.k32,
            _ => &self.k64,
        }
    }

    pub fn encode(&self, field: Field, data: &[u8]) -> PcvResult<Vec<u8>> {
        self.codec(field)
            .encode(data)
            .map_err(|e| PcvError::Crypto(format!("encoding {}: {e}", field.name())))
    }

    /// Decode one field, logging any repair. Nonce-table fields fail as
    /// `CorruptNonceTable`, every other field as `CorruptHeaderField`.
    pub fn decode(&self, field: Field, coded: &[u8]) -> PcvResult<Vec<u8>> {
        self.report(field, self.codec(field).decode(coded))
    }

    /// Decode one field whose damaged byte positions are already known,
    /// e.g. a sector that read back as zeros. Up to 128 positions are rebuilt.
    pub fn decode_with_erasures(
        &self,
        field: Field,
        coded: &[u8],
        erasures: &[usize],
    ) -> PcvResult<Vec<u8>> {
        self.report(field, self.codec(field).decode_with_erasures(coded, erasures))
    }

    fn report(&self, field: Field, result: Result<Decoded, FecError>) -> PcvResult<Vec<u8>> {
        match result {
            Ok(decoded) => {
                if decoded.is_repaired() {
                    warn!(
                        field = field.name(),
                        repaired = decoded.repaired,
                        "repaired corrupted header field"
                    );
                }
                Ok(decoded.data)
            }
            Err(e) => {
                warn!(field = field.name(), error = %e, "header field unrecoverable");
                Err(match field {
                    Field::NonceGroup | Field::TableTag => PcvError::CorruptNonceTable,
                    _ => PcvError::CorruptHeaderField { field: field.name() },
                })
            }
        }
    }
}
