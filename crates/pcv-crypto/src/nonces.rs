//! Per-chunk nonce table
//!
//! Encryption draws one random 24-byte nonce per chunk. After the last chunk
//! the concatenated nonces are sealed as one unit under the container key and
//! the header nonce:
//! ```text
//! [152 bytes: coded nonce 0] ... [152 bytes: coded nonce n-1][144 bytes: coded tag]
//! ```

use std::collections::HashSet;

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use pcv_core::{PcvError, PcvResult};

use crate::fec::{Field, FieldCodecs};
use crate::kdf::DerivedKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Ordered chunk nonces; index `i` belongs to chunk `i`.
#[derive(Debug, Clone, Default)]
pub struct NonceTable {
    nonces: Vec<[u8; NONCE_SIZE]>,
    /// Nonces already handed out under this key, including the header nonce
    issued: HashSet<[u8; NONCE_SIZE]>,
}

impl NonceTable {
    /// Empty table for an encryption run. The header nonce is reserved so no
    /// chunk can reuse it.
    pub fn for_encryption(chunk_count: u64, header_nonce: &[u8; NONCE_SIZE]) -> Self {
        let capacity = usize::try_from(chunk_count).unwrap_or(0);
        let mut issued = HashSet::with_capacity(capacity + 1);
        issued.insert(*header_nonce);
        Self {
            nonces: Vec::with_capacity(capacity),
            issued,
        }
    }

    /// Draw a fresh random nonce, record it, and return it.
    pub fn next_nonce(&mut self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        loop {
            OsRng.fill_bytes(&mut nonce);
            if self.issued.insert(nonce) {
                break;
            }
        }
        self.nonces.push(nonce);
        nonce
    }

    pub fn get(&self, index: u64) -> Option<&[u8; NONCE_SIZE]> {
        usize::try_from(index).ok().and_then(|i| self.nonces.get(i))
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8; NONCE_SIZE]> {
        self.nonces.iter()
    }

    /// Seal the table with a detached tag under the key and header nonce.
    pub fn seal(
        &self,
        key: &DerivedKey,
        header_nonce: &[u8; NONCE_SIZE],
    ) -> PcvResult<SealedNonceTable> {
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let mut ciphertext: Vec<u8> = self.nonces.iter().flatten().copied().collect();
        let tag = cipher
            .encrypt_in_place_detached(XNonce::from_slice(header_nonce), b"", &mut ciphertext)
            .map_err(|e| PcvError::Crypto(format!("nonce table sealing failed: {e}")))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);
        Ok(SealedNonceTable {
            ciphertext,
            tag: tag_bytes,
        })
    }

    /// Open a sealed table. Any authentication failure is `CorruptNonceTable`.
    pub fn open(
        sealed: &SealedNonceTable,
        key: &DerivedKey,
        header_nonce: &[u8; NONCE_SIZE],
    ) -> PcvResult<Self> {
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let mut plaintext = sealed.ciphertext.clone();
        cipher
            .decrypt_in_place_detached(
                XNonce::from_slice(header_nonce),
                b"",
                &mut plaintext,
                Tag::from_slice(&sealed.tag),
            )
            .map_err(|_| PcvError::CorruptNonceTable)?;

        let nonces = plaintext
            .chunks_exact(NONCE_SIZE)
            .map(|group| {
                let mut nonce = [0u8; NONCE_SIZE];
                nonce.copy_from_slice(group);
                nonce
            })
            .collect();
        Ok(Self {
            nonces,
            issued: HashSet::new(),
        })
    }
}

/// The table as stored: ciphertext (24 bytes per chunk) and its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedNonceTable {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl SealedNonceTable {
    /// Bytes the coded table occupies for `chunk_count` chunks.
    pub fn encoded_len(chunk_count: u64) -> u64 {
        chunk_count * Field::NonceGroup.encoded_len() as u64 + Field::TableTag.encoded_len() as u64
    }

    pub fn chunk_count(&self) -> u64 {
        (self.ciphertext.len() / NONCE_SIZE) as u64
    }

    pub fn encode(&self, codecs: &FieldCodecs) -> PcvResult<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::encoded_len(self.chunk_count()) as usize);
        for group in self.ciphertext.chunks_exact(NONCE_SIZE) {
            out.extend_from_slice(&codecs.encode(Field::NonceGroup, group)?);
        }
        out.extend_from_slice(&codecs.encode(Field::TableTag, &self.tag)?);
        Ok(out)
    }

    /// Decode the coded region of a container holding `chunk_count` chunks.
    pub fn decode(bytes: &[u8], chunk_count: u64, codecs: &FieldCodecs) -> PcvResult<Self> {
        if bytes.len() as u64 != Self::encoded_len(chunk_count) {
            return Err(PcvError::CorruptNonceTable);
        }
        let (groups, coded_tag) = bytes.split_at(bytes.len() - Field::TableTag.encoded_len());

        let mut ciphertext = Vec::with_capacity(chunk_count as usize * NONCE_SIZE);
        for coded in groups.chunks_exact(Field::NonceGroup.encoded_len()) {
            ciphertext.extend_from_slice(&codecs.decode(Field::NonceGroup, coded)?);
        }

        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&codecs.decode(Field::TableTag, coded_tag)?);
        Ok(Self { ciphertext, tag })
    }
}
