//! Container layout: assembling and parsing the whole file
//!
//! ```text
//! offset                      field                 payload   stored
//! 0                           version               5         133
//! 133                         metadata length       10        138
//! 271                         metadata              m         m (raw)
//! 271 + m                     flags                 5         133
//! 404 + m                     salt                  16        144
//! 548 + m                     header nonce          24        152
//! 700 + m                     key fingerprint       64        192
//! 892 + m                     integrity digest      32        160
//! 1052 + m                    nonce table           24n       152n
//! 1052 + m + 152n             nonce-table tag       16        144
//! 1196 + m + 152n             chunks                ...       plaintext + 16n
//! ```
//! Encryption writes zero placeholders for the fingerprint, digest and
//! nonce table, streams the chunks, then seeks back and fills them in.

use std::io::{self, Read, Seek, SeekFrom, Write};

use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::{debug, info, warn};

use pcv_core::{Flags, PcvError, PcvResult};

use crate::fec::{Field, FieldCodecs};
use crate::kdf::{fingerprint, verify_fingerprint, DerivedKey};
use crate::nonces::{NonceTable, SealedNonceTable};
use crate::stream::{chunk_count_for, ChunkEngine, ChunkStats, StreamHooks, STORED_CHUNK_SIZE};
use crate::{DIGEST_SIZE, FINGERPRINT_SIZE, FORMAT_VERSION, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Container bytes that do not depend on metadata or chunk count
pub const FIXED_OVERHEAD: u64 = 1196;

/// Largest metadata the 10-digit length field can describe
pub const MAX_METADATA_LEN: u64 = 9_999_999_999;

/// Coded nonce plus chunk tag
const PER_CHUNK_OVERHEAD: u64 = (Field::NonceGroup.encoded_len() + TAG_SIZE) as u64;

/// Byte offsets and lengths of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub metadata_len: u64,
    pub chunk_count: u64,
    /// Bytes of the chunk stream (ciphertext and tags)
    pub payload_len: u64,
}

impl Layout {
    pub fn for_plaintext(metadata_len: u64, plaintext_len: u64) -> Self {
        let chunk_count = chunk_count_for(plaintext_len);
        Self {
            metadata_len,
            chunk_count,
            payload_len: plaintext_len + chunk_count * TAG_SIZE as u64,
        }
    }

    /// Recover the layout from the file size. Every chunk but the last holds
    /// a full 1 MiB, so the chunk count is `ceil(rest / (1 MiB + 168))`.
    ///
    /// The last chunk's length is not stored anywhere, so a container cut
    /// short inside its last chunk still parses. It is only caught later,
    /// as `CorruptChunk` on the last chunk. `TruncatedInput` covers sizes
    /// no container can have.
    pub fn from_container_len(container_len: u64, metadata_len: u64) -> PcvResult<Self> {
        let header_len = FIXED_OVERHEAD.saturating_add(metadata_len);
        if container_len < header_len {
            return Err(PcvError::TruncatedInput(format!(
                "container is {container_len} bytes, its header needs {header_len}"
            )));
        }

        let rest = container_len - header_len;
        let unit = STORED_CHUNK_SIZE as u64 + Field::NonceGroup.encoded_len() as u64;
        let chunk_count = rest.div_ceil(unit);
        if chunk_count > 0 && rest < (chunk_count - 1) * unit + PER_CHUNK_OVERHEAD + 1 {
            return Err(PcvError::TruncatedInput(format!(
                "{rest} bytes after the header do not form {chunk_count} whole chunks"
            )));
        }

        Ok(Self {
            metadata_len,
            chunk_count,
            payload_len: rest - chunk_count * Field::NonceGroup.encoded_len() as u64,
        })
    }

    pub fn fingerprint_offset(&self) -> u64 {
        (Field::Version.encoded_len()
            + Field::MetadataLength.encoded_len()
            + Field::Flags.encoded_len()
            + Field::Salt.encoded_len()
            + Field::HeaderNonce.encoded_len()) as u64
            + self.metadata_len
    }

    pub fn digest_offset(&self) -> u64 {
        self.fingerprint_offset() + Field::Fingerprint.encoded_len() as u64
    }

    pub fn table_offset(&self) -> u64 {
        self.digest_offset() + Field::Digest.encoded_len() as u64
    }

    pub fn table_len(&self) -> u64 {
        SealedNonceTable::encoded_len(self.chunk_count)
    }

    pub fn payload_offset(&self) -> u64 {
        self.table_offset() + self.table_len()
    }

    pub fn plaintext_len(&self) -> u64 {
        self.payload_len - self.chunk_count * TAG_SIZE as u64
    }

    pub fn container_len(&self) -> u64 {
        self.payload_offset() + self.payload_len
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: [u8; 5],
    /// Free-form, stored raw and not authenticated
    pub metadata: Vec<u8>,
    pub flags: Flags,
    pub salt: [u8; SALT_SIZE],
    pub header_nonce: [u8; NONCE_SIZE],
    pub fingerprint: [u8; FINGERPRINT_SIZE],
    pub digest: [u8; DIGEST_SIZE],
}

impl Header {
    pub fn version_supported(&self) -> bool {
        &self.version == FORMAT_VERSION
    }
}

/// Writes one container: prelude, chunk stream, then the back-patched fields.
pub struct ContainerEncryptor<'c> {
    codecs: &'c FieldCodecs,
    header: Header,
    layout: Layout,
    plaintext_len: u64,
    table: NonceTable,
    stats: Option<ChunkStats>,
}

impl<'c> ContainerEncryptor<'c> {
    /// Fresh random salt and header nonce for a `plaintext_len`-byte input.
    pub fn new(
        codecs: &'c FieldCodecs,
        metadata: Vec<u8>,
        fast: bool,
        plaintext_len: u64,
    ) -> PcvResult<Self> {
        let metadata_len = metadata.len() as u64;
        if metadata_len > MAX_METADATA_LEN {
            return Err(PcvError::InvalidInput(format!(
                "metadata is {metadata_len} bytes, the limit is {MAX_METADATA_LEN}"
            )));
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut header_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut header_nonce);

        let layout = Layout::for_plaintext(metadata_len, plaintext_len);
        Ok(Self {
            codecs,
            header: Header {
                version: *FORMAT_VERSION,
                metadata,
                flags: Flags { fast },
                salt,
                header_nonce,
                fingerprint: [0u8; FINGERPRINT_SIZE],
                digest: [0u8; DIGEST_SIZE],
            },
            layout,
            plaintext_len,
            table: NonceTable::for_encryption(layout.chunk_count, &header_nonce),
            stats: None,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn nonce_table(&self) -> &NonceTable {
        &self.table
    }

    /// Everything up to the first chunk, with zeroed fingerprint, digest and
    /// nonce-table region.
    pub fn write_prelude<W: Write>(&self, output: &mut W) -> PcvResult<()> {
        let h = &self.header;
        let metadata_len = format!("{:010}", self.layout.metadata_len);

        output.write_all(&self.codecs.encode(Field::Version, &h.version)?)?;
        output.write_all(&self.codecs.encode(Field::MetadataLength, metadata_len.as_bytes())?)?;
        output.write_all(&h.metadata)?;
        output.write_all(&self.codecs.encode(Field::Flags, &h.flags.to_bytes())?)?;
        output.write_all(&self.codecs.encode(Field::Salt, &h.salt)?)?;
        output.write_all(&self.codecs.encode(Field::HeaderNonce, &h.header_nonce)?)?;

        let placeholder = self.layout.payload_offset() - self.layout.fingerprint_offset();
        io::copy(&mut io::repeat(0).take(placeholder), output)?;

        debug!(
            metadata_len = self.layout.metadata_len,
            chunks = self.layout.chunk_count,
            placeholder,
            "wrote container prelude"
        );
        Ok(())
    }

    pub fn encrypt_chunks<R: Read, W: Write>(
        &mut self,
        key: &DerivedKey,
        input: &mut R,
        output: &mut W,
        hooks: StreamHooks<'_>,
    ) -> PcvResult<ChunkStats> {
        let engine = ChunkEngine::new(key, self.header.flags.fast);
        let stats = engine.encrypt(input, output, self.plaintext_len, &mut self.table, hooks)?;
        self.stats = Some(stats.clone());
        Ok(stats)
    }

    /// Seek back and write the fingerprint, digest and sealed nonce table.
    pub fn finalize<W: Write + Seek>(
        &mut self,
        key: &DerivedKey,
        output: &mut W,
    ) -> PcvResult<ChunkStats> {
        let stats = self
            .stats
            .clone()
            .ok_or_else(|| PcvError::InvalidInput("finalize called before the chunk stream".into()))?;

        self.header.fingerprint = fingerprint(key);
        self.header.digest = stats.digest;
        let sealed = self.table.seal(key, &self.header.header_nonce)?;

        output.seek(SeekFrom::Start(self.layout.fingerprint_offset()))?;
        output.write_all(&self.codecs.encode(Field::Fingerprint, &self.header.fingerprint)?)?;
        output.write_all(&self.codecs.encode(Field::Digest, &self.header.digest)?)?;
        output.write_all(&sealed.encode(self.codecs)?)?;
        output.seek(SeekFrom::Start(self.layout.container_len()))?;
        output.flush()?;

        info!(
            chunks = stats.chunks,
            bytes = stats.bytes,
            container_len = self.layout.container_len(),
            "container sealed"
        );
        Ok(stats)
    }
}

/// A parsed container whose key has not been checked yet.
#[derive(Debug, Clone)]
pub struct OpenedContainer {
    header: Header,
    layout: Layout,
    sealed_table: SealedNonceTable,
}

impl OpenedContainer {
    /// Parse every header field and the coded nonce table, leaving `input`
    /// positioned at the first chunk.
    pub fn read<R: Read>(
        input: &mut R,
        container_len: u64,
        codecs: &FieldCodecs,
    ) -> PcvResult<Self> {
        if container_len < FIXED_OVERHEAD {
            return Err(PcvError::TruncatedInput(format!(
                "{container_len} bytes is smaller than any container"
            )));
        }

        let version: [u8; 5] = to_array(read_field(input, codecs, Field::Version)?, Field::Version)?;
        if &version != FORMAT_VERSION {
            warn!(
                found = %String::from_utf8_lossy(&version),
                expected = %String::from_utf8_lossy(FORMAT_VERSION),
                "unknown container version, attempting to read anyway"
            );
        }

        let metadata_len = parse_metadata_len(&read_field(input, codecs, Field::MetadataLength)?)?;
        let layout = Layout::from_container_len(container_len, metadata_len)?;

        let metadata_size = usize::try_from(metadata_len)
            .map_err(|_| PcvError::InvalidInput(format!("metadata of {metadata_len} bytes")))?;
        let mut metadata = vec![0u8; metadata_size];
        input
            .read_exact(&mut metadata)
            .map_err(|e| PcvError::from_read(e, "metadata"))?;

        let flags: [u8; Flags::LEN] = to_array(read_field(input, codecs, Field::Flags)?, Field::Flags)?;
        let salt = to_array(read_field(input, codecs, Field::Salt)?, Field::Salt)?;
        let header_nonce = to_array(read_field(input, codecs, Field::HeaderNonce)?, Field::HeaderNonce)?;
        let fingerprint = to_array(read_field(input, codecs, Field::Fingerprint)?, Field::Fingerprint)?;
        let digest = to_array(read_field(input, codecs, Field::Digest)?, Field::Digest)?;

        let mut coded_table = vec![0u8; layout.table_len() as usize];
        input
            .read_exact(&mut coded_table)
            .map_err(|e| PcvError::from_read(e, "nonce table"))?;
        let sealed_table = SealedNonceTable::decode(&coded_table, layout.chunk_count, codecs)?;

        debug!(
            metadata_len,
            chunks = layout.chunk_count,
            payload_len = layout.payload_len,
            "parsed container header"
        );

        Ok(Self {
            header: Header {
                version,
                metadata,
                flags: Flags::from_bytes(&flags),
                salt,
                header_nonce,
                fingerprint,
                digest,
            },
            layout,
            sealed_table,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_fast(&self) -> bool {
        self.header.flags.fast
    }

    /// Check the key against the stored fingerprint, then open the nonce table.
    pub fn unlock(&self, key: &DerivedKey) -> PcvResult<NonceTable> {
        verify_fingerprint(key, &self.header.fingerprint)?;
        NonceTable::open(&self.sealed_table, key, &self.header.header_nonce)
    }

    /// Decrypt the chunk stream; `input` must be positioned at the first chunk.
    pub fn decrypt_chunks<R: Read, W: Write>(
        &self,
        key: &DerivedKey,
        table: &NonceTable,
        input: &mut R,
        output: &mut W,
        keep_corrupted: bool,
        hooks: StreamHooks<'_>,
    ) -> PcvResult<ChunkStats> {
        let engine = ChunkEngine::new(key, self.is_fast());
        let stats = engine.decrypt(
            input,
            output,
            self.layout.payload_len,
            table,
            keep_corrupted,
            &self.header.digest,
            hooks,
        )?;
        output.flush()?;
        info!(
            chunks = stats.chunks,
            bytes = stats.bytes,
            corrupted = stats.corrupted,
            digest_ok = stats.digest_ok,
            "container opened"
        );
        Ok(stats)
    }

    pub fn info(&self) -> ContainerInfo {
        ContainerInfo {
            version: String::from_utf8_lossy(&self.header.version).into_owned(),
            version_supported: self.header.version_supported(),
            fast: self.is_fast(),
            metadata: String::from_utf8_lossy(&self.header.metadata).into_owned(),
            metadata_len: self.layout.metadata_len,
            chunk_count: self.layout.chunk_count,
            plaintext_len: self.layout.plaintext_len(),
            container_len: self.layout.container_len(),
        }
    }
}

/// What can be learned about a container without its password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub version: String,
    pub version_supported: bool,
    pub fast: bool,
    pub metadata: String,
    pub metadata_len: u64,
    pub chunk_count: u64,
    pub plaintext_len: u64,
    pub container_len: u64,
}

fn read_field<R: Read>(input: &mut R, codecs: &FieldCodecs, field: Field) -> PcvResult<Vec<u8>> {
    let mut coded = vec![0u8; field.encoded_len()];
    input
        .read_exact(&mut coded)
        .map_err(|e| PcvError::from_read(e, field.name()))?;
    codecs.decode(field, &coded)
}

fn to_array<const N: usize>(bytes: Vec<u8>, field: Field) -> PcvResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| PcvError::CorruptHeaderField { field: field.name() })
}

fn parse_metadata_len(text: &[u8]) -> PcvResult<u64> {
    std::str::from_utf8(text)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(PcvError::CorruptHeaderField {
            field: Field::MetadataLength.name(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::CHUNK_SIZE;

    const MIB: u64 = CHUNK_SIZE as u64;

    fn key() -> DerivedKey {
        DerivedKey::from_bytes([0x5A; 32])
    }

    fn make_data(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    fn seal_bytes(data: &[u8], metadata: &[u8], fast: bool, key: &DerivedKey) -> Vec<u8> {
        let codecs = FieldCodecs::new().unwrap();
        let mut enc =
            ContainerEncryptor::new(&codecs, metadata.to_vec(), fast, data.len() as u64).unwrap();
        let mut out = Cursor::new(Vec::new());
        enc.write_prelude(&mut out).unwrap();
        enc.encrypt_chunks(key, &mut Cursor::new(data), &mut out, StreamHooks::default())
            .unwrap();
        enc.finalize(key, &mut out).unwrap();
        out.into_inner()
    }

    fn open_bytes(container: &[u8], key: &DerivedKey, keep: bool) -> PcvResult<Vec<u8>> {
        let codecs = FieldCodecs::new().unwrap();
        let mut input = Cursor::new(container);
        let opened = OpenedContainer::read(&mut input, container.len() as u64, &codecs)?;
        let table = opened.unlock(key)?;
        let mut out = Vec::new();
        let stats =
            opened.decrypt_chunks(key, &table, &mut input, &mut out, keep, StreamHooks::default())?;
        stats.verify_integrity(keep)?;
        Ok(out)
    }

    #[test]
    fn fixed_overhead_matches_field_sizes() {
        let layout = Layout::for_plaintext(0, 0);
        assert_eq!(layout.container_len(), FIXED_OVERHEAD);
        assert_eq!(layout.fingerprint_offset(), 700);
        assert_eq!(Layout::for_plaintext(42, 0).fingerprint_offset(), 742);
        assert_eq!(layout.table_offset(), 1052);
    }

    #[test]
    fn two_mib_layout() {
        let layout = Layout::for_plaintext(0, 2 * MIB);
        assert_eq!(layout.chunk_count, 2);
        assert_eq!(layout.table_len(), 304 + 144);
        assert_eq!(layout.payload_len, 2 * MIB + 32);
        assert_eq!(layout.container_len(), 1196 + 304 + 2 * MIB + 32);
    }

    #[test]
    fn layout_recovered_from_file_size() {
        for metadata_len in [0u64, 5, 1000] {
            for plaintext_len in [0, 1, 100, MIB - 1, MIB, MIB + 1, 2 * MIB, 3 * MIB + 7] {
                let layout = Layout::for_plaintext(metadata_len, plaintext_len);
                let parsed = Layout::from_container_len(layout.container_len(), metadata_len).unwrap();
                assert_eq!(parsed, layout, "metadata {metadata_len}, plaintext {plaintext_len}");
                assert_eq!(parsed.plaintext_len(), plaintext_len);
            }
        }
    }

    #[test]
    fn impossible_sizes_are_truncated() {
        assert!(matches!(
            Layout::from_container_len(1195, 0),
            Err(PcvError::TruncatedInput(_))
        ));
        assert!(matches!(
            Layout::from_container_len(1196, 1),
            Err(PcvError::TruncatedInput(_))
        ));
        // A chunk needs a coded nonce, a tag and at least one byte
        assert!(matches!(
            Layout::from_container_len(1196 + 168, 0),
            Err(PcvError::TruncatedInput(_))
        ));
        assert!(Layout::from_container_len(1196 + 169, 0).is_ok());
        // One full chunk plus a second one too short to hold anything
        let full = 1196 + MIB + 168;
        assert!(Layout::from_container_len(full, 0).is_ok());
        assert!(matches!(
            Layout::from_container_len(full + 100, 0),
            Err(PcvError::TruncatedInput(_))
        ));
    }

    #[test]
    fn short_last_chunk_reads_as_corrupt_chunk() {
        let key = key();
        let data = make_data(1000);
        let container = seal_bytes(&data, b"", false, &key);
        let cut = &container[..container.len() - 5];

        assert!(matches!(
            open_bytes(cut, &key, false),
            Err(PcvError::CorruptChunk { index: 0 })
        ));
        // Under keep the ciphertext that is left still decrypts
        let kept = open_bytes(cut, &key, true).unwrap();
        assert_eq!(kept, &data[..995]);
    }

    #[test]
    fn roundtrip_both_modes() {
        let key = key();
        let data = make_data(MIB as usize + 321);
        for fast in [false, true] {
            let container = seal_bytes(&data, b"notes", fast, &key);
            assert_eq!(
                container.len() as u64,
                Layout::for_plaintext(5, data.len() as u64).container_len()
            );
            assert_eq!(open_bytes(&container, &key, false).unwrap(), data);
        }
    }

    #[test]
    fn empty_input_roundtrip() {
        let key = key();
        let container = seal_bytes(b"", b"", false, &key);
        assert_eq!(container.len() as u64, FIXED_OVERHEAD);
        assert!(open_bytes(&container, &key, false).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_is_rejected_before_any_chunk() {
        let container = seal_bytes(b"secret", b"", false, &key());
        let err = open_bytes(&container, &DerivedKey::from_bytes([1; 32]), false).unwrap_err();
        assert!(matches!(err, PcvError::WrongPassword));
    }

    #[test]
    fn info_without_key() {
        let container = seal_bytes(&make_data(10), b"hello metadata", true, &key());
        let codecs = FieldCodecs::new().unwrap();
        let opened =
            OpenedContainer::read(&mut Cursor::new(&container), container.len() as u64, &codecs)
                .unwrap();
        let info = opened.info();
        assert_eq!(info.version, "pcv-1");
        assert!(info.version_supported);
        assert!(info.fast);
        assert_eq!(info.metadata, "hello metadata");
        assert_eq!(info.chunk_count, 1);
        assert_eq!(info.plaintext_len, 10);
        assert_eq!(info.container_len, container.len() as u64);
    }

    #[test]
    fn header_bytes_are_repaired() {
        let key = key();
        let data = make_data(4096);
        let mut container = seal_bytes(&data, b"m", false, &key);
        let layout = Layout::for_plaintext(1, data.len() as u64);

        container[2] ^= 0xFF; // version
        container[133 + 5] ^= 0x01; // metadata length
        container[layout.fingerprint_offset() as usize - 10] ^= 0x33; // header nonce parity
        container[layout.fingerprint_offset() as usize + 1] ^= 0x80; // fingerprint
        container[layout.table_offset() as usize + 3] ^= 0x04; // nonce group

        assert_eq!(open_bytes(&container, &key, false).unwrap(), data);
    }

    #[test]
    fn doubly_damaged_salt_is_corrupt_header() {
        let key = key();
        let mut container = seal_bytes(b"data", b"", false, &key);
        let salt_offset = 133 + 138 + 133;
        container[salt_offset] ^= 1;
        container[salt_offset + 1] ^= 1;
        let err = open_bytes(&container, &key, false).unwrap_err();
        assert!(matches!(err, PcvError::CorruptHeaderField { field: "salt" }));
    }

    #[test]
    fn non_numeric_metadata_length_is_corrupt_header() {
        let key = key();
        let mut container = seal_bytes(b"data", b"", false, &key);
        let codecs = FieldCodecs::new().unwrap();
        let coded = codecs.encode(Field::MetadataLength, b"00000000x1").unwrap();
        container[133..271].copy_from_slice(&coded);
        let err = open_bytes(&container, &key, false).unwrap_err();
        assert!(matches!(err, PcvError::CorruptHeaderField { field: "metadata length" }));
    }

    #[test]
    fn unknown_version_still_opens() {
        let key = key();
        let mut container = seal_bytes(b"data", b"", false, &key);
        let codecs = FieldCodecs::new().unwrap();
        container[..133].copy_from_slice(&codecs.encode(Field::Version, b"pcv-9").unwrap());
        assert_eq!(open_bytes(&container, &key, false).unwrap(), b"data");
    }

    #[test]
    fn truncated_container_fails_cleanly() {
        let key = key();
        let container = seal_bytes(&make_data(100), b"", false, &key);
        // 100 bytes after the header cannot hold a coded nonce, a tag and data
        let err = open_bytes(&container[..1296], &key, false).unwrap_err();
        assert!(matches!(err, PcvError::TruncatedInput(_)));
    }

    #[test]
    fn tampered_table_is_corrupt_nonce_table() {
        let key = key();
        let mut container = seal_bytes(&make_data(100), b"", false, &key);
        let table_offset = Layout::for_plaintext(0, 100).table_offset() as usize;
        // Re-encode a different nonce group so the field decodes cleanly
        let codecs = FieldCodecs::new().unwrap();
        let forged = codecs.encode(Field::NonceGroup, &[0u8; NONCE_SIZE]).unwrap();
        container[table_offset..table_offset + 152].copy_from_slice(&forged);
        let err = open_bytes(&container, &key, false).unwrap_err();
        assert!(matches!(err, PcvError::CorruptNonceTable));
    }

    #[test]
    fn metadata_length_field_is_ten_digits() {
        let layout = Layout::for_plaintext(MAX_METADATA_LEN, 0);
        assert_eq!(layout.fingerprint_offset(), 700 + MAX_METADATA_LEN);
        assert_eq!(format!("{:010}", MAX_METADATA_LEN).len(), 10);
    }
}
