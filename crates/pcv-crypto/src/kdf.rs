//! Key derivation: Argon2id password → container key, SHA3-512 fingerprint

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Sha3_512};
use tracing::debug;
use zeroize::Zeroize;

use pcv_core::config::KdfConfig;
use pcv_core::{PcvError, PcvResult};

use crate::{FINGERPRINT_SIZE, KEY_SIZE, SALT_SIZE};

/// A 256-bit container key derived from a password via Argon2id.
///
/// Lives only in memory and is zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for KDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB for secure mode (default: 1048576 = 1 GiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 8)
    pub time_cost: u32,
    /// Parallelism (default: 8)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from(&KdfConfig::default())
    }
}

impl From<&KdfConfig> for KdfParams {
    fn from(config: &KdfConfig) -> Self {
        Self {
            mem_cost_kib: config.mem_cost_kib,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
        }
    }
}

impl KdfParams {
    /// Memory cost actually used: fast mode halves it.
    pub fn mem_cost_for(&self, fast: bool) -> u32 {
        if fast {
            self.mem_cost_kib / 2
        } else {
            self.mem_cost_kib
        }
    }
}

/// Derive the container key from a password and the header salt.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    fast: bool,
    params: &KdfParams,
) -> PcvResult<DerivedKey> {
    let mem_cost_kib = params.mem_cost_for(fast);
    let argon2_params = Params::new(
        mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| PcvError::Config(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    debug!(
        mem_cost_kib,
        time_cost = params.time_cost,
        parallelism = params.parallelism,
        fast,
        "deriving key"
    );

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| PcvError::Crypto(format!("Argon2id KDF failed: {e}")))?;

    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

/// SHA3-512 of the key, stored in the header to check the password.
pub fn fingerprint(key: &DerivedKey) -> [u8; FINGERPRINT_SIZE] {
    let digest = Sha3_512::digest(key.as_bytes());
    let mut out = [0u8; FINGERPRINT_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// Compare the key's fingerprint to the stored one without early exit.
pub fn verify_fingerprint(key: &DerivedKey, stored: &[u8; FINGERPRINT_SIZE]) -> PcvResult<()> {
    let computed = fingerprint(key);
    let diff = computed
        .iter()
        .zip(stored.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if diff == 0 {
        Ok(())
    } else {
        Err(PcvError::WrongPassword)
    }
}
