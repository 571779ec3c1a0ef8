use serde::{Deserialize, Serialize};

use crate::error::{PcvError, PcvResult};

/// Top-level configuration (loaded from pcv.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcvConfig {
    pub kdf: KdfConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

impl PcvConfig {
    pub fn validate(&self) -> PcvResult<()> {
        self.kdf.validate()?;
        match self.log.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(PcvError::Config(format!(
                "log.format must be \"text\" or \"json\", got \"{other}\""
            ))),
        }
    }
}

/// Argon2id cost parameters. Containers do not record these, so the
/// encrypting and decrypting side must agree on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB for secure mode (default: 1048576 = 1 GiB).
    /// Fast mode always uses half of this.
    pub mem_cost_kib: u32,
    /// Passes over memory (default: 8)
    pub time_cost: u32,
    /// Lanes (default: 8)
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            mem_cost_kib: 1 << 20,
            time_cost: 8,
            parallelism: 8,
        }
    }
}

impl KdfConfig {
    /// Argon2 requires at least 8 KiB per lane, and fast mode halves the memory.
    pub fn validate(&self) -> PcvResult<()> {
        if self.time_cost == 0 {
            return Err(PcvError::Config("kdf.time_cost must be at least 1".into()));
        }
        if self.parallelism == 0 {
            return Err(PcvError::Config("kdf.parallelism must be at least 1".into()));
        }
        let floor = 16 * self.parallelism;
        if self.mem_cost_kib < floor {
            return Err(PcvError::Config(format!(
                "kdf.mem_cost_kib must be at least {floor} for parallelism {}",
                self.parallelism
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Write best-effort plaintext for chunks that fail authentication
    pub keep_corrupted: bool,
    /// Replace an existing output file instead of refusing to run
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
