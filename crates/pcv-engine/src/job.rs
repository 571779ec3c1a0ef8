use std::path::{Path, PathBuf};

use secrecy::SecretString;

use pcv_core::config::PcvConfig;
use pcv_core::Mode;
use pcv_crypto::KdfParams;

/// Everything one pipeline run needs from the front end.
#[derive(Debug)]
pub struct Job {
    pub input: PathBuf,
    /// Defaults to [`Mode::default_output`] of the input
    pub output: Option<PathBuf>,
    /// Inferred from the input's extension when unset
    pub mode: Option<Mode>,
    pub password: SecretString,
    /// Stored raw in the container header; ignored when decrypting
    pub metadata: Vec<u8>,
    /// Halved KDF memory and no whole-file digest; ignored when decrypting
    pub fast: bool,
    pub keep_corrupted: bool,
    pub overwrite: bool,
    pub kdf: KdfParams,
}

impl Job {
    /// A run whose direction is inferred from the input's extension.
    pub fn infer(input: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            input: input.into(),
            output: None,
            mode: None,
            password,
            metadata: Vec::new(),
            fast: false,
            keep_corrupted: false,
            overwrite: false,
            kdf: KdfParams::default(),
        }
    }

    pub fn encrypt(input: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            mode: Some(Mode::Encrypt),
            ..Self::infer(input, password)
        }
    }

    pub fn decrypt(input: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            mode: Some(Mode::Decrypt),
            ..Self::infer(input, password)
        }
    }

    /// Take KDF costs and engine defaults from a loaded config.
    pub fn with_config(mut self, config: &PcvConfig) -> Self {
        self.kdf = KdfParams::from(&config.kdf);
        self.keep_corrupted = config.engine.keep_corrupted;
        self.overwrite = config.engine.overwrite;
        self
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn keep_corrupted(mut self, keep: bool) -> Self {
        self.keep_corrupted = keep;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn resolved_mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| Mode::infer(&self.input))
    }

    pub fn resolved_output(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self.resolved_mode().default_output(Path::new(&self.input)),
        }
    }
}
