use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use pcv_core::{Mode, PcvError, PcvResult};

use crate::job::Job;

/// Pipeline states. `Done`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    DeriveKey,
    /// Decrypt only
    VerifyPassword,
    StreamChunks,
    Finalize,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::DeriveKey => "derive_key",
            RunState::VerifyPassword => "verify_password",
            RunState::StreamChunks => "stream_chunks",
            RunState::Finalize => "finalize",
            RunState::Done => "done",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-run state owned by the pipeline: resolved paths, the current state,
/// and whether the output file exists yet.
///
/// An output that was created but never committed is removed on drop, so a
/// run that unwinds leaves nothing behind.
pub struct Session {
    pub mode: Mode,
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_len: u64,
    state: RunState,
    output_created: bool,
}

impl Session {
    /// Validate the job's paths and resolve its mode and output.
    pub fn init(job: &Job) -> PcvResult<Self> {
        let mode = job.resolved_mode();
        let input = job.input.clone();
        let output = job.resolved_output();

        let meta = fs::metadata(&input).map_err(|e| {
            PcvError::InvalidInput(format!("cannot read input {}: {e}", input.display()))
        })?;
        if !meta.is_file() {
            return Err(PcvError::InvalidInput(format!(
                "input {} is not a regular file",
                input.display()
            )));
        }
        if output == input {
            return Err(PcvError::InvalidInput(format!(
                "output {} would overwrite the input",
                output.display()
            )));
        }
        if output.exists() && !job.overwrite {
            return Err(PcvError::InvalidInput(format!(
                "output {} already exists",
                output.display()
            )));
        }

        debug!(
            mode = %mode,
            input = %input.display(),
            output = %output.display(),
            input_len = meta.len(),
            "session initialised"
        );

        Ok(Self {
            mode,
            input,
            output,
            input_len: meta.len(),
            state: RunState::Init,
            output_created: false,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    /// Create (or truncate) the output. Called only once the key is known
    /// to be right, so a wrong password never leaves a file behind.
    pub fn create_output(&mut self) -> PcvResult<BufWriter<File>> {
        let file = File::create(&self.output)?;
        self.output_created = true;
        Ok(BufWriter::new(file))
    }

    /// Mark the output as complete. It is no longer removed on drop.
    pub fn commit(&mut self) {
        self.output_created = false;
    }

    /// Remove a partial output after a failed or cancelled run.
    pub fn discard_output(&mut self) {
        if !self.output_created {
            return;
        }
        match fs::remove_file(&self.output) {
            Ok(()) => debug!(output = %self.output.display(), "removed partial output"),
            Err(e) => warn!(output = %self.output.display(), error = %e, "could not remove partial output"),
        }
        self.output_created = false;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.discard_output();
    }
}
