//! Pipeline: one encrypt or decrypt run from paths to a terminal outcome

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::thread::JoinHandle;

use tracing::{info, warn};

use pcv_core::{CancelToken, ErrorKind, Mode, Outcome, PcvError, PcvResult, ProgressFn, RunSummary};
use pcv_crypto::{derive_key, ContainerEncryptor, FieldCodecs, OpenedContainer, StreamHooks};

use crate::job::Job;
use crate::session::{RunState, Session};

/// State-transition callback, invoked on every state entered
pub type StateFn = Box<dyn Fn(RunState) + Send + Sync>;

pub struct Pipeline {
    job: Job,
    progress: Option<ProgressFn>,
    on_state: Option<StateFn>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress: None,
            on_state: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn on_state(mut self, on_state: StateFn) -> Self {
        self.on_state = Some(on_state);
        self
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run at the next chunk boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run to completion on the calling thread.
    pub fn run(self) -> Outcome {
        let mode = self.job.resolved_mode();
        info!(mode = %mode, input = %self.job.input.display(), "pipeline starting");
        self.notify(RunState::Init);

        let mut session = match Session::init(&self.job) {
            Ok(session) => session,
            Err(e) => {
                self.notify(RunState::Failed);
                return failed(e);
            }
        };

        let result = match session.mode {
            Mode::Encrypt => self.encrypt(&mut session),
            Mode::Decrypt => self.decrypt(&mut session),
        };

        match result {
            Ok(summary) => {
                session.commit();
                self.enter(&mut session, RunState::Done);
                info!(
                    chunks = summary.chunks,
                    bytes = summary.bytes,
                    corrupted = summary.corrupted_chunks,
                    output = %session.output.display(),
                    "pipeline done"
                );
                Outcome::Done(summary)
            }
            Err(PcvError::Cancelled) => {
                session.discard_output();
                self.enter(&mut session, RunState::Cancelled);
                info!("pipeline cancelled");
                Outcome::Cancelled
            }
            Err(e) => {
                session.discard_output();
                self.enter(&mut session, RunState::Failed);
                warn!(kind = %e.kind(), error = %e, "pipeline failed");
                failed(e)
            }
        }
    }

    /// Run on a dedicated thread. The handle can cancel and join it.
    pub fn spawn(self) -> PcvResult<PipelineHandle> {
        let cancel = self.cancel_token();
        let thread = std::thread::Builder::new()
            .name("pcv-pipeline".into())
            .spawn(move || self.run())?;
        Ok(PipelineHandle { cancel, thread })
    }

    fn encrypt(&self, session: &mut Session) -> PcvResult<RunSummary> {
        self.enter(session, RunState::DeriveKey);
        let codecs = FieldCodecs::new()?;
        let mut input = BufReader::new(File::open(&session.input)?);
        let mut encryptor = ContainerEncryptor::new(
            &codecs,
            self.job.metadata.clone(),
            self.job.fast,
            session.input_len,
        )?;
        let key = derive_key(
            &self.job.password,
            &encryptor.header().salt,
            self.job.fast,
            &self.job.kdf,
        )?;
        self.check_cancel()?;

        self.enter(session, RunState::StreamChunks);
        let mut output = session.create_output()?;
        encryptor.write_prelude(&mut output)?;
        encryptor.encrypt_chunks(&key, &mut input, &mut output, self.hooks())?;

        self.enter(session, RunState::Finalize);
        let stats = encryptor.finalize(&key, &mut output)?;
        close(output)?;

        Ok(RunSummary {
            mode: Some(Mode::Encrypt),
            chunks: stats.chunks,
            bytes: stats.bytes,
            corrupted_chunks: 0,
            digest_ok: true,
        })
    }

    fn decrypt(&self, session: &mut Session) -> PcvResult<RunSummary> {
        self.enter(session, RunState::DeriveKey);
        let codecs = FieldCodecs::new()?;
        let mut input = BufReader::new(File::open(&session.input)?);
        let container = OpenedContainer::read(&mut input, session.input_len, &codecs)?;
        let key = derive_key(
            &self.job.password,
            &container.header().salt,
            container.is_fast(),
            &self.job.kdf,
        )?;

        self.enter(session, RunState::VerifyPassword);
        let table = container.unlock(&key)?;
        self.check_cancel()?;

        self.enter(session, RunState::StreamChunks);
        let mut output = session.create_output()?;
        let stats = container.decrypt_chunks(
            &key,
            &table,
            &mut input,
            &mut output,
            self.job.keep_corrupted,
            self.hooks(),
        )?;

        self.enter(session, RunState::Finalize);
        stats.verify_integrity(self.job.keep_corrupted)?;
        close(output)?;

        Ok(RunSummary {
            mode: Some(Mode::Decrypt),
            chunks: stats.chunks,
            bytes: stats.bytes,
            corrupted_chunks: stats.corrupted,
            digest_ok: stats.digest_ok,
        })
    }

    fn hooks(&self) -> StreamHooks<'_> {
        StreamHooks {
            progress: self.progress.as_ref(),
            cancel: Some(&self.cancel),
        }
    }

    fn check_cancel(&self) -> PcvResult<()> {
        if self.cancel.is_cancelled() {
            Err(PcvError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&self, session: &mut Session, state: RunState) {
        session.set_state(state);
        self.notify(state);
    }

    fn notify(&self, state: RunState) {
        tracing::debug!(state = %state, "pipeline state");
        if let Some(cb) = &self.on_state {
            cb(state);
        }
    }
}

/// A pipeline running on its own thread.
pub struct PipelineHandle {
    cancel: CancelToken,
    thread: JoinHandle<Outcome>,
}

impl PipelineHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the terminal outcome. A panicked worker is reported as an
    /// internal failure.
    pub fn join(self) -> Outcome {
        self.thread.join().unwrap_or_else(|_| Outcome::Failed {
            kind: ErrorKind::Internal,
            message: "pipeline worker panicked".into(),
        })
    }
}

fn failed(e: PcvError) -> Outcome {
    Outcome::Failed {
        kind: e.kind(),
        message: e.to_string(),
    }
}

/// Flush buffered output and push it to disk.
fn close(mut output: BufWriter<File>) -> PcvResult<()> {
    output.flush()?;
    let file = output.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
