pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorKind, PcvError, PcvResult};
pub use types::{CancelToken, Flags, Mode, Outcome, Progress, ProgressFn, RunSummary};
