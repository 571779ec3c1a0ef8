//! pcv-engine: end-to-end encrypt/decrypt runs
//!
//! A [`Job`] describes one run; a [`Pipeline`] drives it through
//! `Init → DeriveKey → VerifyPassword → StreamChunks → Finalize` to exactly
//! one terminal [`Outcome`](pcv_core::Outcome), reporting progress once per
//! chunk and honouring cancellation at chunk boundaries.

pub mod job;
pub mod pipeline;
pub mod session;

pub use job::Job;
pub use pipeline::{Pipeline, PipelineHandle, StateFn};
pub use session::{RunState, Session};
