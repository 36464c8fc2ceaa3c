//! Runtime-phase error taxonomy.
//!
//! A cycle either completes and returns a [`crate::executor::CycleReport`]
//! (with any per-rule `Indeterminate` outcomes surfaced as non-fatal
//! `RuntimeIndeterminate` diagnostics rather than errors) or aborts with a
//! `RuntimeError`, in which case the external driver retries at the next
//! tick (§4.7).

use thiserror::Error;

use beacon_store::StoreError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("store I/O failed: {0}")]
    Store(#[from] StoreError),

    /// A `Program` references a sensor handle absent from its own symbol
    /// table, or some other invariant the IR builder is supposed to
    /// guarantee was violated. Should not occur given a program produced by
    /// `beacon-compiler`; surfaces distinctly from `Store` so callers can
    /// tell a transport outage from a corrupt artifact.
    #[error("invalid program: {0}")]
    InvalidProgram(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
