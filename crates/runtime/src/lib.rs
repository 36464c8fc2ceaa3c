//! Beacon runtime evaluator.
//!
//! This crate provides:
//! - A handle-indexed per-cycle sensor value context (`context`)
//! - The Ring Buffer Manager, for temporal (`threshold_over_time`) history (`ring_buffer`)
//! - The layer-ordered, Kleene-logic rule evaluator that executes a compiled
//!   `Program` one cycle at a time (`executor`)
//! - The runtime-phase error taxonomy (`error`)

pub mod context;
pub mod error;
pub mod executor;
pub mod ring_buffer;

pub use context::*;
pub use error::*;
pub use executor::*;
pub use ring_buffer::*;
