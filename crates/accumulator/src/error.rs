//! Accumulator error types.

use std::fmt;

use thiserror::Error;

use crate::state::RunState;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("startup error: {0}")]
    Startup(String),

    #[error("shutdown error: {0}")]
    Shutdown(String),

    #[error("receive error: {0}")]
    Receive(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("invalid state: cannot {action} while {state}")]
    InvalidState { action: &'static str, state: RunState },

    #[error("panicked: {0}")]
    Panic(String),
}

/// Phase of a batch cycle in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fill,
    Drain,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Fill => write!(f, "fill"),
            Phase::Drain => write!(f, "drain"),
        }
    }
}

/// A failed batch cycle, as handed to the failure reporter.
///
/// The cycle is abandoned: `discarded` messages were still in the batch when
/// the error surfaced and were dropped without delivery.
#[derive(Debug, Error)]
#[error("batch cycle {cycle} failed during {phase} ({discarded} discarded): {source}")]
pub struct CycleError {
    pub cycle: u64,
    pub phase: Phase,
    pub discarded: usize,
    #[source]
    pub source: BatchError,
}
