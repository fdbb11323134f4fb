//! Batch completion policy.
//!
//! A fill phase ends on whichever limit fires first: the content cap
//! (`out_batch_size`), the iteration cap (`batch_size`), or the
//! `batch_timeout` deadline. The two size caps are evaluated here; the
//! deadline is enforced by the cycle itself.

use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use batchline_core::config::{DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_MS};
use batchline_core::BatchSettings;

/// Why a fill phase stopped accumulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillExit {
    /// The iteration index reached `batch_size`.
    BatchSize,
    /// The batch held `out_batch_size` messages.
    OutBatchSize,
    /// The cycle deadline passed before the next receive.
    DeadlineExpired,
    /// The source returned nothing within the remaining budget.
    ReceiveTimedOut,
    /// The accumulator withdrew its run-allowed signal.
    Stopped,
}

impl fmt::Display for FillExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FillExit::BatchSize => "batch_size",
            FillExit::OutBatchSize => "out_batch_size",
            FillExit::DeadlineExpired => "deadline_expired",
            FillExit::ReceiveTimedOut => "receive_timed_out",
            FillExit::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Size and time budget of one batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Maximum number of fill iterations.
    pub batch_size: usize,
    /// Optional content cap, checked before `batch_size`.
    pub out_batch_size: Option<NonZeroUsize>,
    /// Wall-clock budget of the fill phase.
    pub batch_timeout: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            out_batch_size: None,
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
        }
    }
}

impl BatchPolicy {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the content cap. Zero disables it.
    pub fn with_out_batch_size(mut self, out_batch_size: usize) -> Self {
        self.out_batch_size = NonZeroUsize::new(out_batch_size);
        self
    }

    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    /// Which size cap, if any, completes the batch before iteration `index`
    /// given that the batch currently holds `batch_len` messages.
    pub fn completion(&self, index: usize, batch_len: usize) -> Option<FillExit> {
        if let Some(out) = self.out_batch_size {
            if batch_len >= out.get() {
                return Some(FillExit::OutBatchSize);
            }
        }
        if index >= self.batch_size {
            return Some(FillExit::BatchSize);
        }
        None
    }

    pub fn is_batch_completed(&self, index: usize, batch_len: usize) -> bool {
        self.completion(index, batch_len).is_some()
    }
}

impl From<&BatchSettings> for BatchPolicy {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            out_batch_size: NonZeroUsize::new(settings.out_batch_size),
            batch_timeout: settings.batch_timeout(),
        }
    }
}
