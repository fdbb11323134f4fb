//! Collaborator traits consumed by the accumulator.
//!
//! The accumulator pulls from a [`Source`], pushes into a [`Sink`], and
//! reports failed cycles to a [`FailureReporter`]. None of them ever sees the
//! batch itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::error::{BatchError, CycleError};

/// Pull endpoint handing out one message at a time.
#[async_trait]
pub trait Source<M: Send + 'static>: Send + Sync {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Must not block past
    /// `timeout`; a zero timeout means "only what is already available".
    async fn receive(&self, timeout: Duration) -> Result<Option<M>, BatchError>;

    /// Called once per accumulator start. Must be idempotent.
    async fn start(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Called once per accumulator stop. Must be idempotent.
    async fn stop(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Hands out the polling [`Source`] an accumulator reads from.
#[async_trait]
pub trait SourceProvider<M: Send + 'static>: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn Source<M>>, BatchError>;
}

/// Delivery strategy for a single message.
///
/// Alternate strategies (retries, instrumentation) wrap another sink rather
/// than replace the drain phase. See [`crate::sink`].
#[async_trait]
pub trait Sink<M: Send + 'static>: Send + Sync {
    /// Process one message. An error aborts the rest of the current batch.
    async fn process(&self, message: M) -> Result<(), BatchError>;

    async fn start(&self) -> Result<(), BatchError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Human-readable name (used in `Display` and logging).
    fn name(&self) -> &str {
        "sink"
    }
}

/// Blanket implementation so `Arc<dyn Sink<M>>` can be wrapped directly.
#[async_trait]
impl<M: Send + 'static, T: Sink<M> + ?Sized> Sink<M> for Arc<T> {
    async fn process(&self, message: M) -> Result<(), BatchError> {
        (**self).process(message).await
    }

    async fn start(&self) -> Result<(), BatchError> {
        (**self).start().await
    }

    async fn stop(&self) -> Result<(), BatchError> {
        (**self).stop().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Receives failed batch cycles. Fire-and-forget: must never panic.
pub trait FailureReporter: Send + Sync {
    fn handle(&self, error: &CycleError);
}

impl<F> FailureReporter for F
where
    F: Fn(&CycleError) + Send + Sync,
{
    fn handle(&self, error: &CycleError) {
        self(error)
    }
}

/// Default reporter: logs every failed cycle at `error` level.
#[derive(Debug, Clone)]
pub struct LoggingFailureReporter {
    accumulator: String,
}

impl LoggingFailureReporter {
    pub fn new(accumulator: impl Into<String>) -> Self {
        Self {
            accumulator: accumulator.into(),
        }
    }
}

impl FailureReporter for LoggingFailureReporter {
    fn handle(&self, err: &CycleError) {
        error!(
            accumulator = %self.accumulator,
            cycle = err.cycle,
            phase = %err.phase,
            discarded = err.discarded,
            error = %err.source,
            "batch cycle failed"
        );
    }
}
