//! Composable [`Sink`] implementations.
//!
//! Delivery strategies stack by wrapping: `RetrySink::new(InstrumentedSink::new(inner), 3, backoff)`
//! retries an instrumented sink, each attempt being counted.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::error::BatchError;
use crate::traits::Sink;

// ── FnSink ───────────────────────────────────────────────────────────

/// Sink backed by an async closure.
pub struct FnSink<F> {
    name: String,
    handler: F,
}

impl<F> FnSink<F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<M, F, Fut> Sink<M> for FnSink<F>
where
    M: Send + 'static,
    F: Fn(M) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BatchError>> + Send,
{
    async fn process(&self, message: M) -> Result<(), BatchError> {
        (self.handler)(message).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── InstrumentedSink ─────────────────────────────────────────────────

/// Counts successes and failures of the wrapped sink.
pub struct InstrumentedSink<S> {
    inner: S,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl<S> InstrumentedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<M: Send + 'static, S: Sink<M>> Sink<M> for InstrumentedSink<S> {
    async fn process(&self, message: M) -> Result<(), BatchError> {
        let started = Instant::now();
        let result = self.inner.process(message).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                trace!(sink = self.inner.name(), ?elapsed, "message processed");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!(sink = self.inner.name(), ?elapsed, error = %e, "message processing failed");
            }
        }
        result
    }

    async fn start(&self) -> Result<(), BatchError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), BatchError> {
        self.inner.stop().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ── RetrySink ────────────────────────────────────────────────────────

/// Re-delivers a message to the wrapped sink until it succeeds or
/// `max_attempts` is reached, sleeping `backoff` between attempts.
pub struct RetrySink<S> {
    inner: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S> RetrySink<S> {
    /// `max_attempts` counts the first delivery; values below 1 are raised to 1.
    pub fn new(inner: S, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl<M: Clone + Send + 'static, S: Sink<M>> Sink<M> for RetrySink<S> {
    async fn process(&self, message: M) -> Result<(), BatchError> {
        let mut attempt = 1;
        loop {
            match self.inner.process(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        sink = self.inner.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "message processing failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn start(&self) -> Result<(), BatchError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), BatchError> {
        self.inner.stop().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
