//! One batch cycle: a fill phase followed by a drain phase.
//!
//! The fill phase pulls from the source under a single deadline computed at
//! cycle start, so fast receives never extend the budget. The drain phase
//! pops each message off the batch before handing it to the sink; the first
//! sink error abandons the cycle and discards whatever is still pending.
//!
//! A cycle owned by an accumulator also watches its run-allowed signal.
//! Once the signal is withdrawn no new receive or process call is started.
//! A message returned by a receive already in flight is dropped, and the
//! drain discards what is left instead of dispatching it.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::batch::Batch;
use crate::error::{BatchError, CycleError, Phase};
use crate::policy::{BatchPolicy, FillExit};
use crate::stats::StatsRecorder;
use crate::traits::{Sink, Source};

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    /// Messages accumulated during the fill phase.
    pub received: usize,
    /// Messages handed to the sink during the drain phase.
    pub dispatched: usize,
    /// Which limit ended the fill phase.
    pub reason: FillExit,
}

/// Executes batch cycles against one source/sink pair.
///
/// Cycles are serialized: concurrent calls to [`run`](Self::run) wait for
/// each other, so at most one cycle touches the batch at a time.
pub struct BatchCycle<M: Send + 'static> {
    name: String,
    policy: BatchPolicy,
    batch: Arc<Batch<M>>,
    source: Arc<dyn Source<M>>,
    sink: Arc<dyn Sink<M>>,
    lock: Arc<Mutex<()>>,
    stats: Arc<StatsRecorder>,
    signal: Option<watch::Receiver<bool>>,
}

/// `true` while the sender is alive and still publishes `true`.
fn run_allowed(signal: &watch::Receiver<bool>) -> bool {
    signal.has_changed().is_ok() && *signal.borrow()
}

/// Run a collaborator call, turning a panic into a [`BatchError::Panic`].
async fn contained<T>(call: impl Future<Output = Result<T, BatchError>>) -> Result<T, BatchError> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(BatchError::Panic(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<M: Send + 'static> BatchCycle<M> {
    /// Standalone cycle with its own batch.
    pub fn new(policy: BatchPolicy, source: Arc<dyn Source<M>>, sink: Arc<dyn Sink<M>>) -> Self {
        Self {
            name: "batch-cycle".to_string(),
            policy,
            batch: Arc::new(Batch::new()),
            source,
            sink,
            lock: Arc::new(Mutex::new(())),
            stats: Arc::new(StatsRecorder::default()),
            signal: None,
        }
    }

    /// Cycle sharing batch, lock and counters with its owning accumulator.
    pub(crate) fn shared(
        name: &str,
        policy: BatchPolicy,
        batch: Arc<Batch<M>>,
        source: Arc<dyn Source<M>>,
        sink: Arc<dyn Sink<M>>,
        lock: Arc<Mutex<()>>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            name: name.to_string(),
            policy,
            batch,
            source,
            sink,
            lock,
            stats,
            signal: None,
        }
    }

    /// Gate receives and dispatches on the accumulator's run-allowed signal.
    pub(crate) fn watching(mut self, signal: watch::Receiver<bool>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Messages still pending (non-zero only while a cycle is mid-flight).
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub(crate) fn source(&self) -> &Arc<dyn Source<M>> {
        &self.source
    }

    /// Whether the owning accumulator still lets cycles run. Always `true`
    /// for a standalone cycle.
    pub(crate) fn is_run_allowed(&self) -> bool {
        self.signal.as_ref().map_or(true, run_allowed)
    }

    /// Run one full cycle.
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        let _guard = self.lock.lock().await;
        let cycle = self.stats.next_cycle();

        let (received, reason) = match self.fill(cycle).await {
            Ok(filled) => filled,
            Err(source) => return Err(self.abandon(cycle, Phase::Fill, source)),
        };

        let dispatched = match self.drain(cycle).await {
            Ok(dispatched) => dispatched,
            Err(source) => return Err(self.abandon(cycle, Phase::Drain, source)),
        };

        debug!(
            accumulator = %self.name,
            cycle,
            received,
            dispatched,
            reason = %reason,
            "batch cycle complete"
        );
        Ok(CycleReport {
            cycle,
            received,
            dispatched,
            reason,
        })
    }

    /// Empty the batch once no cycle is running. Returns the dropped count.
    pub(crate) async fn clear_when_idle(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.batch.clear()
    }

    async fn fill(&self, cycle: u64) -> Result<(usize, FillExit), BatchError> {
        let deadline = Instant::now() + self.policy.batch_timeout;
        let mut index = 0;
        loop {
            if let Some(reason) = self.policy.completion(index, self.batch.len()) {
                return Ok((index, reason));
            }
            if !self.is_run_allowed() {
                return Ok((index, FillExit::Stopped));
            }

            let now = Instant::now();
            if now > deadline {
                trace!(accumulator = %self.name, cycle, index, "batch timeout expired at batch index");
                return Ok((index, FillExit::DeadlineExpired));
            }
            let remaining = deadline.saturating_duration_since(now);

            match contained(self.source.receive(remaining)).await? {
                Some(message) => {
                    self.stats.record_received();
                    if !self.batch.append_if(message, || self.is_run_allowed()) {
                        self.stats.record_dropped(1);
                        trace!(accumulator = %self.name, cycle, index, "accumulator stopping, received message dropped");
                        return Ok((index, FillExit::Stopped));
                    }
                    index += 1;
                }
                None => {
                    trace!(
                        accumulator = %self.name,
                        cycle,
                        index,
                        timeout = ?remaining,
                        "receive timed out at batch index"
                    );
                    return Ok((index, FillExit::ReceiveTimedOut));
                }
            }
        }
    }

    async fn drain(&self, cycle: u64) -> Result<usize, BatchError> {
        let mut dispatched = 0;
        while let Some(message) = self.batch.pop_front_if(|| self.is_run_allowed()) {
            contained(self.sink.process(message)).await?;
            self.stats.record_dispatched();
            dispatched += 1;
        }
        if !self.is_run_allowed() {
            let dropped = self.batch.clear();
            if dropped > 0 {
                self.stats.record_dropped(dropped);
                debug!(accumulator = %self.name, cycle, dropped, "accumulator stopping, batch dropped undelivered");
            }
        }
        Ok(dispatched)
    }

    fn abandon(&self, cycle: u64, phase: Phase, source: BatchError) -> CycleError {
        if let BatchError::Panic(msg) = &source {
            warn!(accumulator = %self.name, cycle, %phase, panic = %msg, "collaborator panicked during batch cycle");
        }
        let discarded = self.batch.clear();
        self.stats.record_failure(discarded);
        CycleError {
            cycle,
            phase,
            discarded,
            source,
        }
    }
}
