//! Background batch accumulator and its lifecycle.
//!
//! [`BatchAccumulator`] owns the batch and a single worker task that repeats
//! batch cycles until stopped. The worker and its cycle observe a `watch`
//! channel: [`stop`](BatchAccumulator::stop) publishes `false` and drops the
//! sender, and dropping the accumulator closes the channel as well. A cycle
//! that sees the signal withdrawn starts no further receive or process call,
//! and the worker exits right after it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use batchline_core::AccumulatorConfig;

use crate::batch::Batch;
use crate::cycle::BatchCycle;
use crate::error::BatchError;
use crate::policy::BatchPolicy;
use crate::state::RunState;
use crate::stats::{AccumulatorStats, StatsRecorder};
use crate::traits::{FailureReporter, LoggingFailureReporter, Sink, SourceProvider};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Prefix a collaborator failure with the startup step it happened in.
fn startup_error(step: &str, err: BatchError) -> BatchError {
    match err {
        BatchError::Startup(msg) => BatchError::Startup(format!("{step}: {msg}")),
        other => BatchError::Startup(format!("{step}: {other}")),
    }
}

/// Handles that only exist between a successful start and the next stop.
struct Active<M: Send + 'static> {
    cycle: Arc<BatchCycle<M>>,
    signal: watch::Sender<bool>,
}

// ── BatchAccumulator ─────────────────────────────────────────────────

/// Pulls messages from a source into batches and drains them into a sink.
pub struct BatchAccumulator<M: Send + 'static> {
    name: String,
    provider: Arc<dyn SourceProvider<M>>,
    sink: Arc<dyn Sink<M>>,
    reporter: Arc<dyn FailureReporter>,
    policy: Mutex<BatchPolicy>,
    state: Mutex<RunState>,
    batch: Arc<Batch<M>>,
    cycle_lock: Arc<tokio::sync::Mutex<()>>,
    stats: Arc<StatsRecorder>,
    active: Mutex<Option<Active<M>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> BatchAccumulator<M> {
    /// Accumulator with the default policy and a logging failure reporter.
    pub fn new(provider: Arc<dyn SourceProvider<M>>, sink: Arc<dyn Sink<M>>) -> Self {
        AccumulatorBuilder::new(provider, sink).build()
    }

    pub fn builder(
        provider: Arc<dyn SourceProvider<M>>,
        sink: Arc<dyn Sink<M>>,
    ) -> AccumulatorBuilder<M> {
        AccumulatorBuilder::new(provider, sink)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_state(&self) -> RunState {
        *lock(&self.state)
    }

    pub fn policy(&self) -> BatchPolicy {
        *lock(&self.policy)
    }

    /// Replace the policy. Only allowed while stopped.
    pub fn set_policy(&self, policy: BatchPolicy) -> Result<(), BatchError> {
        let state = lock(&self.state);
        if *state != RunState::Stopped {
            return Err(BatchError::InvalidState {
                action: "change policy",
                state: *state,
            });
        }
        *lock(&self.policy) = policy;
        Ok(())
    }

    /// Messages currently held in the batch.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn stats(&self) -> AccumulatorStats {
        self.stats.snapshot(self.run_state(), self.batch.len())
    }

    /// Acquire the source, start the sink and the source, and spawn the worker.
    ///
    /// Returns as soon as the worker is spawned. Must be called from within a
    /// tokio runtime.
    pub async fn start(&self) -> Result<(), BatchError> {
        {
            let mut state = lock(&self.state);
            if *state != RunState::Stopped {
                return Err(BatchError::InvalidState {
                    action: "start",
                    state: *state,
                });
            }
            *state = RunState::Starting;
        }

        info!(accumulator = %self.name, "starting batch accumulator");
        match self.launch().await {
            Ok(()) => {
                *lock(&self.state) = RunState::Running;
                let policy = self.policy();
                info!(
                    accumulator = %self.name,
                    batch_size = policy.batch_size,
                    out_batch_size = policy.out_batch_size.map_or(0, |n| n.get()),
                    batch_timeout = ?policy.batch_timeout,
                    "batch accumulator running"
                );
                Ok(())
            }
            Err(e) => {
                *lock(&self.state) = RunState::Stopped;
                warn!(accumulator = %self.name, error = %e, "batch accumulator failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<(), BatchError> {
        let source = self
            .provider
            .acquire()
            .await
            .map_err(|e| startup_error("acquire source", e))?;

        // Sink first: nothing may be received before it can be delivered.
        self.sink
            .start()
            .await
            .map_err(|e| startup_error("start sink", e))?;

        if let Err(e) = source.start().await {
            if let Err(stop_err) = self.sink.stop().await {
                warn!(accumulator = %self.name, error = %stop_err, "failed to stop sink after startup failure");
            }
            return Err(startup_error("start source", e));
        }

        let (signal, run_allowed) = watch::channel(true);
        let cycle = Arc::new(
            BatchCycle::shared(
                &self.name,
                self.policy(),
                self.batch.clone(),
                source,
                self.sink.clone(),
                self.cycle_lock.clone(),
                self.stats.clone(),
            )
            .watching(run_allowed),
        );

        let worker = tokio::spawn(run_worker(
            cycle.clone(),
            self.reporter.clone(),
            self.name.clone(),
        ));

        *lock(&self.active) = Some(Active { cycle, signal });
        // A worker left over from an earlier run already has a closed signal
        // and exits on its own; its handle is simply detached.
        *lock(&self.worker) = Some(worker);
        self.stats.mark_started();
        Ok(())
    }

    /// Stop the worker, the sink and the source, and empty the batch.
    ///
    /// Does not wait for the in-flight cycle. A `receive` or `process` call
    /// already under way runs to completion, but no new one is started once
    /// this returns, and a message returned by that last receive is dropped.
    /// Use [`shutdown`](Self::shutdown) to also wait for the worker task.
    /// Stopping a stopped accumulator is a no-op.
    pub async fn stop(&self) -> Result<(), BatchError> {
        {
            let mut state = lock(&self.state);
            match *state {
                RunState::Stopped | RunState::Stopping => return Ok(()),
                RunState::Starting => {
                    return Err(BatchError::InvalidState {
                        action: "stop",
                        state: RunState::Starting,
                    })
                }
                RunState::Running => *state = RunState::Stopping,
            }
        }

        info!(accumulator = %self.name, "stopping batch accumulator");
        let active = lock(&self.active).take();
        let mut failures = Vec::new();
        if let Some(active) = active {
            // Receivers treat a closed channel as "stop" too.
            let _ = active.signal.send(false);
            drop(active.signal);

            if let Err(e) = self.sink.stop().await {
                failures.push(format!("sink: {e}"));
            }
            if let Err(e) = active.cycle.source().stop().await {
                failures.push(format!("source: {e}"));
            }
        }

        let dropped = self.batch.clear();
        if dropped > 0 {
            debug!(accumulator = %self.name, dropped, "cleared pending batch on stop");
        }
        *lock(&self.state) = RunState::Stopped;

        if failures.is_empty() {
            info!(accumulator = %self.name, "batch accumulator stopped");
            Ok(())
        } else {
            Err(BatchError::Shutdown(failures.join("; ")))
        }
    }

    /// Wait until the most recently spawned worker has exited.
    pub async fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(accumulator = %self.name, error = %e, "batch worker terminated abnormally");
            }
        }
    }

    /// [`stop`](Self::stop), then wait for the worker to exit.
    pub async fn shutdown(&self) -> Result<(), BatchError> {
        let result = self.stop().await;
        self.join().await;
        result
    }
}

impl<M: Send + 'static> fmt::Display for BatchAccumulator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchAccumulator[to: {}]", self.sink.name())
    }
}

// ── Worker loop ──────────────────────────────────────────────────────

async fn run_worker<M: Send + 'static>(
    cycle: Arc<BatchCycle<M>>,
    reporter: Arc<dyn FailureReporter>,
    name: String,
) {
    debug!(accumulator = %name, "batch worker started");
    while cycle.is_run_allowed() {
        if let Err(e) = cycle.run().await {
            reporter.handle(&e);
        }
        // Cycles that never block (e.g. batch_size = 0) must not starve the runtime.
        tokio::task::yield_now().await;
    }
    let dropped = cycle.clear_when_idle().await;
    debug!(accumulator = %name, dropped, "batch worker exited");
}

// ── AccumulatorBuilder ───────────────────────────────────────────────

/// Fluent builder for a [`BatchAccumulator`].
///
/// # Example
/// ```ignore
/// let accumulator = BatchAccumulator::builder(endpoint, sink)
///     .name("orders")
///     .policy(BatchPolicy::default().with_batch_size(500))
///     .build();
/// accumulator.start().await?;
/// ```
pub struct AccumulatorBuilder<M: Send + 'static> {
    name: String,
    provider: Arc<dyn SourceProvider<M>>,
    sink: Arc<dyn Sink<M>>,
    reporter: Option<Arc<dyn FailureReporter>>,
    policy: BatchPolicy,
}

impl<M: Send + 'static> AccumulatorBuilder<M> {
    pub fn new(provider: Arc<dyn SourceProvider<M>>, sink: Arc<dyn Sink<M>>) -> Self {
        Self {
            name: AccumulatorConfig::default().name,
            provider,
            sink,
            reporter: None,
            policy: BatchPolicy::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Take name and limits from a loaded config.
    pub fn config(mut self, config: &AccumulatorConfig) -> Self {
        self.name = config.name.clone();
        self.policy = BatchPolicy::from(&config.batch);
        self
    }

    /// Override the failure reporter (default: [`LoggingFailureReporter`]).
    pub fn reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> BatchAccumulator<M> {
        let reporter: Arc<dyn FailureReporter> = match self.reporter {
            Some(reporter) => reporter,
            None => Arc::new(LoggingFailureReporter::new(self.name.clone())),
        };
        BatchAccumulator {
            batch: Arc::new(Batch::with_capacity(self.policy.batch_size.min(1024))),
            name: self.name,
            provider: self.provider,
            sink: self.sink,
            reporter,
            policy: Mutex::new(self.policy),
            state: Mutex::new(RunState::Stopped),
            cycle_lock: Arc::new(tokio::sync::Mutex::new(())),
            stats: Arc::new(StatsRecorder::default()),
            active: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }
}
