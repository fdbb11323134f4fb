//! Test doubles shared by the accumulator integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use batchline_accumulator::{
    BatchError, CycleError, FailureReporter, Phase, Sink, Source, SourceProvider,
};

pub type Msg = &'static str;

// ── Source ──────────────────────────────────────────────────────────

/// Yields queued messages immediately, then idles until each timeout.
#[derive(Default)]
pub struct ScriptedSource {
    queue: Mutex<VecDeque<Msg>>,
    fail_when_empty: AtomicBool,
    pub receives: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
}

impl ScriptedSource {
    pub fn with(messages: &[Msg]) -> Arc<Self> {
        let source = Self::default();
        source.push(messages);
        Arc::new(source)
    }

    pub fn push(&self, messages: &[Msg]) {
        self.queue.lock().unwrap().extend(messages.iter().copied());
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Return a receive error instead of idling once the queue is drained.
    pub fn fail_when_empty(&self) {
        self.fail_when_empty.store(true, Ordering::SeqCst);
    }

    pub fn receive_count(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source<Msg> for ScriptedSource {
    async fn receive(&self, timeout: Duration) -> Result<Option<Msg>, BatchError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(message) => Ok(Some(message)),
            None if self.fail_when_empty.load(Ordering::SeqCst) => {
                Err(BatchError::Receive("scripted source exhausted".into()))
            }
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn start(&self) -> Result<(), BatchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BatchError::Startup("source refused to start".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BatchError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Yields a message every `interval`, regardless of the timeout it is given.
pub struct TickingSource {
    interval: Duration,
    pub receives: AtomicUsize,
}

impl TickingSource {
    pub fn every(interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            receives: AtomicUsize::new(0),
        })
    }

    pub fn receive_count(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source<Msg> for TickingSource {
    async fn receive(&self, _timeout: Duration) -> Result<Option<Msg>, BatchError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.interval).await;
        Ok(Some("tick"))
    }
}

/// Provider handing out one fixed source.
pub struct FixedProvider(pub Arc<dyn Source<Msg>>);

#[async_trait]
impl SourceProvider<Msg> for FixedProvider {
    async fn acquire(&self) -> Result<Arc<dyn Source<Msg>>, BatchError> {
        Ok(self.0.clone())
    }
}

/// Provider handing out one shared [`ScriptedSource`].
pub struct ScriptedProvider {
    pub source: Arc<ScriptedSource>,
    pub fail: bool,
}

impl ScriptedProvider {
    pub fn new(source: Arc<ScriptedSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            fail: false,
        })
    }

    pub fn failing(source: Arc<ScriptedSource>) -> Arc<Self> {
        Arc::new(Self { source, fail: true })
    }
}

#[async_trait]
impl SourceProvider<Msg> for ScriptedProvider {
    async fn acquire(&self) -> Result<Arc<dyn Source<Msg>>, BatchError> {
        if self.fail {
            return Err(BatchError::Receive("endpoint unavailable".into()));
        }
        Ok(self.source.clone())
    }
}

// ── Sink ────────────────────────────────────────────────────────────

/// Records delivered messages; optionally fails or panics on one message,
/// or fails the first attempt at every message.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Msg>>,
    fail_on: Mutex<Option<Msg>>,
    panic_on: Mutex<Option<Msg>>,
    fail_first_attempt: AtomicBool,
    attempted: Mutex<HashSet<Msg>>,
    pub attempts: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(message: Msg) -> Arc<Self> {
        let sink = Self::default();
        *sink.fail_on.lock().unwrap() = Some(message);
        Arc::new(sink)
    }

    pub fn panicking_on(message: Msg) -> Arc<Self> {
        let sink = Self::default();
        *sink.panic_on.lock().unwrap() = Some(message);
        Arc::new(sink)
    }

    pub fn failing_each_once() -> Arc<Self> {
        let sink = Self::default();
        sink.fail_first_attempt.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Msg> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink<Msg> for RecordingSink {
    async fn process(&self, message: Msg) -> Result<(), BatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.panic_on.lock().unwrap() == Some(message) {
            panic!("sink blew up on {message}");
        }
        if *self.fail_on.lock().unwrap() == Some(message) {
            return Err(BatchError::Process(format!("cannot process {message}")));
        }
        if self.fail_first_attempt.load(Ordering::SeqCst)
            && self.attempted.lock().unwrap().insert(message)
        {
            return Err(BatchError::Process(format!("first attempt at {message} refused")));
        }
        self.delivered.lock().unwrap().push(message);
        Ok(())
    }

    async fn start(&self) -> Result<(), BatchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BatchError::Startup("sink refused to start".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BatchError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ── Reporter ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reported {
    pub phase: Phase,
    pub discarded: usize,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Reported>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<Reported> {
        self.reports.lock().unwrap().clone()
    }
}

impl FailureReporter for RecordingReporter {
    fn handle(&self, error: &CycleError) {
        self.reports.lock().unwrap().push(Reported {
            phase: error.phase,
            discarded: error.discarded,
            message: error.source.to_string(),
        });
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Poll `condition` every 5ms until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
