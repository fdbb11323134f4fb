//! In-process source backed by a tokio mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::BatchError;
use crate::traits::{Source, SourceProvider};

/// Pull side of an in-process channel.
///
/// Once every sender is gone the source behaves like an idle one: each
/// receive waits out its timeout and returns `None`.
pub struct ChannelSource<M> {
    rx: Mutex<mpsc::Receiver<M>>,
}

impl<M> ChannelSource<M> {
    pub fn new(rx: mpsc::Receiver<M>) -> Self {
        Self { rx: Mutex::new(rx) }
    }
}

#[async_trait]
impl<M: Send + 'static> Source<M> for ChannelSource<M> {
    async fn receive(&self, timeout: Duration) -> Result<Option<M>, BatchError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                drop(rx);
                debug!("channel closed, idling until receive timeout");
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

/// Hands out a shared [`ChannelSource`] and lets producers feed it.
pub struct ChannelEndpoint<M> {
    tx: mpsc::Sender<M>,
    source: Arc<ChannelSource<M>>,
}

impl<M: Send + 'static> ChannelEndpoint<M> {
    /// Endpoint buffering up to `capacity` unreceived messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            source: Arc::new(ChannelSource::new(rx)),
        }
    }

    /// Producer handle. Sending blocks while the buffer is full.
    pub fn sender(&self) -> mpsc::Sender<M> {
        self.tx.clone()
    }
}

#[async_trait]
impl<M: Send + 'static> SourceProvider<M> for ChannelEndpoint<M> {
    async fn acquire(&self) -> Result<Arc<dyn Source<M>>, BatchError> {
        Ok(self.source.clone())
    }
}
