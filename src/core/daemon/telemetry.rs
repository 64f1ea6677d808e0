//! The telemetry channel samples flow through.
//!
//! Many tickers push into it, one consumer drains it. The channel is either
//! open or closed; closing is a one-way transition and pushing afterwards is
//! a shutdown defect that aborts with a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::core::instruments::Value;

/// One timestamped measurement from one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl Sample {
    pub fn new(instrument: impl Into<String>, timestamp: DateTime<Utc>, value: Value) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            value,
        }
    }
}

struct Shared {
    // Pushes hold the read lock for the whole send; close takes the write lock
    sender: RwLock<Option<mpsc::Sender<Sample>>>,
    closed: AtomicBool,
}

/// Owning side of the channel: hands out senders and closes the channel.
pub struct TelemetryChannel {
    shared: Arc<Shared>,
}

/// Producer handle given to each ticker.
#[derive(Clone)]
pub struct TelemetrySender {
    shared: Arc<Shared>,
}

/// Consumer side. Yields `None` once the channel is closed and drained.
pub struct TelemetryReceiver {
    rx: mpsc::Receiver<Sample>,
}

/// Create a telemetry channel buffering up to `capacity` samples.
pub fn telemetry_channel(capacity: usize) -> (TelemetryChannel, TelemetryReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        sender: RwLock::new(Some(tx)),
        closed: AtomicBool::new(false),
    });

    (TelemetryChannel { shared }, TelemetryReceiver { rx })
}

impl TelemetryChannel {
    pub fn sender(&self) -> TelemetrySender {
        TelemetrySender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close the channel. Waits for in-flight pushes to finish, then drops
    /// the only underlying sender so the receiver drains and ends.
    ///
    /// Returns `false` if the channel was already closed.
    pub async fn close(&self) -> bool {
        let mut sender = self.shared.sender.write().await;
        self.shared.closed.store(true, Ordering::SeqCst);
        sender.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl TelemetrySender {
    /// Push a sample, waiting for buffer space.
    ///
    /// Returns `false` if the consumer has gone away and the sample was
    /// discarded.
    ///
    /// # Panics
    ///
    /// Panics if the channel has been closed. Closing happens only after every
    /// producer has stopped, so a push after close means the shutdown join
    /// was unsound.
    pub async fn push(&self, sample: Sample) -> bool {
        let sender = self.shared.sender.read().await;
        match sender.as_ref() {
            Some(tx) => tx.send(sample).await.is_ok(),
            None => panic!(
                "sample from instrument `{}` pushed after the telemetry channel was closed: \
                 shutdown closed the channel before every ticker had stopped",
                sample.instrument
            ),
        }
    }
}

impl TelemetryReceiver {
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Blocking variant of [`TelemetryReceiver::recv`] for consumers on a
    /// plain thread. Must not be called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<Sample> {
        self.rx.blocking_recv()
    }

    /// Take a buffered sample without waiting.
    pub fn try_recv(&mut self) -> Option<Sample> {
        self.rx.try_recv().ok()
    }
}
