//! Periodic driver for one instrument.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::command::stopped;
use super::telemetry::{Sample, TelemetrySender};
use crate::core::instruments::Instrument;
use crate::error::TelemdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Samples one instrument every `period` and pushes the result into the
/// telemetry channel.
pub struct Ticker {
    key: String,
    instrument: Arc<dyn Instrument>,
    period: Duration,
    telemetry: TelemetrySender,
    paused: watch::Receiver<bool>,
    state: Mutex<TickerState>,
    stop: watch::Sender<bool>,
}

impl Ticker {
    pub fn new(
        key: impl Into<String>,
        instrument: Arc<dyn Instrument>,
        period: Duration,
        telemetry: TelemetrySender,
        paused: watch::Receiver<bool>,
    ) -> Self {
        let (stop, _) = watch::channel(false);

        Self {
            key: key.into(),
            instrument,
            period,
            telemetry,
            paused,
            state: Mutex::new(TickerState::Idle),
            stop,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> TickerState {
        *self.state.lock()
    }

    /// Run the sampling loop until [`Ticker::stop`] is called.
    ///
    /// The first tick fires immediately; missed ticks are skipped. A ticker
    /// that is not idle (already running, or stopped before it started)
    /// returns at once. The state is `Stopped` when this returns.
    pub async fn run(&self) {
        {
            let mut state = self.state.lock();
            if *state != TickerState::Idle {
                log::debug!("ticker {} not started from state {:?}", self.key, *state);
                return;
            }
            *state = TickerState::Running;
        }
        let _stopped = MarkStopped(&self.state);

        log::debug!("ticker {} running every {:?}", self.key, self.period);

        let mut stop = self.stop.subscribe();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_timestamp: Option<DateTime<Utc>> = None;
        let mut consumer_gone = false;

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                _ = ticker.tick() => {
                    let paused = *self.paused.borrow();
                    if paused {
                        log::trace!("ticker {} paused, skipping tick", self.key);
                        continue;
                    }

                    let Some(sample) = self.sample(&mut last_timestamp) else {
                        continue;
                    };

                    // Deliver unless stop arrives while waiting for buffer space
                    tokio::select! {
                        biased;
                        delivered = self.telemetry.push(sample) => {
                            if !delivered && !consumer_gone {
                                log::warn!("telemetry consumer is gone, discarding {} samples", self.key);
                                consumer_gone = true;
                            }
                        }
                        _ = stopped(&mut stop) => {
                            log::debug!("ticker {} stopped while waiting to push, sample dropped", self.key);
                            break;
                        }
                    }
                }
            }
        }

        log::debug!("ticker {} stopped", self.key);
    }

    /// Ask the loop to exit after its current iteration. Idempotent, and
    /// safe to call before [`Ticker::run`].
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                TickerState::Idle => *state = TickerState::Stopped,
                TickerState::Running => *state = TickerState::Stopping,
                TickerState::Stopping | TickerState::Stopped => {}
            }
        }
        self.stop.send_replace(true);
    }

    fn sample(&self, last_timestamp: &mut Option<DateTime<Utc>>) -> Option<Sample> {
        match self.instrument.measure() {
            Ok(value) => {
                // Per-instrument timestamps never go backwards
                let timestamp = match *last_timestamp {
                    Some(last) => Utc::now().max(last),
                    None => Utc::now(),
                };
                *last_timestamp = Some(timestamp);
                Some(Sample::new(self.key.clone(), timestamp, value))
            }
            Err(e @ (TelemdError::Instrument(_) | TelemdError::Unsupported(_))) => {
                log::debug!("{}: no sample this tick: {}", self.key, e);
                None
            }
            Err(e) => {
                log::warn!("{}: sampling failed: {}", self.key, e);
                None
            }
        }
    }
}

/// Sets the ticker state to `Stopped` when the run loop exits, including by
/// unwinding out of an instrument.
struct MarkStopped<'a>(&'a Mutex<TickerState>);

impl Drop for MarkStopped<'_> {
    fn drop(&mut self) {
        *self.0.lock() = TickerState::Stopped;
    }
}
