//! Daemon orchestrator.
//!
//! Owns the instrument set, one ticker per active instrument, the telemetry
//! channel and the command channel, and sequences their lifecycle:
//!
//! 1. [`Daemon::run`] spawns every ticker and the command loop.
//! 2. [`Daemon::stop`] signals all of them and returns immediately.
//! 3. `run` waits until the command loop has ended and every ticker task has
//!    finished, and only then closes the telemetry channel.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::command::{Command, CommandChannel};
use super::selector::{resolve_periods, select_instruments};
use super::telemetry::{telemetry_channel, TelemetryChannel, TelemetryReceiver};
use super::ticker::{Ticker, TickerState};
use crate::core::config::Config;
use crate::core::instruments::{
    build_instruments, new_instrument_factory, InstrumentFactory, InstrumentSet,
};
use crate::error::{Result, TelemdError};
use crate::platform::HostPaths;

pub struct Daemon {
    instruments: InstrumentSet,
    tickers: BTreeMap<String, Arc<Ticker>>,
    telemetry: TelemetryChannel,
    commands: Arc<CommandChannel>,
    paused: Arc<watch::Sender<bool>>,
    started: AtomicBool,
}

impl Daemon {
    /// Build a daemon with the instrument factory for this host's
    /// architecture. The returned receiver is the consumer end of the
    /// telemetry channel.
    pub fn new(cfg: &Config) -> (Self, TelemetryReceiver) {
        let paths = HostPaths::default().with_cgroup_root(&cfg.cgroup_root);
        let factory = new_instrument_factory(std::env::consts::ARCH, paths);
        Self::with_factory(cfg, factory.as_ref())
    }

    pub fn with_factory(cfg: &Config, factory: &dyn InstrumentFactory) -> (Self, TelemetryReceiver) {
        Self::with_instruments(cfg, build_instruments(factory, &cfg.instruments))
    }

    /// Build a daemon over an explicit full instrument set. Enable/disable
    /// lists and periods are still taken from `cfg`.
    pub fn with_instruments(cfg: &Config, all: InstrumentSet) -> (Self, TelemetryReceiver) {
        let instruments = select_instruments(
            all,
            cfg.instruments.disable.as_deref(),
            cfg.instruments.enable.as_deref(),
        );
        let periods = resolve_periods(instruments.keys().map(String::as_str), &cfg.instruments);

        let (telemetry, receiver) = telemetry_channel(cfg.telemetry_buffer.max(1));
        let (paused, _) = watch::channel(false);

        let tickers = instruments
            .iter()
            .map(|(key, instrument)| {
                let ticker = Ticker::new(
                    key.clone(),
                    Arc::clone(instrument),
                    periods.period(key),
                    telemetry.sender(),
                    paused.subscribe(),
                );
                (key.clone(), Arc::new(ticker))
            })
            .collect();

        let daemon = Self {
            instruments,
            tickers,
            telemetry,
            commands: Arc::new(CommandChannel::new()),
            paused: Arc::new(paused),
            started: AtomicBool::new(false),
        };

        (daemon, receiver)
    }

    /// Run every ticker and the command loop until [`Daemon::stop`], then
    /// close the telemetry channel.
    ///
    /// Returns only once the command loop has terminated and every ticker
    /// has stopped. A daemon runs at most once; later calls fail with
    /// [`TelemdError::AlreadyRunning`].
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TelemdError::AlreadyRunning);
        }

        log::info!(
            "starting {} ticker(s): {:?}",
            self.tickers.len(),
            self.active_instruments()
        );

        // Each task is registered with the join set by `spawn` itself, before
        // it gets a chance to run.
        let mut tickers = JoinSet::new();
        for ticker in self.tickers.values() {
            let ticker = Arc::clone(ticker);
            tickers.spawn(async move { ticker.run().await });
        }

        let commands = Arc::clone(&self.commands);
        let paused = Arc::clone(&self.paused);
        let command_loop = tokio::spawn(async move {
            commands
                .run_loop(|command| handle_command(&paused, command))
                .await
        });

        while let Some(result) = tickers.join_next().await {
            if let Err(e) = result {
                log::error!("ticker task failed: {}", e);
            }
        }
        log::info!("all tickers stopped");

        match command_loop.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::error!("command loop failed: {}", e),
            Err(e) => log::error!("command loop task failed: {}", e),
        }

        log::info!("closing telemetry channel");
        self.telemetry.close().await;

        Ok(())
    }

    /// Begin shutdown: stop the command loop and every ticker. Does not wait;
    /// [`Daemon::run`] returns once they have all finished.
    pub fn stop(&self) {
        log::info!("stopping daemon");
        self.commands.stop();

        for (key, ticker) in &self.tickers {
            log::info!("stopping ticker {}", key);
            ticker.stop();
        }
    }

    /// Submit a command without waiting for it to be handled. Commands sent
    /// after the command loop has terminated are dropped with a warning.
    pub fn send(&self, command: Command) {
        if !self.commands.send(command) {
            log::warn!("command loop has terminated, dropping command {}", command);
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether the telemetry channel has been closed, i.e. `run` completed.
    pub fn is_closed(&self) -> bool {
        self.telemetry.is_closed()
    }

    pub fn active_instruments(&self) -> Vec<&str> {
        self.instruments.keys().map(String::as_str).collect()
    }

    pub fn periods(&self) -> BTreeMap<&str, Duration> {
        self.tickers
            .iter()
            .map(|(key, ticker)| (key.as_str(), ticker.period()))
            .collect()
    }

    pub fn ticker_states(&self) -> BTreeMap<&str, TickerState> {
        self.tickers
            .iter()
            .map(|(key, ticker)| (key.as_str(), ticker.state()))
            .collect()
    }
}

fn handle_command(paused: &watch::Sender<bool>, command: Command) {
    let pause = match command {
        Command::Pause => true,
        Command::Resume => false,
    };

    if paused.send_replace(pause) == pause {
        log::debug!("ignoring {}, daemon already in that state", command);
    } else if pause {
        log::info!("pausing telemetry collection");
    } else {
        log::info!("resuming telemetry collection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instruments::{Instrument, Value};

    struct Constant(f64);

    impl Instrument for Constant {
        fn measure(&self) -> Result<Value> {
            Ok(Value::Scalar(self.0))
        }
    }

    fn instruments(keys: &[&str]) -> InstrumentSet {
        keys.iter()
            .map(|k| (k.to_string(), Arc::new(Constant(1.0)) as Arc<dyn Instrument>))
            .collect()
    }

    #[test]
    fn test_construction_applies_selection_and_periods() {
        let mut cfg = Config::default();
        cfg.instruments.disable = Some(vec!["load".to_string()]);
        cfg.instruments.set_period("cpu", Duration::from_millis(250));

        let (daemon, _receiver) = Daemon::with_instruments(&cfg, instruments(&["cpu", "load", "ram"]));

        assert_eq!(daemon.active_instruments(), vec!["cpu", "ram"]);
        assert_eq!(daemon.periods()["cpu"], Duration::from_millis(250));
        assert_eq!(daemon.periods()["ram"], Duration::from_secs(1));
        assert!(daemon
            .ticker_states()
            .values()
            .all(|&s| s == TickerState::Idle));
    }

    #[test]
    fn test_pause_resume_handling() {
        let (paused, _) = watch::channel(false);

        handle_command(&paused, Command::Pause);
        assert!(*paused.borrow());
        handle_command(&paused, Command::Pause);
        assert!(*paused.borrow());
        handle_command(&paused, Command::Resume);
        assert!(!*paused.borrow());
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let (daemon, mut receiver) = Daemon::with_instruments(&Config::default(), instruments(&["cpu"]));

        daemon.stop();
        daemon.run().await.unwrap();

        assert!(daemon.is_closed());
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let (daemon, _receiver) = Daemon::with_instruments(&Config::default(), instruments(&[]));

        daemon.stop();
        daemon.run().await.unwrap();
        assert!(matches!(daemon.run().await, Err(TelemdError::AlreadyRunning)));
    }
}
