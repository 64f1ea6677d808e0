//! Control commands and the channel that carries them to the command loop.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::{mpsc, watch};

use crate::error::{Result, TelemdError};

/// A control directive for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Keep tickers scheduled but skip sampling
    Pause,
    /// Resume sampling after a pause
    Resume,
}

impl FromStr for Command {
    type Err = TelemdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Command::Pause),
            "resume" | "unpause" => Ok(Command::Resume),
            other => Err(TelemdError::parse(format!("unknown command '{}'", other))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pause => write!(f, "pause"),
            Command::Resume => write!(f, "resume"),
        }
    }
}

/// Queue of commands plus the distinct stop signal that ends the loop.
pub struct CommandChannel {
    tx: mpsc::UnboundedSender<Command>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    stop: watch::Sender<bool>,
}

impl CommandChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);

        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            stop,
        }
    }

    /// Enqueue a command without waiting. Returns `false` if the loop has
    /// already terminated, in which case the command is dropped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Signal the loop to terminate. Safe to call repeatedly, and before the
    /// loop has started.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Process commands in arrival order until stop is signalled.
    ///
    /// Stop takes priority over queued commands, so the loop ends promptly
    /// even with a backlog; anything still queued is discarded. The queue is
    /// closed on exit so later sends fail. Can run only once.
    ///
    /// Returns the number of queued commands dropped at shutdown.
    pub async fn run_loop<F>(&self, mut handle: F) -> Result<usize>
    where
        F: FnMut(Command),
    {
        let mut rx = self.rx.lock().take().ok_or(TelemdError::AlreadyRunning)?;
        let mut stop = self.stop.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                command = rx.recv() => match command {
                    Some(command) => {
                        log::debug!("received command {}", command);
                        handle(command);
                    }
                    None => break,
                },
            }
        }

        rx.close();
        let discarded = std::iter::from_fn(|| rx.try_recv().ok()).count();
        if discarded > 0 {
            log::warn!("command loop stopped, dropping {} queued command(s)", discarded);
        }
        log::info!("command loop terminated");
        Ok(discarded)
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the stop flag is set (or its sender is gone).
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
