//! Telemetry daemon core.
//!
//! This module wires instruments to periodic tickers, runs them alongside a
//! command loop and owns the shutdown sequence that closes the telemetry
//! channel once production has ceased.

mod command;
mod runtime;
mod selector;
mod telemetry;
mod ticker;

pub use command::{Command, CommandChannel};
pub use runtime::Daemon;
pub use selector::{resolve_periods, select_instruments, ResolvedPeriods, DEFAULT_PERIOD};
pub use telemetry::{telemetry_channel, Sample, TelemetryChannel, TelemetryReceiver, TelemetrySender};
pub use ticker::{Ticker, TickerState};
