// Core business logic module

pub mod config;
pub mod daemon;
pub mod instruments;

// Re-export commonly used items
pub use config::Config;
pub use daemon::{Command, Daemon, Sample, TelemetryReceiver};
pub use instruments::{Instrument, InstrumentFactory, Value};
