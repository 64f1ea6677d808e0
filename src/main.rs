use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use colored::*;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use telemd::{Config, Daemon, TelemetryReceiver};

fn main() -> Result<()> {
    telemd::init_logging();

    let config_arg = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("Configuration file (defaults to <config dir>/telemd/config.json)")
        .value_parser(clap::value_parser!(PathBuf))
        .global(true);

    let matches = Command::new("telemd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("On-host telemetry daemon")
        .arg(config_arg)
        .subcommand(
            Command::new("run")
                .about("Sample instruments and write samples to stdout as JSON lines (default)")
                .long_about(
                    "Sample instruments and write samples to stdout as JSON lines\n\n\
                     Commands are read from stdin, one per line:\n    \
                     pause     Skip sampling until resumed\n    \
                     resume    Resume sampling\n    \
                     stop      Shut down",
                ),
        )
        .subcommand(
            Command::new("instruments")
                .about("Show the active instruments and their sampling periods"),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("instruments", sub_matches)) => handle_instruments_command(sub_matches),
        Some(("run", sub_matches)) => handle_run_command(sub_matches),
        _ => handle_run_command(&matches),
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config file: {:?}", path)),
        None => Config::load().context("Failed to load configuration"),
    }
}

fn handle_instruments_command(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let (daemon, _receiver) = Daemon::new(&config);

    println!("{}", "Active instruments:".white());
    for (key, period) in daemon.periods() {
        println!("  {:<12} every {} ms", key.cyan().bold(), period.as_millis());
    }

    Ok(())
}

fn handle_run_command(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .thread_name("telemd-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let (daemon, receiver) = Daemon::new(&config);
    let daemon = Arc::new(daemon);

    // Setup Ctrl+C / SIGTERM handler
    let signal_daemon = Arc::clone(&daemon);
    ctrlc::set_handler(move || {
        log::info!("termination signal received");
        signal_daemon.stop();
    })
    .context("Failed to set signal handler")?;

    spawn_command_reader(Arc::clone(&daemon))?;
    let sink = spawn_stdout_sink(Arc::clone(&daemon), receiver)?;

    runtime.block_on(daemon.run())?;

    match sink.join() {
        Ok(count) => log::info!("wrote {} samples", count),
        Err(_) => log::error!("telemetry sink panicked"),
    }

    Ok(())
}

/// Forward `pause`/`resume`/`stop` lines from stdin to the daemon.
fn spawn_command_reader(daemon: Arc<Daemon>) -> Result<()> {
    thread::Builder::new()
        .name("telemd-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("stop") {
                    daemon.stop();
                    break;
                }
                match line.parse() {
                    Ok(command) => daemon.send(command),
                    Err(e) => log::warn!("{}", e),
                }
            }
        })
        .context("Failed to spawn command reader")?;

    Ok(())
}

/// Drain the telemetry channel to stdout, one JSON object per line, until
/// the daemon closes it.
fn spawn_stdout_sink(daemon: Arc<Daemon>, receiver: TelemetryReceiver) -> Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name("telemd-sink".to_string())
        .spawn(move || run_sink(&daemon, receiver, std::io::stdout().lock()))
        .context("Failed to spawn telemetry sink")
}

/// Write samples to `out` until the channel ends. A failed write (e.g. a
/// closed pipe) shuts the daemon down, since nothing can consume its output.
fn run_sink<W: Write>(daemon: &Daemon, mut receiver: TelemetryReceiver, mut out: W) -> u64 {
    let mut written = 0u64;

    while let Some(sample) = receiver.blocking_recv() {
        let result = serde_json::to_writer(&mut out, &sample)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            log::error!("failed to write sample: {}", e);
            daemon.stop();
            break;
        }
        written += 1;
    }

    written
}
