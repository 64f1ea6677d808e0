use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemd::core::daemon::TickerState;
use telemd::core::instruments::{
    DefaultInstrumentFactory, Instrument, InstrumentSet, Value, ALL_KEYS,
};
use telemd::platform::HostPaths;
use telemd::{Command, Config, Daemon, Sample, TelemdError, TelemetryReceiver};
use tempfile::TempDir;

struct Counting {
    calls: AtomicU64,
}

impl Instrument for Counting {
    fn measure(&self) -> telemd::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Scalar(n as f64))
    }
}

struct Failing;

impl Instrument for Failing {
    fn measure(&self) -> telemd::Result<Value> {
        Err(TelemdError::instrument("sensor unplugged"))
    }
}

struct Slow(Duration);

impl Instrument for Slow {
    fn measure(&self) -> telemd::Result<Value> {
        std::thread::sleep(self.0);
        Ok(Value::Scalar(0.0))
    }
}

fn counting() -> Arc<dyn Instrument> {
    Arc::new(Counting {
        calls: AtomicU64::new(0),
    })
}

fn full_set() -> InstrumentSet {
    ALL_KEYS
        .iter()
        .map(|key| (key.to_string(), counting()))
        .collect()
}

fn drain(receiver: &mut TelemetryReceiver) -> Vec<Sample> {
    let mut samples = Vec::new();
    while let Some(sample) = receiver.try_recv() {
        samples.push(sample);
    }
    samples
}

fn count_by_key(samples: &[Sample]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for sample in samples {
        *counts.entry(sample.instrument.clone()).or_insert(0) += 1;
    }
    counts
}

fn spawn_run(daemon: &Arc<Daemon>) -> tokio::task::JoinHandle<telemd::Result<()>> {
    let daemon = Arc::clone(daemon);
    tokio::spawn(async move { daemon.run().await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enabled_instruments_sample_at_their_periods() {
    let mut config = Config::default();
    config.instruments.enable = Some(vec!["cpu".to_string(), "ram".to_string()]);
    config.instruments.set_period("cpu", Duration::from_millis(500));
    config.instruments.set_period("ram", Duration::from_secs(1));

    let (daemon, mut receiver) = Daemon::with_instruments(&config, full_set());
    let daemon = Arc::new(daemon);
    assert_eq!(daemon.active_instruments(), vec!["cpu", "ram"]);

    let run = spawn_run(&daemon);
    tokio::time::sleep(Duration::from_millis(2100)).await;
    daemon.stop();
    run.await.unwrap().unwrap();

    let samples = drain(&mut receiver);
    let counts = count_by_key(&samples);
    assert!(counts["cpu"] >= 4, "cpu samples: {:?}", counts);
    assert!(counts["ram"] >= 2, "ram samples: {:?}", counts);
    assert_eq!(counts.len(), 2);

    // Timestamps per instrument never go backwards
    for key in ["cpu", "ram"] {
        let stamps: Vec<_> = samples
            .iter()
            .filter(|s| s.instrument == key)
            .map(|s| s.timestamp)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    assert!(receiver.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_instruments_get_no_ticker() {
    let temp_dir = TempDir::new().unwrap();
    let paths = HostPaths {
        proc_root: temp_dir.path().join("proc"),
        cpu_root: temp_dir.path().join("cpu"),
        sys_class_net: temp_dir.path().join("net"),
        sys_block: temp_dir.path().join("block"),
        sys_class_drm: temp_dir.path().join("drm"),
        cgroup_root: temp_dir.path().join("cgroup"),
    };
    let factory = DefaultInstrumentFactory::new(paths);

    let mut config = Config::default();
    config.instruments.disable = Some(vec!["gpu_freq".to_string(), "gpu_util".to_string()]);

    let (daemon, mut receiver) = Daemon::with_factory(&config, &factory);
    let active = daemon.active_instruments();

    assert_eq!(active.len(), 10);
    assert!(!active.contains(&"gpu_freq"));
    assert!(!active.contains(&"gpu_util"));
    assert_eq!(daemon.periods().len(), 10);

    daemon.stop();
    daemon.run().await.unwrap();
    assert!(receiver.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_instrument_produces_no_samples() {
    let mut config = Config::default();
    config.instruments.set_period("broken", Duration::from_millis(10));
    config.instruments.set_period("cpu", Duration::from_millis(10));

    let mut instruments = InstrumentSet::new();
    instruments.insert("broken".to_string(), Arc::new(Failing));
    instruments.insert("cpu".to_string(), counting());

    let (daemon, mut receiver) = Daemon::with_instruments(&config, instruments);
    let daemon = Arc::new(daemon);

    let run = spawn_run(&daemon);
    tokio::time::sleep(Duration::from_millis(100)).await;
    daemon.stop();
    run.await.unwrap().unwrap();

    let counts = count_by_key(&drain(&mut receiver));
    assert!(!counts.contains_key("broken"));
    assert!(counts["cpu"] > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_completes_with_slow_instrument() {
    let mut config = Config::default();
    config.instruments.set_period("slow", Duration::from_millis(10));

    let mut instruments = InstrumentSet::new();
    instruments.insert("slow".to_string(), Arc::new(Slow(Duration::from_millis(200))));

    let (daemon, _receiver) = Daemon::with_instruments(&config, instruments);
    let daemon = Arc::new(daemon);

    let run = spawn_run(&daemon);
    tokio::time::sleep(Duration::from_millis(50)).await;
    daemon.stop();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("daemon did not shut down")
        .unwrap()
        .unwrap();
    assert!(daemon.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_completes_when_consumer_is_not_draining() {
    let mut config = Config::default();
    config.telemetry_buffer = 1;
    config.instruments.set_period("cpu", Duration::from_millis(1));
    config.instruments.set_period("ram", Duration::from_millis(1));

    let mut instruments = InstrumentSet::new();
    instruments.insert("cpu".to_string(), counting());
    instruments.insert("ram".to_string(), counting());

    let (daemon, mut receiver) = Daemon::with_instruments(&config, instruments);
    let daemon = Arc::new(daemon);

    let run = spawn_run(&daemon);
    tokio::time::sleep(Duration::from_millis(50)).await;
    daemon.stop();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("daemon did not shut down")
        .unwrap()
        .unwrap();

    assert_eq!(drain(&mut receiver).len(), 1);
    assert!(receiver.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_start_stop_never_pushes_after_close() {
    for round in 0..50u64 {
        let mut config = Config::default();
        config.telemetry_buffer = 4;
        for key in ALL_KEYS {
            config.instruments.set_period(key, Duration::from_millis(1));
        }

        let (daemon, mut receiver) = Daemon::with_instruments(&config, full_set());
        let daemon = Arc::new(daemon);

        let consumer = tokio::spawn(async move {
            let mut received = 0usize;
            while receiver.recv().await.is_some() {
                received += 1;
            }
            received
        });

        let run = spawn_run(&daemon);
        tokio::time::sleep(Duration::from_micros(round * 97 % 3000)).await;
        daemon.stop();

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("daemon did not shut down")
            .unwrap()
            .unwrap();

        assert!(daemon.is_closed());
        assert!(daemon
            .ticker_states()
            .values()
            .all(|&state| state == TickerState::Stopped));

        // The consumer only finishes once the channel is closed and drained
        tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("receiver did not end")
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_and_resume() {
    let mut config = Config::default();
    config.instruments.set_period("cpu", Duration::from_millis(10));

    let mut instruments = InstrumentSet::new();
    instruments.insert("cpu".to_string(), counting());

    let (daemon, mut receiver) = Daemon::with_instruments(&config, instruments);
    let daemon = Arc::new(daemon);
    let run = spawn_run(&daemon);

    tokio::time::sleep(Duration::from_millis(50)).await;
    daemon.send(Command::Pause);
    tokio::time::timeout(Duration::from_secs(2), async {
        while !daemon.is_paused() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pause was not applied");

    // Anything already in flight lands shortly after the pause
    tokio::time::sleep(Duration::from_millis(50)).await;
    drain(&mut receiver);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(drain(&mut receiver).is_empty());

    daemon.send(Command::Resume);
    let sample = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("no sample after resume")
        .unwrap();
    assert_eq!(sample.instrument, "cpu");
    assert!(!daemon.is_paused());

    daemon.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_after_stop_is_dropped() {
    let (daemon, _receiver) = Daemon::with_instruments(&Config::default(), full_set());

    daemon.stop();
    daemon.run().await.unwrap();

    daemon.send(Command::Pause);
    assert!(!daemon.is_paused());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_runs_once() {
    let (daemon, _receiver) = Daemon::with_instruments(&Config::default(), full_set());

    daemon.stop();
    daemon.run().await.unwrap();

    assert!(matches!(daemon.run().await, Err(TelemdError::AlreadyRunning)));
}
