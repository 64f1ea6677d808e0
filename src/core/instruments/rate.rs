use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Instant;

/// Turns cumulative counters into per-second rates between consecutive reads.
#[derive(Default)]
pub(crate) struct RateTracker {
    last: Mutex<Option<(Instant, BTreeMap<String, u64>)>>,
}

impl RateTracker {
    /// Record `counters` taken at `now` and return the rate since the
    /// previous call. The first call only records the baseline.
    pub(crate) fn update(
        &self,
        now: Instant,
        counters: BTreeMap<String, u64>,
    ) -> Option<BTreeMap<String, f64>> {
        let previous = self.last.lock().replace((now, counters.clone()));
        let (then, previous) = previous?;

        let elapsed = now.saturating_duration_since(then).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        Some(
            counters
                .iter()
                .filter_map(|(key, &current)| {
                    let before = previous.get(key)?;
                    Some((key.clone(), current.saturating_sub(*before) as f64 / elapsed))
                })
                .collect(),
        )
    }
}
