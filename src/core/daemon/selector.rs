//! Active instrument selection and period resolution.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::config::InstrumentsConfig;

/// Period used for instruments without a configured one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Resolve the active subset of `all`.
///
/// A non-empty disable list wins: everything except the named keys is kept
/// and the enable list is ignored. Otherwise a non-empty enable list keeps
/// only the named keys. Otherwise everything is kept. Unknown keys are
/// ignored in both lists.
pub fn select_instruments<T>(
    mut all: BTreeMap<String, T>,
    disable: Option<&[String]>,
    enable: Option<&[String]>,
) -> BTreeMap<String, T> {
    if let Some(disable) = disable.filter(|d| !d.is_empty()) {
        log::info!("disabling instruments {:?}", disable);
        for key in disable {
            all.remove(key);
        }
        return all;
    }

    if let Some(enable) = enable.filter(|e| !e.is_empty()) {
        log::info!("enabling instruments {:?}", enable);
        let mut selected = BTreeMap::new();
        for key in enable {
            if let Some(instrument) = all.remove(key) {
                selected.insert(key.clone(), instrument);
            }
        }
        return selected;
    }

    all
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPeriods {
    pub periods: BTreeMap<String, Duration>,
    /// Keys that fell back to [`DEFAULT_PERIOD`]
    pub defaulted: Vec<String>,
}

impl ResolvedPeriods {
    pub fn period(&self, key: &str) -> Duration {
        self.periods.get(key).copied().unwrap_or(DEFAULT_PERIOD)
    }
}

/// Look up the period for each key, defaulting (with one warning per key)
/// where none is configured.
pub fn resolve_periods<'a, I>(keys: I, cfg: &InstrumentsConfig) -> ResolvedPeriods
where
    I: IntoIterator<Item = &'a str>,
{
    let mut resolved = ResolvedPeriods::default();

    for key in keys {
        if resolved.periods.contains_key(key) {
            continue;
        }
        let period = match cfg.period(key) {
            Some(period) => period,
            None => {
                log::warn!(
                    "no period assigned for instrument {}, using {:?}",
                    key,
                    DEFAULT_PERIOD
                );
                resolved.defaulted.push(key.to_string());
                DEFAULT_PERIOD
            }
        };
        resolved.periods.insert(key.to_string(), period);
    }

    resolved
}
