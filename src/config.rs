use std::path::PathBuf;
use std::time::Duration;

use crate::limits::*;
use crate::model::Ms;

/// Process settings, read from `SEATLOCK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub hold_ttl_ms: Ms,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            hold_ttl_ms: DEFAULT_HOLD_TTL_MS,
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS as u64),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values fall back to the
    /// defaults, as do zero durations.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("SEATLOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let hold_ttl_ms = parsed::<u64>(&lookup, "SEATLOCK_HOLD_TTL_SECS")
            .filter(|&s| s > 0)
            .and_then(|s| Ms::try_from(s.saturating_mul(1_000)).ok())
            .unwrap_or(defaults.hold_ttl_ms);
        let sweep_interval = parsed::<u64>(&lookup, "SEATLOCK_SWEEP_INTERVAL_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        let compact_threshold = parsed(&lookup, "SEATLOCK_COMPACT_THRESHOLD")
            .unwrap_or(defaults.compact_threshold);
        let metrics_port = parsed(&lookup, "SEATLOCK_METRICS_PORT");

        Self {
            data_dir,
            hold_ttl_ms,
            sweep_interval,
            compact_threshold,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
        assert_eq!(Config::default().hold_ttl_ms, 300_000);
        assert_eq!(Config::default().sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn reads_every_key() {
        let cfg = Config::from_lookup(lookup(&[
            ("SEATLOCK_DATA_DIR", "/var/lib/seatlock"),
            ("SEATLOCK_HOLD_TTL_SECS", "600"),
            ("SEATLOCK_SWEEP_INTERVAL_SECS", "15"),
            ("SEATLOCK_COMPACT_THRESHOLD", "50"),
            ("SEATLOCK_METRICS_PORT", "9100"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/seatlock"));
        assert_eq!(cfg.hold_ttl_ms, 600_000);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(15));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/seatlock/reservations.wal"));
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("SEATLOCK_HOLD_TTL_SECS", "0"),
            ("SEATLOCK_SWEEP_INTERVAL_SECS", "soon"),
            ("SEATLOCK_METRICS_PORT", "70000"),
        ]));
        assert_eq!(cfg.hold_ttl_ms, DEFAULT_HOLD_TTL_MS);
        assert_eq!(cfg.sweep_interval, Config::default().sweep_interval);
        assert_eq!(cfg.metrics_port, None);
    }
}
