//! Daemon configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings for the callbrief daemon.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// libSQL database file.
    pub db_path: String,
    /// How often to scan inboxes.
    pub scan_interval: Duration,
    /// Messages fetched per scan.
    pub scan_batch_size: usize,
    /// How often the scheduler tick runs.
    pub schedule_tick: Duration,
    /// How often in-flight call statuses are reconciled.
    pub reconcile_tick: Duration,
    /// Spool directory feeding the dev message source; `None` disables
    /// inbox scanning (the call side still runs).
    pub spool_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/callbrief.db".to_string(),
            scan_interval: Duration::from_secs(300),
            scan_batch_size: 50,
            schedule_tick: Duration::from_secs(60),
            reconcile_tick: Duration::from_secs(30),
            spool_dir: None,
        }
    }
}

impl AppConfig {
    /// Build from `CALLBRIEF_*` environment variables, with defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("CALLBRIEF_DB_PATH").unwrap_or(defaults.db_path),
            scan_interval: env_secs("CALLBRIEF_SCAN_INTERVAL_SECS", defaults.scan_interval),
            scan_batch_size: std::env::var("CALLBRIEF_SCAN_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.scan_batch_size),
            schedule_tick: env_secs("CALLBRIEF_SCHEDULE_TICK_SECS", defaults.schedule_tick),
            reconcile_tick: env_secs("CALLBRIEF_RECONCILE_TICK_SECS", defaults.reconcile_tick),
            spool_dir: std::env::var("CALLBRIEF_SPOOL_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert!(config.scan_batch_size > 0);
        assert!(config.schedule_tick < config.scan_interval);
        assert!(config.spool_dir.is_none());
    }
}
