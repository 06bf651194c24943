//! # Config - environment-driven settings
//!
//! Every setting has a default and can be overridden by an environment
//! variable. Unparseable values fall back to the default.
//!
//! ```text
//! THUMBDB_HIDE_BLANK     hide zero-length records on open  (default: "false")
//! THUMBDB_AUTO_VERIFY    verify records after opening      (default: "false")
//! THUMBDB_AUTO_INDEX     build the hash index after open   (default: "true")
//! THUMBDB_SHUTDOWN_SECS  bounded wait for worker teardown  (default: 5)
//! THUMBDB_LOG            log filter when RUST_LOG is unset (default: "warn")
//! ```

use std::time::Duration;

pub const ENV_HIDE_BLANK: &str = "THUMBDB_HIDE_BLANK";
pub const ENV_AUTO_VERIFY: &str = "THUMBDB_AUTO_VERIFY";
pub const ENV_AUTO_INDEX: &str = "THUMBDB_AUTO_INDEX";
pub const ENV_SHUTDOWN_SECS: &str = "THUMBDB_SHUTDOWN_SECS";
pub const ENV_LOG: &str = "THUMBDB_LOG";

pub const DEFAULT_SHUTDOWN_SECS: u64 = 5;
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Reads a configuration value from the environment, falling back to `default`.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Move zero-length records out of the visible collection on open.
    pub hide_blank: bool,
    /// Verify every record right after a batch open.
    pub auto_verify: bool,
    /// Build the hash index right after a batch open.
    pub auto_index: bool,
    /// How long shutdown waits for a worker before giving up on it.
    pub shutdown_timeout: Duration,
    /// Default `tracing` filter directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hide_blank: false,
            auto_verify: false,
            auto_index: true,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_SECS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Loads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let d = Self::default();
        let get = |key: &str, default: String| lookup(key).unwrap_or(default);

        let secs: u64 = get(ENV_SHUTDOWN_SECS, d.shutdown_timeout.as_secs().to_string())
            .trim()
            .parse()
            .unwrap_or(DEFAULT_SHUTDOWN_SECS);

        Self {
            hide_blank: parse_bool(&get(ENV_HIDE_BLANK, d.hide_blank.to_string()), d.hide_blank),
            auto_verify: parse_bool(&get(ENV_AUTO_VERIFY, d.auto_verify.to_string()), d.auto_verify),
            auto_index: parse_bool(&get(ENV_AUTO_INDEX, d.auto_index.to_string()), d.auto_index),
            shutdown_timeout: Duration::from_secs(secs),
            log_filter: get(ENV_LOG, d.log_filter),
        }
    }
}

/// Accepts `true`/`false` plus the usual `1`/`0`, `yes`/`no`, `on`/`off`.
fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
