//! Environment-driven configuration (SPEC_FULL.md §6 "Configuration").
//!
//! Every field is optional at the environment layer; `MonitorConfig::default()`
//! encodes the specification's defaults and `from_env` overlays `K0RDENT_MCP_*`
//! variables over them, following the teacher's preference for explicit,
//! typed configuration over a generic config crate.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Default subscription timeout, used when the subscribe URI omits `timeout`.
    pub default_timeout: Duration,
    /// Maximum subscriptions a single session may hold concurrently.
    pub per_client_cap: usize,
    /// Maximum subscriptions across all sessions.
    pub global_cap: usize,
    /// Token-bucket burst size for the rate-limit stage (C3 stage 5).
    pub rate_limit_burst: u32,
    /// Minimum interval between non-transition emits once the burst is spent.
    pub rate_limit_interval: Duration,
    /// Maximum watch reconnection attempts before a stream is declared unavailable.
    pub reconnect_max_attempts: u32,
    /// Base delay for the reconnection backoff (doubled on each attempt).
    pub reconnect_backoff_base: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(3600),
            per_client_cap: 10,
            global_cap: 100,
            rate_limit_burst: 3,
            rate_limit_interval: Duration::from_secs(15),
            reconnect_max_attempts: 3,
            reconnect_backoff_base: Duration::from_secs(1),
        }
    }
}

impl MonitorConfig {
    /// Overlay `K0RDENT_MCP_*` environment variables over the defaults.
    /// Malformed values are ignored (the default is kept) rather than
    /// failing startup, matching the best-effort spirit of the subsystem.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u64("K0RDENT_MCP_DEFAULT_TIMEOUT_SECS") {
            cfg.default_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("K0RDENT_MCP_PER_CLIENT_CAP") {
            cfg.per_client_cap = v;
        }
        if let Some(v) = env_usize("K0RDENT_MCP_GLOBAL_CAP") {
            cfg.global_cap = v;
        }
        if let Some(v) = env_u32("K0RDENT_MCP_RATE_LIMIT_BURST") {
            cfg.rate_limit_burst = v;
        }
        if let Some(v) = env_u64("K0RDENT_MCP_RATE_LIMIT_INTERVAL_SECS") {
            cfg.rate_limit_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_u32("K0RDENT_MCP_RECONNECT_MAX_ATTEMPTS") {
            cfg.reconnect_max_attempts = v;
        }
        if let Some(v) = env_u64("K0RDENT_MCP_RECONNECT_BACKOFF_BASE_SECS") {
            cfg.reconnect_backoff_base = Duration::from_secs(v);
        }

        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.default_timeout, Duration::from_secs(3600));
        assert_eq!(cfg.per_client_cap, 10);
        assert_eq!(cfg.global_cap, 100);
        assert_eq!(cfg.rate_limit_burst, 3);
        assert_eq!(cfg.rate_limit_interval, Duration::from_secs(15));
        assert_eq!(cfg.reconnect_max_attempts, 3);
        assert_eq!(cfg.reconnect_backoff_base, Duration::from_secs(1));
    }
}
