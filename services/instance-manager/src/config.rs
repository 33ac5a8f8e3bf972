//! Configuration for the instance manager.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bsm_reconcile::{ReconcilerConfig, DEFAULT_CRASH_LOG_TAIL_LINES};

/// Instance manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace that holds instance workloads and events.
    pub namespace: String,

    /// Cluster API server URL.
    pub kube_api_url: String,

    /// Service account token. A missing file means unauthenticated requests.
    pub kube_token_file: String,

    /// Directory holding the object store database.
    pub state_dir: String,

    /// Seconds between reconciliation passes.
    pub reconcile_interval_secs: u64,

    /// Log lines captured from crashed workloads.
    pub crash_log_tail_lines: u32,

    /// Binary invoked inside engine and replica workloads.
    pub engine_binary: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let reconcile_interval_secs = get("BSM_RECONCILE_INTERVAL_SECS", "5")
            .parse()
            .context("invalid BSM_RECONCILE_INTERVAL_SECS")?;

        let crash_log_tail_lines = get(
            "BSM_CRASH_LOG_TAIL_LINES",
            &DEFAULT_CRASH_LOG_TAIL_LINES.to_string(),
        )
        .parse()
        .context("invalid BSM_CRASH_LOG_TAIL_LINES")?;

        Ok(Self {
            namespace: get("BSM_NAMESPACE", "longhorn-system"),
            kube_api_url: get("BSM_KUBE_API_URL", "https://kubernetes.default.svc"),
            kube_token_file: get(
                "BSM_KUBE_TOKEN_FILE",
                "/var/run/secrets/kubernetes.io/serviceaccount/token",
            ),
            state_dir: get("BSM_STATE_DIR", "/var/lib/bsm"),
            reconcile_interval_secs,
            crash_log_tail_lines,
            engine_binary: get("BSM_ENGINE_BINARY", "longhorn"),
            log_level: get("BSM_LOG_LEVEL", "info"),
        })
    }

    /// SQLite database holding engine and replica objects.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.state_dir).join("instances.db")
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            crash_log_tail_lines: self.crash_log_tail_lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, "longhorn-system");
        assert_eq!(config.reconcile_interval(), Duration::from_secs(5));
        assert_eq!(config.reconciler_config().crash_log_tail_lines, 100);
        assert_eq!(config.engine_binary, "longhorn");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/bsm/instances.db")
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BSM_NAMESPACE", "storage"),
            ("BSM_CRASH_LOG_TAIL_LINES", "20"),
            ("BSM_RECONCILE_INTERVAL_SECS", "30"),
            ("BSM_STATE_DIR", "/tmp/bsm"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "storage");
        assert_eq!(config.crash_log_tail_lines, 20);
        assert_eq!(config.reconcile_interval_secs, 30);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/bsm/instances.db"));
    }

    #[rstest]
    #[case("BSM_CRASH_LOG_TAIL_LINES", "lots")]
    #[case("BSM_CRASH_LOG_TAIL_LINES", "-1")]
    #[case("BSM_RECONCILE_INTERVAL_SECS", "5s")]
    #[case("BSM_RECONCILE_INTERVAL_SECS", "")]
    fn test_invalid_number_is_rejected(#[case] key: &str, #[case] value: &str) {
        let err = Config::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(err.to_string().contains(key));
    }
}
