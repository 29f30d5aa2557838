//! Controller configuration
//!
//! Values come from the command line, falling back to environment variables
//! and then to built-in defaults. Environment access goes through
//! [`EnvSource`] so tests never touch process state.

use std::time::Duration;

use crate::constants::DEFAULT_CONTRACT;

/// Environment variable overriding the Cluster API contract version
pub const CONTRACT_ENV: &str = "LATTICE_TOPOLOGY_CONTRACT";

/// Environment variable overriding the resync interval, in seconds
pub const RESYNC_SECS_ENV: &str = "LATTICE_TOPOLOGY_RESYNC_SECS";

/// Environment variable selecting `json` or `text` log lines
pub const LOG_FORMAT_ENV: &str = "LATTICE_LOG_FORMAT";

/// Default interval between reconciles of an unchanged Cluster
pub const DEFAULT_RESYNC_SECS: u64 = 300;

/// Watch timeout; must stay below the API server's 295s limit
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 25;

/// Source of environment variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of `key`, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Clone, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Settings for the topology controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Cluster API contract version templates are normalized to
    pub contract: String,
    /// Requeue interval after a successful reconcile
    pub resync_interval: Duration,
    /// Watcher timeout in seconds
    pub watch_timeout_secs: u32,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            contract: DEFAULT_CONTRACT.to_string(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }
}

impl TopologyConfig {
    /// Defaults overridden by whatever the environment sets
    ///
    /// Empty or unparseable values are ignored.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = Self::default();

        if let Some(contract) = env.var(CONTRACT_ENV).filter(|c| !c.is_empty()) {
            config.contract = contract;
        }
        if let Some(secs) = env
            .var(RESYNC_SECS_ENV)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            config.resync_interval = Duration::from_secs(secs);
        }

        config
    }

    /// Replace the contract version
    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = contract.into();
        self
    }

    /// Replace the resync interval
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }
}
