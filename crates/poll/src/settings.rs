//! Poll timing knobs and per-family wait presets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConvergenceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub initial_delay: Duration,
    pub min_poll_interval: Duration,
    pub poll_interval: Duration,
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            min_poll_interval: Duration::from_millis(1000),
            poll_interval: Duration::from_secs(10),
            create_timeout: Duration::from_secs(30 * 60),
            update_timeout: Duration::from_secs(30 * 60),
            delete_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl PollSettings {
    /// Read `CONVERGE_*` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PollSettings::from_env`] with an injectable lookup.
    /// Unparseable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let num = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        Self {
            initial_delay: num("CONVERGE_POLL_DELAY_MS").map(Duration::from_millis).unwrap_or(d.initial_delay),
            min_poll_interval: num("CONVERGE_MIN_POLL_INTERVAL_MS").map(Duration::from_millis).unwrap_or(d.min_poll_interval),
            poll_interval: num("CONVERGE_POLL_INTERVAL_SECS").map(Duration::from_secs).unwrap_or(d.poll_interval),
            create_timeout: num("CONVERGE_CREATE_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(d.create_timeout),
            update_timeout: num("CONVERGE_UPDATE_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(d.update_timeout),
            delete_timeout: num("CONVERGE_DELETE_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(d.delete_timeout),
        }
    }

    fn spec(&self, target: &str, pending: &[&str], timeout: Duration) -> ConvergenceSpec {
        ConvergenceSpec::new(target, pending, timeout)
            .with_intervals(self.min_poll_interval.min(self.poll_interval), self.poll_interval)
            .with_initial_delay(self.initial_delay)
    }

    pub fn cluster_create(&self) -> ConvergenceSpec {
        use converge_core::labels::cluster::*;
        self.spec(RUNNING, &[PENDING, CREATING, UPGRADING], self.create_timeout)
    }

    pub fn cluster_update(&self) -> ConvergenceSpec {
        use converge_core::labels::cluster::*;
        self.spec(RUNNING, &[PENDING, CREATING, TERMINATING, UPGRADING], self.update_timeout)
    }

    pub fn cluster_delete(&self) -> ConvergenceSpec {
        use converge_core::labels::cluster::*;
        self.spec(TERMINATED, &[PENDING, CREATING, RUNNING, UPGRADING, TERMINATING], self.delete_timeout)
    }

    /// Jobs carry their own timeout; zero samples once.
    pub fn job_complete(&self, timeout: Duration) -> ConvergenceSpec {
        use converge_core::labels::job::*;
        self.spec(COMPLETE, &[QUEUED, EXECUTING], timeout)
    }

    pub fn agent_active(&self, timeout: Duration) -> ConvergenceSpec {
        use converge_core::labels::agent::*;
        self.spec(ACTIVE, &[ABSENT], timeout)
    }
}
