//! Input documents: node pool lists and simulation scenarios (YAML or JSON).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use converge_core::model::NodePool;
use converge_core::Classification;
use converge_poll::script::{Sample, ScriptedRefresher};
use converge_poll::{ConvergenceSpec, PollSettings};
use serde::{Deserialize, Serialize};

/// A bare list, or a cluster-spec shaped document with `node_pools`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoolsDoc {
    List(Vec<NodePool>),
    Spec { node_pools: Vec<NodePool> },
}

pub fn parse_pools(text: &str) -> Result<Vec<NodePool>> {
    let doc: PoolsDoc = serde_yaml::from_str(text).context("parsing node pool document")?;
    Ok(match doc {
        PoolsDoc::List(p) | PoolsDoc::Spec { node_pools: p } => p,
    })
}

pub fn read_pools(path: &Path) -> Result<Vec<NodePool>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_pools(&text).with_context(|| format!("in {}", path.display()))
}

/// What a not-found sample means in a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFound {
    #[default]
    Fatal,
    Success,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_identity")]
    pub identity: String,
    pub target: String,
    #[serde(default)]
    pub pending: Vec<String>,
    /// Zero samples once.
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub min_poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub initial_delay_ms: Option<u64>,
    #[serde(default)]
    pub not_found: NotFound,
    /// Label to retry under when `not_found` is `retry`.
    #[serde(default = "default_absent")]
    pub absent_label: String,
    pub samples: Vec<Sample>,
}

fn default_identity() -> String {
    "simulated".to_string()
}

fn default_absent() -> String {
    converge_core::labels::agent::ABSENT.to_string()
}

impl Scenario {
    pub fn parse(text: &str) -> Result<Self> {
        let s: Scenario = serde_yaml::from_str(text).context("parsing scenario")?;
        anyhow::ensure!(!s.samples.is_empty(), "scenario needs at least one sample");
        Ok(s)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Unset intervals come from `settings`.
    pub fn spec(&self, settings: &PollSettings) -> ConvergenceSpec {
        let pending: Vec<&str> = self.pending.iter().map(String::as_str).collect();
        let ms = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);
        let poll = ms(self.poll_interval_ms, settings.poll_interval);
        let min = ms(self.min_poll_interval_ms, settings.min_poll_interval.min(poll));
        ConvergenceSpec::new(&self.target, &pending, Duration::from_millis(self.timeout_ms))
            .with_intervals(min, poll)
            .with_initial_delay(ms(self.initial_delay_ms, settings.initial_delay))
    }

    pub fn refresher(&self) -> ScriptedRefresher {
        let r = ScriptedRefresher::new(&self.identity, self.samples.clone());
        match self.not_found {
            NotFound::Fatal => r,
            NotFound::Success => r.not_found_means(Classification::NotFoundAsSuccess),
            NotFound::Retry => r.not_found_means(Classification::Retryable { label: self.absent_label.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_from_list_or_spec() {
        let list = "- name: a\n  flavor: f\n  image: i\n  size: 2\n";
        assert_eq!(parse_pools(list).unwrap()[0].size, 2);
        let spec = r#"{"version": "1.29.3", "node_pools": [{"name": "b", "flavor": "f", "image": "i"}]}"#;
        assert_eq!(parse_pools(spec).unwrap()[0].name, "b");
        assert!(parse_pools("name: x").is_err());
    }

    #[test]
    fn scenario_defaults_and_spec() {
        let text = r#"
target: Terminated
pending: [Terminating]
timeout_ms: 5000
poll_interval_ms: 200
not_found: success
samples:
  - label: Terminating
  - not_found: Not found
"#;
        let s = Scenario::parse(text).unwrap();
        assert_eq!(s.identity, "simulated");
        assert_eq!(s.not_found, NotFound::Success);
        let spec = s.spec(&PollSettings::default());
        assert_eq!(spec.poll_interval, Duration::from_millis(200));
        assert_eq!(spec.min_poll_interval, Duration::from_millis(200));
        assert_eq!(spec.initial_delay, Duration::from_secs(1));
        spec.validate().unwrap();
    }

    #[test]
    fn empty_scenario_rejected() {
        assert!(Scenario::parse("target: Running\nsamples: []\n").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_runs_through_poller() {
        let s = Scenario::parse(
            "target: Running\npending: [Pending]\ntimeout_ms: 10000\npoll_interval_ms: 50\nsamples:\n  - label: Pending\n  - label: Running\n",
        )
        .unwrap();
        let r = s.refresher();
        let done = converge_poll::await_state(&r, &s.spec(&PollSettings::default()), &tokio_util::sync::CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done.attempts, 2);
    }
}
