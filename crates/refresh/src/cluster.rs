use std::sync::Arc;

use converge_core::client::ClusterClient;
use converge_core::labels::cluster as phase;
use converge_core::model::{Cluster, ClusterEvent};
use converge_core::{Classification, ClassifyContext, ConvergeError, ConvergeResult, ErrorClassifier, RemoteError};
use converge_poll::{Observation, StateRefresher};
use tracing::debug;

use crate::classify::ClusterErrors;

/// Event reasons containing any of these abort the wait.
pub const DEFAULT_FAILURE_MARKERS: &[&str] = &["Error", "Failed"];

/// Samples one cluster's phase, corrected for the control plane's known lag.
///
/// Rules, in priority order (events are not consulted while waiting for
/// `Terminated`):
/// 1. the most recent event's reason contains a failure marker: fatal
/// 2. phase `Running` while the apiserver still reports an older version
///    than requested: `Upgrading`
/// 3. a pool whose desired size differs from its healthy count, or a pool
///    set that does not match the desired set yet: `Pending`
/// 4. otherwise the remote phase verbatim
pub struct ClusterRefresher {
    client: Arc<dyn ClusterClient>,
    name: String,
    markers: Vec<String>,
}

impl ClusterRefresher {
    pub fn new(client: Arc<dyn ClusterClient>, name: &str) -> Self {
        Self { client, name: name.to_string(), markers: DEFAULT_FAILURE_MARKERS.iter().map(|m| m.to_string()).collect() }
    }

    pub fn with_failure_markers(mut self, markers: &[&str]) -> Self {
        self.markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    fn failing_event<'e>(&self, events: &'e [ClusterEvent]) -> Option<&'e ClusterEvent> {
        latest_event(events).filter(|ev| self.markers.iter().any(|m| ev.reason.contains(m.as_str())))
    }
}

/// Latest by timestamp; falls back to list order when timestamps are missing.
fn latest_event(events: &[ClusterEvent]) -> Option<&ClusterEvent> {
    if events.iter().all(|e| e.last_timestamp.is_some()) {
        // max_by_key keeps the last of equal keys
        events.iter().max_by_key(|e| e.last_timestamp)
    } else {
        events.last()
    }
}

/// Derive the effective phase of a fetched cluster.
pub fn effective_phase(cluster: &Cluster) -> (&str, Option<String>) {
    let (spec, status) = (&cluster.spec, &cluster.status);
    if status.phase == phase::RUNNING && !spec.version.is_empty() && spec.version != status.apiserver_version {
        return (
            phase::UPGRADING,
            Some(format!("apiserver reports {:?}, requested {:?}", status.apiserver_version, spec.version)),
        );
    }
    for want in &spec.node_pools {
        if let Some(have) = status.node_pools.iter().find(|s| s.name == want.name) {
            if have.healthy != want.size {
                return (phase::PENDING, Some(format!("node pool {} has {}/{} healthy nodes", want.name, have.healthy, want.size)));
            }
        }
    }
    if spec.node_pools.len() != status.node_pools.len() {
        return (
            phase::PENDING,
            Some(format!("{} node pools reported, {} desired", status.node_pools.len(), spec.node_pools.len())),
        );
    }
    (status.phase.as_str(), None)
}

#[async_trait::async_trait]
impl StateRefresher for ClusterRefresher {
    type Object = Cluster;

    fn family(&self) -> &'static str {
        "cluster"
    }

    fn identity(&self) -> &str {
        &self.name
    }

    async fn refresh(&self, target: &str) -> ConvergeResult<Observation<Cluster>> {
        let cluster = self.client.fetch(&self.name).await?;
        if target == phase::TERMINATED {
            let label = cluster.status.phase.clone();
            return Ok(Observation::new(cluster, label));
        }

        let events = self.client.fetch_events(&self.name).await?;
        if let Some(ev) = self.failing_event(&events) {
            debug!(cluster = %self.name, reason = %ev.reason, "failure event observed");
            return Err(ConvergeError::FatalEvent { reason: ev.reason.clone(), message: ev.message.clone() });
        }

        let (label, detail) = effective_phase(&cluster);
        let (label, detail) = (label.to_string(), detail);
        let mut obs = Observation::new(cluster, label);
        obs.detail = detail;
        Ok(obs)
    }

    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        ClusterErrors.classify(err, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::mock::settled_status;
    use converge_core::model::{ClusterSpec, NodePool};

    fn cluster(version: &str, sizes: &[(&str, i64)]) -> Cluster {
        let spec = ClusterSpec {
            version: version.into(),
            node_pools: sizes.iter().map(|(n, s)| NodePool { name: n.to_string(), size: *s, ..Default::default() }).collect(),
        };
        Cluster { name: "demo".into(), status: settled_status(&spec), spec }
    }

    #[test]
    fn settled_cluster_reports_remote_phase() {
        assert_eq!(effective_phase(&cluster("1.29.3", &[("a", 2)])).0, "Running");
    }

    #[test]
    fn version_lag_reads_as_upgrading() {
        let mut c = cluster("1.30.0", &[("a", 2)]);
        c.status.apiserver_version = "1.29.3".into();
        assert_eq!(effective_phase(&c).0, "Upgrading");
        c.spec.version.clear();
        assert_eq!(effective_phase(&c).0, "Running");
    }

    #[test]
    fn upgrading_only_overrides_running() {
        let mut c = cluster("1.30.0", &[]);
        c.status.apiserver_version = "1.29.3".into();
        c.status.phase = "Creating".into();
        assert_eq!(effective_phase(&c).0, "Creating");
    }

    #[test]
    fn unhealthy_or_missing_pools_read_as_pending() {
        let mut c = cluster("", &[("a", 3)]);
        c.status.node_pools[0].healthy = 1;
        let (label, detail) = effective_phase(&c);
        assert_eq!(label, "Pending");
        assert_eq!(detail.as_deref(), Some("node pool a has 1/3 healthy nodes"));

        let mut c = cluster("", &[("a", 3), ("b", 1)]);
        c.status.node_pools.pop();
        assert_eq!(effective_phase(&c).0, "Pending");
    }

    #[test]
    fn latest_event_prefers_timestamps() {
        use chrono::{TimeZone, Utc};
        let ev = |reason: &str, secs: Option<i64>| ClusterEvent {
            reason: reason.into(),
            message: format!("{reason} happened"),
            last_timestamp: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        };
        let events = vec![ev("CreateFailed", Some(20)), ev("Created", Some(10))];
        assert_eq!(latest_event(&events).unwrap().reason, "CreateFailed");
        let events = vec![ev("CreateFailed", None), ev("Created", Some(10))];
        assert_eq!(latest_event(&events).unwrap().reason, "Created");
        assert!(latest_event(&[]).is_none());
    }
}
