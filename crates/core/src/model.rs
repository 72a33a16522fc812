//! Typed views of the remote objects the core reasons about.
//!
//! These carry only the fields convergence and reconciliation need; wire
//! payloads are mapped into them by the collaborators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reboot/replace policy of a node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reboot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_replace: Option<bool>,
}

/// One entry of a cluster's desired node pool list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePool {
    pub name: String,
    pub flavor: String,
    pub image: String,
    #[serde(default)]
    pub size: i64,
    /// Remotely assigned when left empty.
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub taints: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub custom_root_disk_size: i64,
    #[serde(default)]
    pub config: NodePoolConfig,
}

/// Observed state of one node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolStatus {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub running: i64,
    #[serde(default)]
    pub healthy: i64,
    #[serde(default)]
    pub schedulable: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Requested Kubernetes version; empty leaves the choice to the remote side.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub apiserver_version: String,
    #[serde(default)]
    pub node_pools: Vec<NodePoolStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Service-wide information advertised by the cluster API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub available_cluster_versions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub request_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: String,
    /// Execution timeout in seconds as enforced by the agent.
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub payload: String,
}

/// Payload of a job submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub agent_id: String,
    pub action: String,
    pub payload: String,
    pub timeout: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// How an agent is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSelector {
    Id(String),
    Filter(String),
}

impl AgentSelector {
    /// Build from the optional id/filter pair callers usually hold; an id wins.
    pub fn from_parts(agent_id: Option<&str>, filter: Option<&str>) -> Option<Self> {
        match (agent_id.filter(|s| !s.is_empty()), filter.filter(|s| !s.is_empty())) {
            (Some(id), _) => Some(AgentSelector::Id(id.to_string())),
            (None, Some(f)) => Some(AgentSelector::Filter(f.to_string())),
            (None, None) => None,
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            AgentSelector::Id(id) => id,
            AgentSelector::Filter(f) => f,
        }
    }
}
