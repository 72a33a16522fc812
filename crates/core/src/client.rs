//! Narrow interfaces to the remote control planes.
//!
//! Each call is a single return-or-fail network round trip. Implementations
//! own authentication, wire formats and payload mapping.

use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::model::{Agent, Cluster, ClusterEvent, ClusterSpec, Job, JobRequest, ServiceInfo};

pub type RemoteResult<T> = Result<T, RemoteError>;

#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn fetch(&self, name: &str) -> RemoteResult<Cluster>;
    async fn fetch_events(&self, name: &str) -> RemoteResult<Vec<ClusterEvent>>;
    async fn create(&self, cluster: &Cluster) -> RemoteResult<Cluster>;
    /// Replace the cluster spec; the remote side has no multi-field atomicity.
    async fn update(&self, name: &str, spec: &ClusterSpec) -> RemoteResult<Cluster>;
    async fn terminate(&self, name: &str) -> RemoteResult<()>;
    async fn info(&self) -> RemoteResult<ServiceInfo>;
}

#[async_trait::async_trait]
pub trait JobClient: Send + Sync {
    async fn fetch(&self, request_id: &str) -> RemoteResult<Job>;
    async fn fetch_log(&self, request_id: &str) -> RemoteResult<Vec<u8>>;
    async fn list(&self, agent_id: Option<&str>) -> RemoteResult<Vec<Job>>;
    async fn submit(&self, request: &JobRequest) -> RemoteResult<Job>;
}

#[async_trait::async_trait]
pub trait AgentClient: Send + Sync {
    async fn fetch(&self, agent_id: &str) -> RemoteResult<Agent>;
    async fn list(&self, filter: &str) -> RemoteResult<Vec<Agent>>;
    async fn delete_tag(&self, agent_id: &str, key: &str) -> RemoteResult<()>;
    async fn create_tags(&self, agent_id: &str, tags: &BTreeMap<String, String>) -> RemoteResult<()>;
}
