//! In-memory collaborators for tests, enabled by the `mock` feature.
//!
//! Each mock holds a small simulated remote state, records every mutation
//! payload it receives and counts network calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::{AgentClient, ClusterClient, JobClient, RemoteResult};
use crate::error::{RemoteError, NOT_FOUND_MESSAGE};
use crate::labels;
use crate::model::{Agent, Cluster, ClusterEvent, ClusterSpec, ClusterStatus, Job, JobRequest, NodePoolStatus, ServiceInfo};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Status a healthy control plane eventually reports for `spec`.
pub fn settled_status(spec: &ClusterSpec) -> ClusterStatus {
    ClusterStatus {
        phase: labels::cluster::RUNNING.to_string(),
        apiserver_version: spec.version.clone(),
        node_pools: spec
            .node_pools
            .iter()
            .map(|p| NodePoolStatus { name: p.name.clone(), size: p.size, running: p.size, healthy: p.size, schedulable: p.size })
            .collect(),
    }
}

// ----------------- Cluster -----------------

#[derive(Default)]
struct ClusterState {
    cluster: Option<Cluster>,
    scripted: VecDeque<RemoteResult<Cluster>>,
    events: Vec<ClusterEvent>,
    versions: Vec<String>,
    settle_after: usize,
    unsettled: usize,
    terminating: bool,
    update_failures: HashMap<usize, RemoteError>,
    terminate_error: Option<RemoteError>,
    created: Vec<Cluster>,
    updates: Vec<ClusterSpec>,
    terminates: usize,
    fetches: usize,
    event_fetches: usize,
    info_calls: usize,
}

/// Simulated cluster API.
///
/// After a mutation the cluster reports `Pending` (or `Terminating`) for
/// `settle_after` fetches, then converges to [`settled_status`].
#[derive(Default)]
pub struct MockClusterClient {
    state: Mutex<ClusterState>,
}

impl MockClusterClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_cluster(self, cluster: Cluster) -> Self {
        lock(&self.state).cluster = Some(cluster);
        self
    }

    pub fn with_events(self, events: Vec<ClusterEvent>) -> Self {
        lock(&self.state).events = events;
        self
    }

    pub fn with_versions(self, versions: &[&str]) -> Self {
        lock(&self.state).versions = versions.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_settle_after(self, fetches: usize) -> Self {
        lock(&self.state).settle_after = fetches;
        self
    }

    /// Queue fetch results served before the simulated state is consulted.
    pub fn script(self, results: Vec<RemoteResult<Cluster>>) -> Self {
        lock(&self.state).scripted.extend(results);
        self
    }

    /// Fail the `nth` (0-based) update call.
    pub fn fail_update(self, nth: usize, err: RemoteError) -> Self {
        lock(&self.state).update_failures.insert(nth, err);
        self
    }

    pub fn fail_terminate(self, err: RemoteError) -> Self {
        lock(&self.state).terminate_error = Some(err);
        self
    }

    pub fn set_events(&self, events: Vec<ClusterEvent>) {
        lock(&self.state).events = events;
    }

    pub fn current(&self) -> Option<Cluster> { lock(&self.state).cluster.clone() }
    pub fn created(&self) -> Vec<Cluster> { lock(&self.state).created.clone() }
    pub fn updates(&self) -> Vec<ClusterSpec> { lock(&self.state).updates.clone() }
    pub fn terminate_count(&self) -> usize { lock(&self.state).terminates }
    pub fn fetch_count(&self) -> usize { lock(&self.state).fetches }
    pub fn event_fetch_count(&self) -> usize { lock(&self.state).event_fetches }

    /// Every submitted mutation (create, update, terminate).
    pub fn mutation_count(&self) -> usize {
        let s = lock(&self.state);
        s.created.len() + s.updates.len() + s.terminates
    }

    /// Every network call of any kind.
    pub fn call_count(&self) -> usize {
        let s = lock(&self.state);
        s.created.len() + s.updates.len() + s.terminates + s.fetches + s.event_fetches + s.info_calls
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn fetch(&self, name: &str) -> RemoteResult<Cluster> {
        let mut s = lock(&self.state);
        s.fetches += 1;
        if let Some(next) = s.scripted.pop_front() {
            return next;
        }
        let Some(mut cluster) = s.cluster.clone().filter(|c| c.name == name) else {
            return Err(RemoteError::not_found(NOT_FOUND_MESSAGE));
        };
        if s.unsettled > 0 {
            s.unsettled -= 1;
            cluster.status.phase = if s.terminating { labels::cluster::TERMINATING } else { labels::cluster::PENDING }.to_string();
            return Ok(cluster);
        }
        if s.terminating {
            s.cluster = None;
            s.terminating = false;
            return Err(RemoteError::not_found(NOT_FOUND_MESSAGE));
        }
        Ok(cluster)
    }

    async fn fetch_events(&self, _name: &str) -> RemoteResult<Vec<ClusterEvent>> {
        let mut s = lock(&self.state);
        s.event_fetches += 1;
        Ok(s.events.clone())
    }

    async fn create(&self, cluster: &Cluster) -> RemoteResult<Cluster> {
        let mut s = lock(&self.state);
        s.created.push(cluster.clone());
        if s.cluster.as_ref().is_some_and(|c| c.name == cluster.name) {
            return Err(RemoteError::new(Some(409), format!("cluster {} already exists", cluster.name)));
        }
        let mut live = cluster.clone();
        live.status = settled_status(&live.spec);
        s.cluster = Some(live.clone());
        s.unsettled = s.settle_after;
        s.terminating = false;
        Ok(live)
    }

    async fn update(&self, name: &str, spec: &ClusterSpec) -> RemoteResult<Cluster> {
        let mut s = lock(&self.state);
        let nth = s.updates.len();
        s.updates.push(spec.clone());
        if let Some(err) = s.update_failures.remove(&nth) {
            return Err(err);
        }
        let settle_after = s.settle_after;
        let Some(live) = s.cluster.as_mut().filter(|c| c.name == name) else {
            return Err(RemoteError::not_found(NOT_FOUND_MESSAGE));
        };
        live.spec = spec.clone();
        live.status = settled_status(spec);
        let out = live.clone();
        s.unsettled = settle_after;
        Ok(out)
    }

    async fn terminate(&self, name: &str) -> RemoteResult<()> {
        let mut s = lock(&self.state);
        s.terminates += 1;
        if let Some(err) = s.terminate_error.clone() {
            return Err(err);
        }
        if !s.cluster.as_ref().is_some_and(|c| c.name == name) {
            return Err(RemoteError::not_found(NOT_FOUND_MESSAGE));
        }
        s.terminating = true;
        s.unsettled = s.settle_after;
        Ok(())
    }

    async fn info(&self) -> RemoteResult<ServiceInfo> {
        let mut s = lock(&self.state);
        s.info_calls += 1;
        Ok(ServiceInfo { available_cluster_versions: s.versions.clone() })
    }
}

// ----------------- Job -----------------

#[derive(Default)]
struct JobState {
    statuses: HashMap<String, VecDeque<RemoteResult<Job>>>,
    logs: HashMap<String, RemoteResult<Vec<u8>>>,
    submitted: Vec<JobRequest>,
    fetches: usize,
}

/// Simulated job API; each job replays a scripted sequence of fetch results,
/// repeating the last one once the script is exhausted.
#[derive(Default)]
pub struct MockJobClient {
    state: Mutex<JobState>,
}

impl MockJobClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_job(self, request_id: &str, results: Vec<RemoteResult<Job>>) -> Self {
        lock(&self.state).statuses.insert(request_id.to_string(), results.into());
        self
    }

    /// Convenience: a job that walks through `statuses` on successive fetches.
    pub fn with_statuses(self, job: Job, statuses: &[&str]) -> Self {
        let results = statuses
            .iter()
            .map(|st| Ok(Job { status: st.to_string(), ..job.clone() }))
            .collect();
        let id = job.request_id.clone();
        self.with_job(&id, results)
    }

    pub fn with_log(self, request_id: &str, log: RemoteResult<Vec<u8>>) -> Self {
        lock(&self.state).logs.insert(request_id.to_string(), log);
        self
    }

    pub fn submitted(&self) -> Vec<JobRequest> { lock(&self.state).submitted.clone() }
    pub fn fetch_count(&self) -> usize { lock(&self.state).fetches }
}

#[async_trait::async_trait]
impl JobClient for MockJobClient {
    async fn fetch(&self, request_id: &str) -> RemoteResult<Job> {
        let mut s = lock(&self.state);
        s.fetches += 1;
        let Some(queue) = s.statuses.get_mut(request_id) else {
            return Err(RemoteError::not_found(format!("job {request_id} not found")));
        };
        match queue.len() {
            0 => Err(RemoteError::not_found(format!("job {request_id} not found"))),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| Err(RemoteError::transport("empty script"))),
        }
    }

    async fn fetch_log(&self, request_id: &str) -> RemoteResult<Vec<u8>> {
        lock(&self.state)
            .logs
            .get(request_id)
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::not_found(format!("log for {request_id} not found"))))
    }

    async fn list(&self, agent_id: Option<&str>) -> RemoteResult<Vec<Job>> {
        let s = lock(&self.state);
        let mut out: Vec<Job> = s
            .statuses
            .values()
            .filter_map(|q| q.back().and_then(|r| r.as_ref().ok()).cloned())
            .filter(|j| agent_id.map_or(true, |a| j.agent_id == a))
            .collect();
        out.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        Ok(out)
    }

    async fn submit(&self, request: &JobRequest) -> RemoteResult<Job> {
        let mut s = lock(&self.state);
        s.submitted.push(request.clone());
        let job = Job {
            request_id: format!("job-{}", s.submitted.len()),
            agent_id: request.agent_id.clone(),
            action: request.action.clone(),
            status: labels::job::QUEUED.to_string(),
            timeout: request.timeout,
            payload: request.payload.clone(),
        };
        s.statuses.entry(job.request_id.clone()).or_default().push_back(Ok(job.clone()));
        Ok(job)
    }
}

// ----------------- Agent -----------------

/// A tag mutation observed by [`MockAgentClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCall {
    Delete(String),
    Create(BTreeMap<String, String>),
}

#[derive(Default)]
struct AgentState {
    agents: BTreeMap<String, Agent>,
    hidden_for: HashMap<String, usize>,
    list_script: VecDeque<RemoteResult<Vec<Agent>>>,
    tag_calls: Vec<TagCall>,
    fail_delete: HashMap<String, RemoteError>,
    fail_create: Option<RemoteError>,
    fetches: usize,
    lists: usize,
}

#[derive(Default)]
pub struct MockAgentClient {
    state: Mutex<AgentState>,
}

impl MockAgentClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_agent(self, agent: Agent) -> Self {
        lock(&self.state).agents.insert(agent.agent_id.clone(), agent);
        self
    }

    /// Report not-found for the first `fetches` lookups of `agent_id`.
    pub fn registers_after(self, agent_id: &str, fetches: usize) -> Self {
        lock(&self.state).hidden_for.insert(agent_id.to_string(), fetches);
        self
    }

    /// Queue list results; once exhausted every known agent is returned.
    pub fn script_list(self, results: Vec<RemoteResult<Vec<Agent>>>) -> Self {
        lock(&self.state).list_script.extend(results);
        self
    }

    pub fn fail_delete_tag(self, key: &str, err: RemoteError) -> Self {
        lock(&self.state).fail_delete.insert(key.to_string(), err);
        self
    }

    pub fn fail_create_tags(self, err: RemoteError) -> Self {
        lock(&self.state).fail_create = Some(err);
        self
    }

    pub fn tag_calls(&self) -> Vec<TagCall> { lock(&self.state).tag_calls.clone() }
    pub fn fetch_count(&self) -> usize { lock(&self.state).fetches }
    pub fn list_count(&self) -> usize { lock(&self.state).lists }
    pub fn agent(&self, agent_id: &str) -> Option<Agent> { lock(&self.state).agents.get(agent_id).cloned() }
}

#[async_trait::async_trait]
impl AgentClient for MockAgentClient {
    async fn fetch(&self, agent_id: &str) -> RemoteResult<Agent> {
        let mut s = lock(&self.state);
        s.fetches += 1;
        if let Some(left) = s.hidden_for.get_mut(agent_id) {
            if *left > 0 {
                *left -= 1;
                return Err(RemoteError::not_found(format!("agent {agent_id} not found")));
            }
        }
        s.agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("agent {agent_id} not found")))
    }

    async fn list(&self, _filter: &str) -> RemoteResult<Vec<Agent>> {
        let mut s = lock(&self.state);
        s.lists += 1;
        if let Some(next) = s.list_script.pop_front() {
            return next;
        }
        Ok(s.agents.values().cloned().collect())
    }

    async fn delete_tag(&self, agent_id: &str, key: &str) -> RemoteResult<()> {
        let mut s = lock(&self.state);
        s.tag_calls.push(TagCall::Delete(key.to_string()));
        if let Some(err) = s.fail_delete.get(key) {
            return Err(err.clone());
        }
        if let Some(a) = s.agents.get_mut(agent_id) {
            a.tags.remove(key);
        }
        Ok(())
    }

    async fn create_tags(&self, agent_id: &str, tags: &BTreeMap<String, String>) -> RemoteResult<()> {
        let mut s = lock(&self.state);
        s.tag_calls.push(TagCall::Create(tags.clone()));
        if let Some(err) = s.fail_create.clone() {
            return Err(err);
        }
        if let Some(a) = s.agents.get_mut(agent_id) {
            a.tags.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodePool;

    fn cluster() -> Cluster {
        let spec = ClusterSpec {
            version: "1.29.3".into(),
            node_pools: vec![NodePool { name: "a".into(), flavor: "f".into(), image: "i".into(), size: 2, ..Default::default() }],
        };
        Cluster { name: "demo".into(), status: settled_status(&spec), spec }
    }

    #[tokio::test]
    async fn update_settles_after_configured_fetches() {
        let mock = MockClusterClient::new().with_cluster(cluster()).with_settle_after(2);
        let mut spec = cluster().spec;
        spec.node_pools[0].size = 5;
        mock.update("demo", &spec).await.unwrap();
        assert_eq!(mock.fetch("demo").await.unwrap().status.phase, "Pending");
        assert_eq!(mock.fetch("demo").await.unwrap().status.phase, "Pending");
        let live = mock.fetch("demo").await.unwrap();
        assert_eq!(live.status.phase, "Running");
        assert_eq!(live.status.node_pools[0].healthy, 5);
        assert_eq!(mock.updates().len(), 1);
    }

    #[tokio::test]
    async fn terminate_then_not_found() {
        let mock = MockClusterClient::new().with_cluster(cluster()).with_settle_after(1);
        mock.terminate("demo").await.unwrap();
        assert_eq!(mock.fetch("demo").await.unwrap().status.phase, "Terminating");
        assert!(mock.fetch("demo").await.unwrap_err().is_not_found());
        assert!(mock.current().is_none());
    }

    #[tokio::test]
    async fn job_script_repeats_last() {
        let job = Job { request_id: "r1".into(), ..Default::default() };
        let mock = MockJobClient::new().with_statuses(job, &["queued", "complete"]);
        assert_eq!(mock.fetch("r1").await.unwrap().status, "queued");
        assert_eq!(mock.fetch("r1").await.unwrap().status, "complete");
        assert_eq!(mock.fetch("r1").await.unwrap().status, "complete");
        assert_eq!(mock.fetch_count(), 3);
    }

    #[tokio::test]
    async fn agent_registers_after_hidden_fetches() {
        let mock = MockAgentClient::new()
            .with_agent(Agent { agent_id: "a1".into(), ..Default::default() })
            .registers_after("a1", 1);
        assert!(mock.fetch("a1").await.unwrap_err().is_not_found());
        assert_eq!(mock.fetch("a1").await.unwrap().agent_id, "a1");
    }
}
