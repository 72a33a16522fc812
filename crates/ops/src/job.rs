use std::sync::Arc;
use std::time::Duration;

use converge_core::client::JobClient;
use converge_core::model::{Job, JobRequest};
use converge_core::{ActionContext, ConvergeError, ConvergeResult};
use converge_poll::{await_state, PollSettings};
use converge_refresh::JobRefresher;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Placeholder returned whenever a job log cannot be fetched.
pub const LOG_NOT_AVAILABLE: &str = "Log not available";

/// A finished job and its best-effort log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job: Job,
    pub log: String,
}

/// Narrowing criteria for [`JobOps::find`]; empty or zero fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    pub agent_id: String,
    pub timeout: u32,
    pub action: String,
    pub status: String,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        (self.timeout == 0 || job.timeout == self.timeout)
            && (self.agent_id.is_empty() || job.agent_id == self.agent_id)
            && (self.action.is_empty() || job.action == self.action)
            && (self.status.is_empty() || job.status == self.status)
    }
}

pub struct JobOps {
    client: Arc<dyn JobClient>,
    settings: PollSettings,
}

impl JobOps {
    pub fn new(client: Arc<dyn JobClient>, settings: PollSettings) -> Self {
        Self { client, settings }
    }

    pub async fn submit(&self, request: &JobRequest) -> ConvergeResult<Job> {
        if request.agent_id.is_empty() {
            return Err(ConvergeError::Validation("job agent id must not be empty".into()));
        }
        if request.action.is_empty() {
            return Err(ConvergeError::Validation("job action must not be empty".into()));
        }
        let job = self.client.submit(request).await.action("creating job")?;
        debug!(job = %job.request_id, agent = %job.agent_id, action = %job.action, "job submitted");
        Ok(job)
    }

    /// Wait for `complete` and attach the log. A zero timeout checks once.
    pub async fn wait(&self, request_id: &str, timeout: Duration, cancel: &CancellationToken) -> ConvergeResult<JobOutcome> {
        let refresher = JobRefresher::new(self.client.clone(), request_id);
        let done = await_state(&refresher, &self.settings.job_complete(timeout), cancel)
            .await
            .action(&format!("waiting for job {request_id} to complete"))?;
        let job = done.object.ok_or_else(|| ConvergeError::TerminalAbsence(format!("job {request_id} not found")))?;
        let log = self.log(request_id).await;
        Ok(JobOutcome { job, log })
    }

    /// Never fails: a fetch error yields [`LOG_NOT_AVAILABLE`]; invalid
    /// UTF-8 is replaced, not discarded.
    pub async fn log(&self, request_id: &str) -> String {
        match self.client.fetch_log(request_id).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(job = %request_id, error = %e, "job log unavailable");
                LOG_NOT_AVAILABLE.to_string()
            }
        }
    }

    /// List the agent's jobs, then narrow by the remaining criteria.
    pub async fn find(&self, filter: &JobFilter) -> ConvergeResult<Vec<Job>> {
        let agent = (!filter.agent_id.is_empty()).then_some(filter.agent_id.as_str());
        let jobs = self.client.list(agent).await.action("listing jobs")?;
        Ok(jobs.into_iter().filter(|j| filter.matches(j)).collect())
    }
}
