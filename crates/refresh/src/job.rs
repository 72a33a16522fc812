use std::sync::Arc;

use converge_core::client::JobClient;
use converge_core::labels::job as status;
use converge_core::model::Job;
use converge_core::{Classification, ClassifyContext, ConvergeError, ConvergeResult, ErrorClassifier, RemoteError};
use converge_poll::{Observation, StateRefresher};

use crate::classify::JobErrors;

/// Samples a job's own status field.
pub struct JobRefresher {
    client: Arc<dyn JobClient>,
    request_id: String,
}

impl JobRefresher {
    pub fn new(client: Arc<dyn JobClient>, request_id: &str) -> Self {
        Self { client, request_id: request_id.to_string() }
    }
}

#[async_trait::async_trait]
impl StateRefresher for JobRefresher {
    type Object = Job;

    fn family(&self) -> &'static str {
        "job"
    }

    fn identity(&self) -> &str {
        &self.request_id
    }

    async fn refresh(&self, target: &str) -> ConvergeResult<Observation<Job>> {
        let job = self.client.fetch(&self.request_id).await?;
        if job.status == status::FAILED && target != status::FAILED {
            return Err(ConvergeError::FatalEvent {
                reason: status::FAILED.to_string(),
                message: format!("job {} ({}) on agent {} did not complete", job.request_id, job.action, job.agent_id),
            });
        }
        let label = job.status.clone();
        Ok(Observation::new(job, label))
    }

    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        JobErrors.classify(err, ctx)
    }
}
