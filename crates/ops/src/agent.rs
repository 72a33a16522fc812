use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use converge_core::client::AgentClient;
use converge_core::model::{Agent, AgentSelector};
use converge_core::{ActionContext, ConvergeError, ConvergeResult};
use converge_poll::{await_state, PollSettings};
use converge_refresh::AgentRefresher;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct AgentOps {
    client: Arc<dyn AgentClient>,
    settings: PollSettings,
}

impl AgentOps {
    pub fn new(client: Arc<dyn AgentClient>, settings: PollSettings) -> Self {
        Self { client, settings }
    }

    /// Wait for the selected agent to be registered. A zero timeout checks
    /// once and fails when the agent is not there.
    pub async fn wait(&self, selector: Option<AgentSelector>, timeout: Duration, cancel: &CancellationToken) -> ConvergeResult<Agent> {
        let refresher = AgentRefresher::new(self.client.clone(), selector)?;
        let done = await_state(&refresher, &self.settings.agent_active(timeout), cancel)
            .await
            .action("waiting for agent")?;
        done.object.ok_or_else(|| ConvergeError::TransientAbsence("agent not found".into()))
    }

    /// Delete keys missing from `new`, then upsert every tag in `new`.
    pub async fn update_tags(&self, agent_id: &str, old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> ConvergeResult<()> {
        for key in old.keys().filter(|k| !new.contains_key(*k)) {
            debug!(agent = %agent_id, tag = %key, "deleting tag");
            self.client
                .delete_tag(agent_id, key)
                .await
                .action(&format!("deleting {key} tag from agent {agent_id}"))?;
        }
        self.client
            .create_tags(agent_id, new)
            .await
            .action(&format!("updating tags for agent {agent_id}"))
    }
}
