use std::sync::Arc;

use converge_core::client::AgentClient;
use converge_core::labels::agent as liveness;
use converge_core::model::{Agent, AgentSelector};
use converge_core::{Classification, ClassifyContext, ConvergeError, ConvergeResult, ErrorClassifier, RemoteError};
use converge_poll::{Observation, StateRefresher};

use crate::classify::AgentErrors;

/// Samples whether an agent is registered, by id or by filter.
pub struct AgentRefresher {
    client: Arc<dyn AgentClient>,
    selector: AgentSelector,
    identity: String,
}

impl AgentRefresher {
    /// Fails with a validation error when neither an id nor a filter was given.
    pub fn new(client: Arc<dyn AgentClient>, selector: Option<AgentSelector>) -> ConvergeResult<Self> {
        let selector = selector.ok_or_else(|| ConvergeError::Validation("an agent id or a filter is required".into()))?;
        let identity = selector.describe().to_string();
        Ok(Self { client, selector, identity })
    }
}

#[async_trait::async_trait]
impl StateRefresher for AgentRefresher {
    type Object = Agent;

    fn family(&self) -> &'static str {
        "agent"
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    async fn refresh(&self, _target: &str) -> ConvergeResult<Observation<Agent>> {
        match &self.selector {
            AgentSelector::Id(id) => {
                let agent = self.client.fetch(id).await?;
                Ok(Observation::new(agent, liveness::ACTIVE))
            }
            AgentSelector::Filter(filter) => {
                let mut agents = self.client.list(filter).await?;
                match agents.len() {
                    0 => Ok(Observation::empty(liveness::ABSENT).with_detail(format!("no agent matches filter {filter:?}"))),
                    1 => Ok(Observation::new(agents.remove(0), liveness::ACTIVE)),
                    n => Err(ConvergeError::Ambiguous { what: "agent".into(), count: n }),
                }
            }
        }
    }

    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        AgentErrors.classify(err, ctx)
    }
}
