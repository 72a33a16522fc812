//! A refresher that replays a fixed sequence of samples.
//!
//! Used by tests and by `convergectl simulate` to exercise the poller without
//! a remote control plane.

use std::sync::atomic::{AtomicU32, Ordering};

use converge_core::{Classification, ClassifyContext, ConvergeError, ConvergeResult, RemoteError};
use serde::{Deserialize, Serialize};

use crate::{Observation, StateRefresher};

/// One scripted outcome of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sample {
    /// The object exists and reports this status label.
    Label(String),
    /// The remote side answered not-found with this message.
    NotFound(String),
    /// Any other remote failure.
    Error(String),
}

pub struct ScriptedRefresher {
    identity: String,
    samples: Vec<Sample>,
    not_found: Option<Classification>,
    calls: AtomicU32,
}

impl ScriptedRefresher {
    /// The last sample repeats once the script is exhausted.
    pub fn new(identity: &str, samples: Vec<Sample>) -> Self {
        Self { identity: identity.to_string(), samples, not_found: None, calls: AtomicU32::new(0) }
    }

    pub fn labels(identity: &str, labels: &[&str]) -> Self {
        Self::new(identity, labels.iter().map(|l| Sample::Label(l.to_string())).collect())
    }

    /// How not-found samples are classified; unset means fatal.
    pub fn not_found_means(mut self, classification: Classification) -> Self {
        self.not_found = Some(classification);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StateRefresher for ScriptedRefresher {
    /// 1-based number of the sample that produced the observation.
    type Object = u32;

    fn family(&self) -> &'static str {
        "scripted"
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    async fn refresh(&self, _target: &str) -> ConvergeResult<Observation<u32>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let idx = (n as usize - 1).min(self.samples.len().saturating_sub(1));
        match self.samples.get(idx) {
            Some(Sample::Label(label)) => Ok(Observation::new(n, label.clone())),
            Some(Sample::NotFound(message)) => Err(RemoteError::not_found(message.clone()).into()),
            Some(Sample::Error(message)) => Err(RemoteError::new(Some(500), message.clone()).into()),
            None => Err(ConvergeError::Validation("empty sample script".into())),
        }
    }

    fn classify(&self, err: &RemoteError, _ctx: &ClassifyContext<'_>) -> Classification {
        match &self.not_found {
            Some(c) if err.is_not_found() => c.clone(),
            _ => Classification::Fatal(err.message.clone()),
        }
    }
}
