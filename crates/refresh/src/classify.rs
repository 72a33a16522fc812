//! Family error classifiers.
//!
//! "Absence" means something different per family: a finished deletion for
//! clusters, a not yet registered agent, an invalid request id for jobs.

use converge_core::labels;
use converge_core::{Classification, ClassifyContext, ErrorClassifier, RemoteError};

/// Not-found while waiting for `Terminated` is the desired end state.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterErrors;

impl ErrorClassifier for ClusterErrors {
    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        if err.is_not_found() && ctx.target == labels::cluster::TERMINATED {
            Classification::NotFoundAsSuccess
        } else {
            Classification::Fatal(err.message.clone())
        }
    }
}

/// Every job fetch failure is fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobErrors;

impl ErrorClassifier for JobErrors {
    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        Classification::Fatal(format!("unable to retrieve {} job: {}", ctx.identity, err.message))
    }
}

/// A missing agent is retried under a positive timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgentErrors;

impl ErrorClassifier for AgentErrors {
    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification {
        if err.is_not_found() && ctx.waiting {
            Classification::Retryable { label: labels::agent::ABSENT.to_string() }
        } else {
            Classification::Fatal(err.message.clone())
        }
    }
}
