//! Converge ops: the mutate-then-converge flows built on the poller.
//!
//! Every failure leaving this crate names the action that failed, followed
//! by the remote system's own message.

#![forbid(unsafe_code)]

pub mod agent;
pub mod cluster;
pub mod job;

pub use agent::AgentOps;
pub use cluster::ClusterOps;
pub use job::{JobFilter, JobOps, JobOutcome, LOG_NOT_AVAILABLE};
