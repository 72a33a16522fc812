//! State refreshers for the cluster, job and agent families.
//!
//! Each refresher performs one fetch per sample and derives a status label
//! using the family's own rules; absence handling is delegated to the
//! matching [`ErrorClassifier`](converge_core::ErrorClassifier).

#![forbid(unsafe_code)]

pub mod agent;
pub mod classify;
pub mod cluster;
pub mod job;

pub use agent::AgentRefresher;
pub use classify::{AgentErrors, ClusterErrors, JobErrors};
pub use cluster::ClusterRefresher;
pub use job::JobRefresher;
