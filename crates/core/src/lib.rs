//! Converge core: object model, collaborator interfaces and error taxonomy.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod labels;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;
pub mod validate;

pub use error::{ActionContext, Classification, ClassifyContext, ConvergeError, ConvergeResult, ErrorClassifier, ErrorKind, RemoteError};

pub mod prelude {
    pub use super::client::{AgentClient, ClusterClient, JobClient, RemoteResult};
    pub use super::error::{ActionContext, Classification, ClassifyContext, ConvergeError, ConvergeResult, ErrorClassifier, ErrorKind, RemoteError};
    pub use super::model::{Agent, AgentSelector, Cluster, ClusterEvent, ClusterSpec, ClusterStatus, Job, JobRequest, NodePool, NodePoolConfig, NodePoolStatus, ServiceInfo};
}
