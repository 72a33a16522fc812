use std::sync::Arc;

use converge_core::client::ClusterClient;
use converge_core::model::{Cluster, ClusterSpec, NodePool};
use converge_core::{validate, ActionContext, ConvergeError, ConvergeResult};
use converge_nodepool::{NodePoolReconciler, StepKind};
use converge_poll::{await_state, PollSettings};
use converge_refresh::ClusterRefresher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ClusterOps {
    client: Arc<dyn ClusterClient>,
    settings: PollSettings,
}

impl ClusterOps {
    pub fn new(client: Arc<dyn ClusterClient>, settings: PollSettings) -> Self {
        Self { client, settings }
    }

    /// Check the version format locally, then against the versions the
    /// service currently offers.
    pub async fn verify_version(&self, version: &str) -> ConvergeResult<()> {
        validate::version(version)?;
        let info = self.client.info().await.action("fetching supported versions")?;
        if info.available_cluster_versions.iter().any(|v| v == version) {
            return Ok(());
        }
        Err(ConvergeError::Validation(format!(
            "unsupported Kubernetes version {version:?}, available: {}",
            info.available_cluster_versions.join(", ")
        )))
    }

    async fn preflight(&self, name: &str, spec: &ClusterSpec) -> ConvergeResult<()> {
        validate::cluster_name(name)?;
        validate::node_pools(&spec.node_pools)?;
        if !spec.version.is_empty() {
            self.verify_version(&spec.version).await?;
        }
        Ok(())
    }

    /// Submit a new cluster and wait until it runs.
    pub async fn create(&self, cluster: &Cluster, cancel: &CancellationToken) -> ConvergeResult<Cluster> {
        self.preflight(&cluster.name, &cluster.spec).await?;
        self.client.create(cluster).await.action("creating cluster")?;
        info!(cluster = %cluster.name, "cluster submitted");

        let refresher = ClusterRefresher::new(self.client.clone(), &cluster.name);
        let done = await_state(&refresher, &self.settings.cluster_create(), cancel)
            .await
            .action("waiting for running cluster state")?;
        match done.object {
            Some(c) => Ok(c),
            None => self.read(&cluster.name).await,
        }
    }

    /// A missing cluster reads as [`ConvergeError::TerminalAbsence`].
    pub async fn read(&self, name: &str) -> ConvergeResult<Cluster> {
        match self.client.fetch(name).await {
            Ok(c) => Ok(c),
            Err(e) if e.is_not_found() => Err(ConvergeError::TerminalAbsence(format!("cluster {name} not found"))),
            Err(e) => Err(ConvergeError::from(e).with_action("reading cluster")),
        }
    }

    /// Apply `spec` with node pools moved from `old_pools` to `new_pools`
    /// through the capacity-safe reconciliation steps. A version change is
    /// submitted even when the node pools stay as they are.
    pub async fn update(
        &self,
        name: &str,
        spec: &ClusterSpec,
        old_pools: &[NodePool],
        new_pools: &[NodePool],
        cancel: &CancellationToken,
    ) -> ConvergeResult<Vec<StepKind>> {
        validate::cluster_name(name)?;
        validate::node_pools(old_pools)?;
        validate::node_pools(new_pools)?;
        if !spec.version.is_empty() {
            self.verify_version(&spec.version).await?;
        }
        let live = self.read(name).await.action("updating cluster")?;
        let spec_changed = !spec.version.is_empty() && spec.version != live.spec.version;
        if spec_changed {
            debug!(cluster = %name, from = %live.spec.version, to = %spec.version, "version change requested");
        }
        NodePoolReconciler::new(self.client.clone())
            .with_spec_changed(spec_changed)
            .reconcile(name, spec, old_pools, new_pools, &self.settings.cluster_update(), cancel)
            .await
            .action("updating cluster")
    }

    /// Terminate and wait until the cluster is gone. Deleting a cluster that
    /// no longer exists succeeds.
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> ConvergeResult<()> {
        validate::cluster_name(name)?;
        match self.client.terminate(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(cluster = %name, "cluster already deleted");
                return Ok(());
            }
            Err(e) => return Err(ConvergeError::from(e).with_action("deleting cluster")),
        }

        let refresher = ClusterRefresher::new(self.client.clone(), name);
        await_state(&refresher, &self.settings.cluster_delete(), cancel)
            .await
            .action("waiting for cluster to be deleted")?;
        info!(cluster = %name, "cluster deleted");
        Ok(())
    }
}
