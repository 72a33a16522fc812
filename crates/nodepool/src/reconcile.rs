use std::sync::Arc;

use converge_core::client::ClusterClient;
use converge_core::model::{ClusterSpec, NodePool};
use converge_core::{validate, ActionContext, ConvergeError, ConvergeResult};
use converge_poll::{await_state, ConvergenceSpec};
use converge_refresh::ClusterRefresher;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::plan::{NodePoolDiffPlan, PlanStep, StepKind};

/// Applies a [`NodePoolDiffPlan`] to one cluster, one update and one full
/// convergence wait per step. Steps for a cluster never overlap; separate
/// clusters may be reconciled concurrently.
pub struct NodePoolReconciler {
    client: Arc<dyn ClusterClient>,
    spec_changed: bool,
}

impl NodePoolReconciler {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client, spec_changed: false }
    }

    /// Mark `base` as differing from the live spec outside the node pools.
    /// The removal step then carries it even when the pools are unchanged.
    pub fn with_spec_changed(mut self, changed: bool) -> Self {
        self.spec_changed = changed;
        self
    }

    /// Move `name` from `old` to `new` node pools.
    ///
    /// `base` supplies every other spec field sent with each update. All
    /// input is validated before the first network call. A failing step
    /// aborts the rest and leaves the cluster partially converged; nothing
    /// is rolled back. Returns the kinds of the steps that were applied.
    pub async fn reconcile(
        &self,
        name: &str,
        base: &ClusterSpec,
        old: &[NodePool],
        new: &[NodePool],
        spec: &ConvergenceSpec,
        cancel: &CancellationToken,
    ) -> ConvergeResult<Vec<StepKind>> {
        validate::cluster_name(name)?;
        spec.validate()?;
        let plan = NodePoolDiffPlan::compute(old, new)?;
        debug!(cluster = %name, keep = plan.keep.len(), delete = plan.to_delete.len(), "node pool plan");

        if !self.spec_changed && plan.is_noop(old) {
            debug!(cluster = %name, "node pools unchanged");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(3);
        for step in plan.steps() {
            self.apply(name, base, &step, spec, cancel).await?;
            applied.push(step.kind);
        }
        info!(cluster = %name, steps = applied.len(), "node pools reconciled");
        Ok(applied)
    }

    async fn apply(&self, name: &str, base: &ClusterSpec, step: &PlanStep, spec: &ConvergenceSpec, cancel: &CancellationToken) -> ConvergeResult<()> {
        if cancel.is_cancelled() {
            return Err(ConvergeError::Cancelled { target: spec.target.clone() });
        }
        let desired = ClusterSpec { node_pools: step.pools.clone(), ..base.clone() };
        info!(cluster = %name, step = step.kind.as_str(), pools = desired.node_pools.len(), "submitting node pool update");
        counter!("converge_reconcile_steps_total", 1, "step" => step.kind.as_str());

        self.client.update(name, &desired).await.action(&format!("submitting {} step", step.kind.as_str()))?;

        let refresher = ClusterRefresher::new(self.client.clone(), name);
        await_state(&refresher, spec, cancel)
            .await
            .action(&format!("waiting for cluster node pools {} state", spec.target))?;
        Ok(())
    }
}
