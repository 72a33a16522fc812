use converge_core::model::NodePool;
use converge_core::{validate, ConvergeResult};
use serde::Serialize;

/// Derived diff between the previous and the desired node pool lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePoolDiffPlan {
    /// Pools present in both lists: the new entry, with the old
    /// availability zone when the new one leaves it unset.
    pub keep: Vec<NodePool>,
    /// Old pools without a counterpart, size forced to zero.
    pub to_delete: Vec<NodePool>,
    #[serde(rename = "final")]
    pub final_pools: Vec<NodePool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Downscale,
    Remove,
    Create,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Downscale => "downscale",
            StepKind::Remove => "remove",
            StepKind::Create => "create",
        }
    }
}

/// One update submission: the full node pool list to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub kind: StepKind,
    pub pools: Vec<NodePool>,
}

fn matches(old: &NodePool, new: &NodePool) -> bool {
    old.name == new.name
        && old.flavor == new.flavor
        && old.image == new.image
        && (new.availability_zone.is_empty() || new.availability_zone == old.availability_zone)
}

impl NodePoolDiffPlan {
    /// Validate both lists, then match old pools against new ones.
    ///
    /// A pool whose flavor, image or pinned zone changed does not match: it
    /// is drained and recreated under the same name.
    pub fn compute(old: &[NodePool], new: &[NodePool]) -> ConvergeResult<Self> {
        validate::node_pools(old)?;
        validate::node_pools(new)?;

        let mut keep = Vec::new();
        let mut to_delete = Vec::new();
        for op in old {
            match new.iter().find(|np| matches(op, np)) {
                Some(np) => {
                    let mut merged = np.clone();
                    if merged.availability_zone.is_empty() {
                        merged.availability_zone = op.availability_zone.clone();
                    }
                    keep.push(merged);
                }
                None => to_delete.push(NodePool { size: 0, ..op.clone() }),
            }
        }
        Ok(Self { keep, to_delete, final_pools: new.to_vec() })
    }

    /// Nothing to drain, nothing to reassert, nothing to create.
    pub fn is_noop(&self, old: &[NodePool]) -> bool {
        self.to_delete.is_empty() && self.keep == self.final_pools && self.keep == old
    }

    /// Update submissions in the order they must be applied.
    ///
    /// The removal step is always present, even with nothing to delete, so
    /// that size and zone drift captured in `keep` is reasserted; the create
    /// step only when `keep` differs from the final list.
    pub fn steps(&self) -> Vec<PlanStep> {
        let mut steps = Vec::with_capacity(3);
        if !self.to_delete.is_empty() {
            let mut pools = self.keep.clone();
            pools.extend(self.to_delete.iter().cloned());
            steps.push(PlanStep { kind: StepKind::Downscale, pools });
        }
        steps.push(PlanStep { kind: StepKind::Remove, pools: self.keep.clone() });
        if self.keep != self.final_pools {
            steps.push(PlanStep { kind: StepKind::Create, pools: self.final_pools.clone() });
        }
        steps
    }
}
