//! Node pool reconciliation: diff an old and a new pool list into a
//! capacity-safe sequence of cluster updates, then drive each update to
//! convergence before submitting the next.

#![forbid(unsafe_code)]

pub mod plan;
pub mod reconcile;

pub use plan::{NodePoolDiffPlan, PlanStep, StepKind};
pub use reconcile::NodePoolReconciler;
