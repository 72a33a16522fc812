//! Pre-flight checks that must pass before any network call is issued.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConvergeError, ConvergeResult};
use crate::model::NodePool;

static CLUSTER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][-a-z0-9]{0,18}[a-z0-9]?$").unwrap());
static POOL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][-\.a-z0-9]{0,18}[a-z0-9]?$").unwrap());
static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").unwrap());

pub fn cluster_name(name: &str) -> ConvergeResult<()> {
    if CLUSTER_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ConvergeError::Validation(format!(
            "cluster name {name:?} must be 1 to 20 characters with lowercase letters, numbers and hyphens"
        )))
    }
}

pub fn pool_name(name: &str) -> ConvergeResult<()> {
    if POOL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ConvergeError::Validation(format!(
            "node pool name {name:?} must be 1 to 20 characters with lowercase letters, numbers, hyphens and dots"
        )))
    }
}

pub fn version(version: &str) -> ConvergeResult<()> {
    if VERSION.is_match(version) {
        Ok(())
    } else {
        Err(ConvergeError::Validation(format!("invalid version {version:?}, expected MAJOR.MINOR.PATCH")))
    }
}

/// Names must be unique within one list; the first duplicate is reported.
pub fn unique_pool_names(pools: &[NodePool]) -> ConvergeResult<()> {
    let mut seen = HashSet::with_capacity(pools.len());
    for p in pools {
        if !seen.insert(p.name.as_str()) {
            return Err(ConvergeError::Validation(format!("duplicate node pool name found: {}", p.name)));
        }
    }
    Ok(())
}

/// Full node pool list check: well-formed names, then uniqueness.
pub fn node_pools(pools: &[NodePool]) -> ConvergeResult<()> {
    for p in pools {
        pool_name(&p.name)?;
    }
    unique_pool_names(pools)
}
