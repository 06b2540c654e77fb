//! Cost API protocol types
//!
//! The `/v2/cost` endpoint answers with `{ "data": ... }` where `data` is either a
//! list of allocation sets (one per time window) or a single allocation set keyed
//! by resource name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Query parameters for a cost request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostQuery {
    /// Time window, e.g. `1h`, `24h`, `7d`
    pub window: String,
    /// Filter expression, e.g. `namespace:"kube-system"+controllerKind:"ReplicaSet"`
    pub filter: String,
}

impl CostQuery {
    pub fn new(window: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            filter: filter.into(),
        }
    }

    /// Query string pairs in the order they are sent
    pub fn params(&self) -> [(&'static str, &str); 2] {
        [("window", self.window.as_str()), ("filter", self.filter.as_str())]
    }
}

/// Allocations of one time window, keyed by resource name in server order
pub type AllocationSet = IndexMap<String, Allocation>;

/// Top-level response body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CostResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<AllocationData>,
}

impl CostResponse {
    /// True when the response carries no allocations at all
    pub fn is_empty(&self) -> bool {
        self.data.as_ref().map_or(true, AllocationData::is_empty)
    }
}

/// The `data` member, which the server emits in two shapes
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AllocationData {
    /// One set per time window
    Windows(Vec<AllocationSet>),
    /// A single set
    Single(AllocationSet),
}

impl AllocationData {
    /// Iterate over every set regardless of shape
    pub fn sets(&self) -> Vec<&AllocationSet> {
        match self {
            AllocationData::Windows(sets) => sets.iter().collect(),
            AllocationData::Single(set) => vec![set],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sets().iter().all(|set| set.is_empty())
    }

    pub fn allocation_count(&self) -> usize {
        self.sets().iter().map(|set| set.len()).sum()
    }

    /// Sum of `cost` over all allocations; missing costs count as zero
    pub fn total_cost(&self) -> f64 {
        self.sets()
            .iter()
            .flat_map(|set| set.values())
            .map(|a| a.cost.unwrap_or(0.0))
            .sum()
    }
}

/// A single allocation record
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub cpu_core_request_average: Option<f64>,
    #[serde(default)]
    pub cpu_core_usage_average: Option<f64>,
    #[serde(default)]
    pub ram_byte_request_average: Option<f64>,
    #[serde(default)]
    pub ram_byte_usage_average: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub cost_ratio: Option<f64>,
    #[serde(default)]
    pub custom_cost: Option<f64>,
    #[serde(default)]
    pub properties: Option<AllocationProperties>,
}

/// Kubernetes properties attached to an allocation
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationProperties {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub controller_kind: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
}
