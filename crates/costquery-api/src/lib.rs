//! Cost allocation API
//!
//! Wire models for the `/v2/cost` endpoint and a thin HTTP client that queries it.

pub mod client;
pub mod protocol;

pub use client::{ApiError, CostClient, COST_PATH};
pub use protocol::{Allocation, AllocationData, AllocationProperties, AllocationSet, CostQuery, CostResponse};
