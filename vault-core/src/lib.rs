//! Shared vocabulary for the vault control plane.
//!
//! This crate sits at the bottom of the workspace's dependency graph: it
//! defines the tagged variants and error taxonomy that every other
//! `vault-*` crate agrees on, and a small bounded-history utility used by
//! every component that keeps a capped ring of recent events. Nothing in
//! here depends on another `vault-*` crate, so there is no risk of the
//! cyclic references the source system suffered from (pool <-> engine
//! <-> coordinator all holding each other).

mod error;
mod history;
mod types;

pub use error::{VaultError, VaultResult};
pub use history::BoundedHistory;
pub use types::{
    AgentStatus, AgentType, ConfidenceBand, DecisionOutcome, HealthLevel, PartitionStatus,
    PhaseKind, PoolStatus, RiskLevel, ScalabilityStatus,
};
