//! Hierarchical Consensus Engine (C5): clustering, leader election, the
//! four-phase intra/inter/global/finalize protocol, and partition
//! classification.

mod cluster;
mod engine;
mod types;

pub use cluster::{coordinators, partition_into_clusters};
pub use engine::ConsensusEngine;
pub use types::{
    success_rate, Cluster, ClusterConfig, ClusterDecision, ConsensusRequest,
    HierarchicalConsensusResult, PartitionInfo, PartitionRecord, PhaseRecord,
};
