//! Data model for the Hierarchical Consensus Engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use vault_core::{DecisionOutcome, PartitionStatus, PhaseKind};

/// Exclusively owned by the Consensus Engine. Agents belong
/// to at most one cluster, tracked by the engine's bidirectional
/// `agent_id -> cluster_id` map rather than here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub leader_id: String,
    pub backup_leader_id: Option<String>,
    pub members: HashSet<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub health: f64,
    pub partition_status: PartitionStatus,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// invariant: `min_cluster_size <= size <= max_cluster_size`
    /// except transiently during rebalancing, and `leader_id` /
    /// `backup_leader_id` must be members.
    pub fn invariant_holds(&self, min: usize, max: usize) -> bool {
        let size_ok = self.size() >= min && self.size() <= max;
        let leader_ok = self.members.contains(&self.leader_id);
        let backup_ok = self.backup_leader_id.as_ref().map(|b| self.members.contains(b)).unwrap_or(true);
        size_ok && leader_ok && backup_ok
    }
}

/// Immutable value object passed by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRequest {
    pub request_id: String,
    pub request_type: String,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub timeout: std::time::Duration,
    pub required_clusters: Option<Vec<String>>,
    pub minimum_consensus: f64,
    pub created_at: DateTime<Utc>,
}

impl ConsensusRequest {
    /// "Timeouts": intra <= 60%, inter <= 20%, global+finalize
    /// <= 20% of the request's overall timeout.
    pub fn intra_phase_budget(&self) -> std::time::Duration {
        self.timeout.mul_f64(0.60)
    }

    pub fn inter_phase_budget(&self) -> std::time::Duration {
        self.timeout.mul_f64(0.20)
    }

    pub fn global_finalize_budget(&self) -> std::time::Duration {
        self.timeout.mul_f64(0.20)
    }
}

/// One cluster's intra-cluster tally (phase 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDecision {
    pub decision: DecisionOutcome,
    pub confidence: f64,
    pub leader_id: String,
    pub vote_distribution: HashMap<DecisionOutcome, usize>,
}

/// Per-phase timing breakdown for a single consensus run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseKind,
    pub started_at: DateTime<Utc>,
    pub duration: std::time::Duration,
    pub clusters_participated: usize,
}

/// Partition classification + recovery strategy label attached to a
/// consensus result. Actual partition recovery beyond this label is
/// left as a future extension (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub status: PartitionStatus,
    pub participation_ratio: f64,
    pub strategy: String,
}

/// Per-request result. Never raises; `consensus_reached` and
/// `final_decision` are always populated, even on total failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalConsensusResult {
    pub request_id: String,
    pub consensus_reached: bool,
    pub final_decision: DecisionOutcome,
    pub cluster_decisions: HashMap<String, ClusterDecision>,
    pub global_confidence: f64,
    pub phase_records: Vec<PhaseRecord>,
    pub processing_time: std::time::Duration,
    pub partition_info: PartitionInfo,
}

/// Bounds governing clustering (: `optimal=12`, `min=7`,
/// `max=20`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub optimal_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            optimal_size: 12,
            min_size: 7,
            max_size: 20,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> vault_core::VaultResult<()> {
        if self.min_size > self.max_size {
            return Err(vault_core::VaultError::Configuration(format!(
                "cluster min_size ({}) > max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.optimal_size < self.min_size || self.optimal_size > self.max_size {
            return Err(vault_core::VaultError::Configuration(format!(
                "cluster optimal_size ({}) must be within [min, max] = [{}, {}]",
                self.optimal_size, self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Record appended to the bounded partition-history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub info: PartitionInfo,
}

/// exit-code helper: success rate across a batch of
/// results, for an external benchmark to compute `0` if `>= 99.0%`
/// else `1` without reimplementing the rule.
pub fn success_rate(results: &[HierarchicalConsensusResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let successes = results.iter().filter(|r| r.consensus_reached).count();
    successes as f64 / results.len() as f64 * 100.0
}
