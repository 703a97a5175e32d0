//! Hierarchical Consensus Engine (C5): the four-phase protocol,
//! partition classification, and agent-failure handling.

use crate::cluster::{coordinators, partition_into_clusters};
use crate::types::{
    Cluster, ClusterConfig, ClusterDecision, ConsensusRequest, HierarchicalConsensusResult,
    PartitionInfo, PartitionRecord, PhaseRecord,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use vault_agents::{decide, AgentPool, DecisionInput, WatchdogBaselineStore};
use vault_core::{BoundedHistory, DecisionOutcome, PartitionStatus, PhaseKind, VaultResult};
use vault_security::audit::{AuditEvent, MerkleAuditWriter};
use vault_security::telemetry::TelemetrySink;

const PARTITION_HISTORY_CAP: usize = 1000;

/// Stable tie-break order for argmax over `DecisionOutcome` tallies:
/// earlier in this list wins a tie. `Allow` ranks first so a genuine
/// tie between Allow and a failure-mode outcome favors the substantive
/// decision.
fn decision_priority(decision: DecisionOutcome) -> u8 {
    match decision {
        DecisionOutcome::Allow => 0,
        DecisionOutcome::AllowWithMonitoring => 1,
        DecisionOutcome::Deny => 2,
        DecisionOutcome::InsufficientConsensus => 3,
        DecisionOutcome::ConsensusFailed => 4,
        DecisionOutcome::Error => 5,
    }
}

fn argmax_decision(tally: &HashMap<DecisionOutcome, f64>) -> Option<(DecisionOutcome, f64)> {
    let mut best: Option<(DecisionOutcome, f64)> = None;
    for (&decision, &weight) in tally.iter() {
        let replace = match best {
            None => true,
            Some((best_decision, best_weight)) => {
                weight > best_weight || (weight == best_weight && decision_priority(decision) < decision_priority(best_decision))
            }
        };
        if replace {
            best = Some((decision, weight));
        }
    }
    best
}

pub struct ConsensusEngine {
    config: ClusterConfig,
    clusters: DashMap<String, Cluster>,
    agent_cluster: DashMap<String, String>,
    partition_history: Mutex<BoundedHistory<PartitionRecord>>,
    audit: Arc<dyn MerkleAuditWriter>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ConsensusEngine {
    pub fn new(config: ClusterConfig, audit: Arc<dyn MerkleAuditWriter>, telemetry: Arc<dyn TelemetrySink>) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clusters: DashMap::new(),
            agent_cluster: DashMap::new(),
            partition_history: Mutex::new(BoundedHistory::new(PARTITION_HISTORY_CAP)),
            audit,
            telemetry,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<Cluster> {
        self.clusters.get(cluster_id).map(|c| c.clone())
    }

    pub fn clusters_snapshot(&self) -> Vec<Cluster> {
        self.clusters.iter().map(|e| e.value().clone()).collect()
    }

    pub fn coordinators(&self) -> Vec<String> {
        let snapshot = self.clusters_snapshot();
        coordinators(&snapshot)
    }

    /// "Recluster on any membership change."
    pub fn initialize_clustering(&self, agent_ids: Vec<String>) -> VaultResult<()> {
        let clusters = partition_into_clusters(agent_ids, &self.config);
        self.clusters.clear();
        self.agent_cluster.clear();
        for cluster in clusters {
            for member in &cluster.members {
                self.agent_cluster.insert(member.clone(), cluster.cluster_id.clone());
            }
            self.clusters.insert(cluster.cluster_id.clone(), cluster);
        }
        info!(clusters = self.clusters.len(), "consensus clustering initialized");
        Ok(())
    }

    fn target_clusters(&self, request: &ConsensusRequest) -> Vec<Cluster> {
        match &request.required_clusters {
            Some(ids) => ids.iter().filter_map(|id| self.clusters.get(id).map(|c| c.clone())).collect(),
            None => self.clusters_snapshot(),
        }
    }

    /// `execute_hierarchical_consensus`: the four-phase
    /// protocol. Never raises -- every failure mode resolves to a
    /// `HierarchicalConsensusResult` with `consensus_reached = false`.
    pub async fn execute_hierarchical_consensus(
        &self,
        request: &ConsensusRequest,
        pool: &AgentPool,
        baselines: &WatchdogBaselineStore,
        decision_input: &DecisionInput<'_>,
    ) -> HierarchicalConsensusResult {
        let overall_start = Instant::now();
        let targets = self.target_clusters(request);
        let mut phase_records = Vec::with_capacity(4);

        // ---------------------------------------------------- Phase 1: intra
        let intra_started = Utc::now();
        let intra_start_instant = Instant::now();
        let intra_budget = request.intra_phase_budget();

        let user_baselines = baselines.snapshot(&decision_input.trust.user_id);
        let cluster_futures = targets.iter().map(|cluster| {
            let cluster = cluster.clone();
            let user_baselines = &user_baselines;
            async move {
                // `gather_cluster_vote` yields once per member, so a
                // cluster with many members can genuinely be cut off
                // mid-vote once `intra_budget` elapses, not just at entry.
                let outcome = tokio::time::timeout(
                    intra_budget,
                    gather_cluster_vote(&cluster, pool, decision_input, user_baselines),
                )
                .await;
                match outcome {
                    Ok(decision) => (cluster.cluster_id.clone(), decision),
                    Err(_) => (
                        cluster.cluster_id.clone(),
                        ClusterDecision {
                            decision: DecisionOutcome::Error,
                            confidence: 0.0,
                            leader_id: cluster.leader_id.clone(),
                            vote_distribution: HashMap::new(),
                        },
                    ),
                }
            }
        });
        let intra_results = futures::future::join_all(cluster_futures).await;
        let cluster_decisions: HashMap<String, ClusterDecision> = intra_results.into_iter().collect();

        phase_records.push(PhaseRecord {
            phase: PhaseKind::Intra,
            started_at: intra_started,
            duration: intra_start_instant.elapsed(),
            clusters_participated: targets.len(),
        });

        // ---------------------------------------------------- Phase 2: inter
        let inter_started = Utc::now();
        let inter_start_instant = Instant::now();
        let inter_budget = request.inter_phase_budget();

        let inter_outcome = tokio::time::timeout(inter_budget, async {
            let mut successful: Vec<(String, f64)> = Vec::new();
            let mut weighted_tally: HashMap<DecisionOutcome, f64> = HashMap::new();
            let mut total_weight = 0.0;
            for (cluster_id, decision) in cluster_decisions.iter() {
                if decision.decision == DecisionOutcome::Error {
                    continue;
                }
                let weight = self.clusters.get(cluster_id).map(|c| c.size() as f64).unwrap_or(0.0);
                total_weight += weight;
                *weighted_tally.entry(decision.decision).or_insert(0.0) += decision.confidence * weight;
                successful.push((cluster_id.clone(), weight));
                tokio::task::yield_now().await;
            }
            (successful, weighted_tally, total_weight)
        })
        .await;

        let (successful, weighted_tally, total_weight) = match inter_outcome {
            Ok(tallied) => tallied,
            Err(_) => {
                warn!(request_id = %request.request_id, "inter-cluster aggregation exceeded its phase budget; treating remaining cluster votes as failures");
                (Vec::new(), HashMap::new(), 0.0)
            }
        };

        let (inter_winner, inter_contribution) = argmax_decision(&weighted_tally).unwrap_or((DecisionOutcome::Error, 0.0));
        let inter_confidence = if total_weight > 0.0 { inter_contribution / total_weight } else { 0.0 };

        phase_records.push(PhaseRecord {
            phase: PhaseKind::Inter,
            started_at: inter_started,
            duration: inter_start_instant.elapsed(),
            clusters_participated: successful.len(),
        });

        // --------------------------------------------------- Phase 3: global
        let global_started = Utc::now();
        let global_start_instant = Instant::now();

        let (final_decision, consensus_reached) = if total_weight > 0.0 && inter_confidence >= request.minimum_consensus {
            (inter_winner, true)
        } else {
            (DecisionOutcome::InsufficientConsensus, false)
        };

        // -------------------------------------------------- Phase 4: finalize
        // One budget covers global (pure, in-memory) and finalize (the
        // cluster health/heartbeat refresh below) together, per the
        // phase allocation used to size `global_finalize_budget`.
        let global_finalize_budget = request.global_finalize_budget();
        let finalize_outcome = tokio::time::timeout(global_finalize_budget, async {
            let mut participating_ids: Vec<String> = Vec::new();
            for (id, _weight) in &successful {
                if let Some(mut cluster) = self.clusters.get_mut(id.as_str()) {
                    cluster.health = (cluster.health + 0.1).min(1.0);
                    cluster.last_heartbeat = Utc::now();
                    participating_ids.push(id.clone());
                }
                tokio::task::yield_now().await;
            }
            participating_ids
        })
        .await;

        let participating_ids = match finalize_outcome {
            Ok(ids) => ids,
            Err(_) => {
                warn!(request_id = %request.request_id, "finalize phase exceeded its budget; remaining clusters were not health-refreshed this round");
                Vec::new()
            }
        };

        phase_records.push(PhaseRecord {
            phase: PhaseKind::Global,
            started_at: global_started,
            duration: global_start_instant.elapsed(),
            clusters_participated: successful.len(),
        });
        phase_records.push(PhaseRecord {
            phase: PhaseKind::Finalize,
            started_at: global_started,
            duration: global_start_instant.elapsed(),
            clusters_participated: participating_ids.len(),
        });

        // ---------------------------------------------- Partition handling
        let total_clusters = self.clusters.len().max(1);
        let participation_ratio = participating_ids.len() as f64 / total_clusters as f64;
        let (status, strategy) = if participation_ratio < 0.6 {
            (PartitionStatus::Partitioned, "WAIT_FOR_HEALING")
        } else if participation_ratio < 0.8 {
            (PartitionStatus::Healing, "CONTINUE_WITH_MAJORITY")
        } else {
            (PartitionStatus::Connected, "NONE")
        };
        let partition_info = PartitionInfo {
            status,
            participation_ratio,
            strategy: strategy.to_string(),
        };

        for id in &participating_ids {
            if let Some(mut cluster) = self.clusters.get_mut(id.as_str()) {
                cluster.partition_status = status;
            }
        }

        self.partition_history.lock().push(PartitionRecord {
            timestamp: Utc::now(),
            request_id: request.request_id.clone(),
            info: partition_info.clone(),
        });
        self.telemetry.gauge("consensus_participation_ratio", participation_ratio);
        let _ = self
            .audit
            .write(AuditEvent {
                event: "consensus_round_completed".to_string(),
                timestamp: Utc::now(),
                detail: serde_json::json!({
                    "request_id": request.request_id,
                    "final_decision": final_decision.to_string(),
                    "consensus_reached": consensus_reached,
                    "participation_ratio": participation_ratio,
                }),
            })
            .await;

        if !matches!(status, PartitionStatus::Connected) {
            warn!(request_id = %request.request_id, ?status, participation_ratio, "consensus round observed a partition");
        }

        HierarchicalConsensusResult {
            request_id: request.request_id.clone(),
            consensus_reached,
            final_decision,
            cluster_decisions,
            global_confidence: inter_confidence,
            phase_records,
            processing_time: overall_start.elapsed(),
            partition_info,
        }
    }

    pub fn partition_history(&self) -> Vec<PartitionRecord> {
        self.partition_history.lock().snapshot()
    }

    /// "Agent failure": remove from cluster, promote backup
    /// or elect a new leader, re-pick backup, schedule rebalancing if
    /// the cluster drops below `min_size`. Never drops a request
    /// mid-flight -- the enclosing cluster already tolerates the vote
    /// loss, so this only updates steady-state cluster membership.
    pub fn handle_agent_failure(&self, agent_id: &str) {
        let Some((_, cluster_id)) = self.agent_cluster.remove(agent_id) else {
            return;
        };
        let Some(mut cluster) = self.clusters.get_mut(&cluster_id) else {
            return;
        };

        cluster.members.remove(agent_id);

        if cluster.leader_id == agent_id {
            cluster.leader_id = cluster
                .backup_leader_id
                .take()
                .filter(|b| cluster.members.contains(b))
                .or_else(|| cluster.members.iter().min().cloned())
                .unwrap_or_default();
        }
        cluster.backup_leader_id = cluster
            .members
            .iter()
            .filter(|m| **m != cluster.leader_id)
            .min()
            .cloned();

        let needs_rebalance = cluster.members.len() < self.config.min_size && !cluster.members.is_empty();
        let remaining_members = cluster.members.clone();
        drop(cluster);

        if needs_rebalance {
            warn!(cluster_id, size = remaining_members.len(), "cluster below min_size after agent failure, rebalancing");
            self.rebalance_undersized_cluster(&cluster_id, remaining_members);
        }
    }

    /// Folds an undersized cluster's remaining members into its
    /// lexicographically nearest neighbor cluster rather than
    /// re-running full clustering ("schedule rebalancing" --
    /// interpreted here as an immediate, local merge since the engine
    /// has no separate background rebalancer).
    fn rebalance_undersized_cluster(&self, cluster_id: &str, orphaned: std::collections::HashSet<String>) {
        self.clusters.remove(cluster_id);
        for member in &orphaned {
            self.agent_cluster.remove(member);
        }

        let Some(mut target) = self.clusters.iter_mut().min_by_key(|c| c.size()) else {
            // No other cluster to merge into: recreate as its own
            // (necessarily undersized) cluster rather than drop agents.
            if !orphaned.is_empty() {
                let members_vec: Vec<String> = orphaned.into_iter().collect();
                let rebuilt = partition_into_clusters(members_vec, &self.config);
                for cluster in rebuilt {
                    for member in &cluster.members {
                        self.agent_cluster.insert(member.clone(), cluster.cluster_id.clone());
                    }
                    self.clusters.insert(cluster.cluster_id.clone(), cluster);
                }
            }
            return;
        };

        for member in &orphaned {
            target.members.insert(member.clone());
            self.agent_cluster.insert(member.clone(), target.cluster_id.clone());
        }
        if !target.members.contains(&target.leader_id) {
            target.leader_id = target.members.iter().min().cloned().unwrap_or_default();
        }
    }
}

async fn gather_cluster_vote(
    cluster: &Cluster,
    pool: &AgentPool,
    decision_input: &DecisionInput<'_>,
    baselines: &vault_agents::WatchdogBaselines,
) -> ClusterDecision {
    let mut vote_distribution: HashMap<DecisionOutcome, usize> = HashMap::new();
    for member in &cluster.members {
        let Some(instance) = pool.agent(member) else {
            continue;
        };
        let vote = decide(member, instance.agent_type, decision_input, baselines);
        *vote_distribution.entry(vote.decision).or_insert(0) += 1;
        // Yield after each member dispatch so a cluster with many
        // members can be preempted by the caller's phase timeout
        // instead of running the whole vote to completion regardless.
        tokio::task::yield_now().await;
    }

    let total_voters: usize = vote_distribution.values().sum();
    if total_voters == 0 {
        return ClusterDecision {
            decision: DecisionOutcome::Error,
            confidence: 0.0,
            leader_id: cluster.leader_id.clone(),
            vote_distribution,
        };
    }

    let mut winner: Option<(DecisionOutcome, usize)> = None;
    for (&decision, &count) in vote_distribution.iter() {
        let replace = match winner {
            None => true,
            Some((best_decision, best_count)) => {
                count > best_count || (count == best_count && decision_priority(decision) < decision_priority(best_decision))
            }
        };
        if replace {
            winner = Some((decision, count));
        }
    }
    let (winner_decision, winner_count) = winner.unwrap();

    ClusterDecision {
        decision: winner_decision,
        confidence: winner_count as f64 / total_voters as f64,
        leader_id: cluster.leader_id.clone(),
        vote_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration as StdDuration;
    use vault_agents::WatchdogBaselines;
    use vault_core::RiskLevel;
    use vault_security::audit::InMemoryAuditWriter;
    use vault_security::telemetry::NullTelemetrySink;
    use vault_trust::{ContextVerificationResult, EvaluationContext, TrustEvaluation, TrustMetrics};

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ClusterConfig::default(), Arc::new(InMemoryAuditWriter::new()), Arc::new(NullTelemetrySink)).unwrap()
    }

    fn trust_eval() -> TrustEvaluation {
        TrustEvaluation {
            user_id: "u1".to_string(),
            overall_score: 95.0,
            risk_level: RiskLevel::VeryLow,
            metrics: TrustMetrics {
                device_consistency: 95.0,
                temporal_patterns: 95.0,
                geographic_consistency: 95.0,
                behavioral_patterns: 95.0,
                access_frequency: 95.0,
                risk_indicators: 95.0,
                compliance_score: 95.0,
                historical_reliability: 95.0,
            },
            confidence: 90.0,
            adaptive_thresholds: Default::default(),
            recommendations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn full_verification() -> ContextVerificationResult {
        ContextVerificationResult {
            device_verified: true,
            timestamp_verified: true,
            location_verified: true,
            pattern_verified: true,
            preliminary_score: 100.0,
            combined_proof_hash: Some("hash".to_string()),
            level_met: true,
        }
    }

    fn request(minimum_consensus: f64) -> ConsensusRequest {
        ConsensusRequest {
            request_id: "req-1".to_string(),
            request_type: "vault_access".to_string(),
            payload: serde_json::json!({}),
            priority: 5,
            timeout: StdDuration::from_secs(5),
            required_clusters: None,
            minimum_consensus,
            created_at: Utc::now(),
        }
    }

    // Testable property 7: single cluster, all-ALLOW votes -> full
    // consensus at confidence 1.0.
    #[tokio::test]
    async fn single_cluster_unanimous_allow_reaches_consensus() {
        let pool = AgentPool::new(vault_agents::PoolConfig::default(), Arc::new(InMemoryAuditWriter::new()), Arc::new(NullTelemetrySink)).unwrap();
        pool.initialize_pool().await.unwrap();
        let ids = pool.all_agent_ids();

        let engine = engine();
        engine.initialize_clustering(ids).unwrap();
        assert!(engine.cluster_count() >= 1);

        let trust = trust_eval();
        let verification = full_verification();
        let context = EvaluationContext {
            is_business_hours: true,
            ip_consistent: true,
            ..Default::default()
        };
        let input = DecisionInput {
            request_id: "req-1",
            verification: &verification,
            trust: &trust,
            context: &context,
        };
        let baselines = WatchdogBaselineStore::new();
        let req = request(0.1);

        let result = engine.execute_hierarchical_consensus(&req, &pool, &baselines, &input).await;
        assert!(result.consensus_reached);
        assert_eq!(result.final_decision, DecisionOutcome::Allow);
        assert_eq!(result.phase_records.len(), 4);
    }

    // Testable property 8: minimum-consensus law.
    #[tokio::test]
    async fn insufficient_consensus_when_below_minimum() {
        let pool = AgentPool::new(vault_agents::PoolConfig::default(), Arc::new(InMemoryAuditWriter::new()), Arc::new(NullTelemetrySink)).unwrap();
        pool.initialize_pool().await.unwrap();
        let ids = pool.all_agent_ids();

        let engine = engine();
        engine.initialize_clustering(ids).unwrap();

        let trust = trust_eval();
        let verification = full_verification();
        let context = EvaluationContext {
            is_business_hours: true,
            ip_consistent: true,
            ..Default::default()
        };
        let input = DecisionInput {
            request_id: "req-2",
            verification: &verification,
            trust: &trust,
            context: &context,
        };
        let baselines = WatchdogBaselineStore::new();
        let req = request(1.01); // unattainable minimum

        let result = engine.execute_hierarchical_consensus(&req, &pool, &baselines, &input).await;
        assert!(!result.consensus_reached);
        assert_eq!(result.final_decision, DecisionOutcome::InsufficientConsensus);
    }

    #[test]
    fn agent_failure_promotes_backup_leader() {
        let engine = engine();
        let ids: Vec<String> = (0..8).map(|i| format!("agent-{i:04}")).collect();
        engine.initialize_clustering(ids).unwrap();

        let cluster_id = engine.clusters_snapshot()[0].cluster_id.clone();
        let original_leader = engine.cluster(&cluster_id).unwrap().leader_id;

        engine.handle_agent_failure(&original_leader);

        let updated = engine.cluster(&cluster_id).unwrap();
        assert_ne!(updated.leader_id, original_leader);
        assert!(updated.members.contains(&updated.leader_id));
    }

    #[test]
    fn argmax_breaks_ties_toward_allow() {
        let mut tally = HashMap::new();
        tally.insert(DecisionOutcome::Allow, 5.0);
        tally.insert(DecisionOutcome::Deny, 5.0);
        let (winner, _) = argmax_decision(&tally).unwrap();
        assert_eq!(winner, DecisionOutcome::Allow);
    }
}
