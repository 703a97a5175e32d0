//! `System`: the composition root wiring C1-C7 together. No
//! process-wide globals -- everything a caller needs is reached through
//! a `System` handle.

use crate::config::{TelemetryBackend, VaultConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vault_agents::{AgentPool, WatchdogBaselineStore};
use vault_consensus::{ClusterConfig, ConsensusEngine, ConsensusRequest, HierarchicalConsensusResult};
use vault_core::{AgentType, VaultError, VaultResult};
use vault_scalability::{ResourceSampler, ScalabilityCoordinator, ScalingAction, StaticResourceSampler, SystemHealth};
use vault_security::audit::{InMemoryAuditWriter, MerkleAuditWriter};
use vault_security::telemetry::{NullTelemetrySink, PrometheusTelemetrySink, TelemetrySink};
use vault_security::zk::ReferenceZkRunner;
use vault_trust::{
    is_plausible_data_dir, ContextVerificationAdapter, EvaluationContext, InMemoryTrustProfileStore,
    JsonFileTrustProfileStore, RequirementFlags, TrustProfileStore, TrustScoringEngine, VerificationLevel,
};

/// The CLI-facing shape of a one-shot access request: everything needed
/// to run a user through C1 (trust), C2 (context verification), and C5
/// (hierarchical consensus) in one call. `ConsensusRequest` only covers
/// C5's own inputs; this bundles the upstream C1/C2 inputs that a real
/// caller (an access-gating vault) would also have to supply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_id: String,
    pub context: EvaluationContext,
    pub challenge_nonce: String,
    pub required_device: bool,
    pub required_timestamp: bool,
    pub required_location: bool,
    pub required_pattern: bool,
    pub verification_level: String,
    pub request_id: String,
    pub request_type: String,
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub timeout_secs: f64,
    #[serde(default)]
    pub required_clusters: Option<Vec<String>>,
    pub minimum_consensus: f64,
}

fn default_payload() -> serde_json::Value {
    serde_json::json!({})
}

fn default_priority() -> u8 {
    5
}

fn parse_level(level: &str) -> VaultResult<VerificationLevel> {
    match level {
        "basic" => Ok(VerificationLevel::Basic),
        "standard" => Ok(VerificationLevel::Standard),
        "high" => Ok(VerificationLevel::High),
        "maximum" => Ok(VerificationLevel::Maximum),
        other => Err(VaultError::Configuration(format!("unknown verification level: {other}"))),
    }
}

/// Wires C1-C7 together and owns the background tasks spawned against
/// them (health-check, auto-scale, scalability loop). Dropping a
/// `System` without calling `shutdown` first leaves those tasks
/// running until the process exits -- `shutdown` is the graceful path.
pub struct System {
    config: VaultConfig,
    trust_engine: Arc<TrustScoringEngine>,
    context_adapter: Arc<ContextVerificationAdapter>,
    pool: Arc<AgentPool>,
    consensus: Arc<ConsensusEngine>,
    coordinator: Arc<ScalabilityCoordinator>,
    watchdog_baselines: Arc<WatchdogBaselineStore>,
    resource_sampler: Arc<dyn ResourceSampler>,
    telemetry: Arc<dyn TelemetrySink>,
    cancellation: CancellationToken,
    background_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl System {
    /// Build every component in dependency order (crate
    /// ordering mirrors this): security collaborators first, then C1/C2,
    /// then C4, then C5, then C6/C7. Does not start any background task
    /// or populate the agent pool -- call `initialize` for that.
    pub async fn new(config: VaultConfig) -> Result<Self> {
        config.validate().context("invalid vault configuration")?;

        if !is_plausible_data_dir(&config.data_dir) {
            anyhow::bail!("data_dir {:?} is not inside an existing directory", config.data_dir);
        }

        let telemetry: Arc<dyn TelemetrySink> = match config.security.telemetry {
            TelemetryBackend::Null => Arc::new(NullTelemetrySink),
            TelemetryBackend::Prometheus => PrometheusTelemetrySink::new(),
        };
        let audit: Arc<dyn MerkleAuditWriter> = Arc::new(InMemoryAuditWriter::new());

        let profile_store: Arc<dyn TrustProfileStore> = if config.security.persist_trust_profiles {
            Arc::new(JsonFileTrustProfileStore::new(config.data_dir.clone()))
        } else {
            Arc::new(InMemoryTrustProfileStore::new())
        };
        let trust_engine = Arc::new(TrustScoringEngine::new(profile_store, audit.clone()));
        let context_adapter = Arc::new(ContextVerificationAdapter::new(Arc::new(ReferenceZkRunner)));

        let pool = Arc::new(AgentPool::new(config.agents.clone(), audit.clone(), telemetry.clone())?);
        let consensus = Arc::new(ConsensusEngine::new(config.consensus, audit.clone(), telemetry.clone())?);
        let coordinator = Arc::new(ScalabilityCoordinator::new(config.scalability.clone(), audit.clone(), telemetry.clone())?);
        let watchdog_baselines = Arc::new(WatchdogBaselineStore::new());

        info!(data_dir = ?config.data_dir, "vault control plane components wired");

        Ok(Self {
            config,
            trust_engine,
            context_adapter,
            pool,
            consensus,
            coordinator,
            watchdog_baselines,
            resource_sampler: Arc::new(StaticResourceSampler::default()),
            telemetry,
            cancellation: CancellationToken::new(),
            background_tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Populate the agent pool to its per-type targets, cluster the
    /// resulting agents, and start the three background loops: pool
    /// health checks, pool auto-scaling, and the scalability
    /// coordinator's monitor-then-scale tick.
    pub async fn initialize(&self) -> VaultResult<()> {
        self.pool.initialize_pool().await?;
        self.consensus.initialize_clustering(self.pool.all_agent_ids())?;

        let mut tasks = self.background_tasks.lock();
        tasks.push(self.pool.clone().spawn_health_check_task(self.cancellation.clone()));
        tasks.push(self.pool.clone().spawn_auto_scale_task(self.cancellation.clone()));
        tasks.push(self.coordinator.clone().spawn_loop(
            self.pool.clone(),
            self.consensus.clone(),
            self.resource_sampler.clone(),
            self.cancellation.clone(),
        ));
        Ok(())
    }

    /// Run one user through C1 (trust), C2 (context verification), and
    /// C5 (hierarchical consensus across the full agent pool).
    pub async fn evaluate_access(&self, request: &AccessRequest) -> VaultResult<HierarchicalConsensusResult> {
        let level = parse_level(&request.verification_level)?;
        let required = RequirementFlags {
            device: request.required_device,
            timestamp: request.required_timestamp,
            location: request.required_location,
            pattern: request.required_pattern,
        };

        let trust = self.trust_engine.evaluate(&request.user_id, &request.context).await;
        let verification = self
            .context_adapter
            .verify(&request.user_id, &request.context, &request.challenge_nonce, required, level)
            .await;

        let decision_input = vault_agents::DecisionInput {
            request_id: &request.request_id,
            verification: &verification,
            trust: &trust,
            context: &request.context,
        };

        let consensus_request = ConsensusRequest {
            request_id: request.request_id.clone(),
            request_type: request.request_type.clone(),
            payload: request.payload.clone(),
            priority: request.priority,
            timeout: std::time::Duration::from_secs_f64(request.timeout_secs.max(0.1)),
            required_clusters: request.required_clusters.clone(),
            minimum_consensus: request.minimum_consensus,
            created_at: chrono::Utc::now(),
        };

        Ok(self
            .consensus
            .execute_hierarchical_consensus(&consensus_request, &self.pool, &self.watchdog_baselines, &decision_input)
            .await)
    }

    /// Manual scaling entry point, exposed to the CLI's `scale`
    /// subcommand.
    pub async fn manual_scale(&self, agent_type: AgentType, delta: i64, reason: &str) -> VaultResult<i64> {
        self.coordinator
            .manual_scale(&self.pool, &self.consensus, agent_type, delta, reason)
            .await
    }

    pub fn scaling_history(&self) -> Vec<ScalingAction> {
        self.coordinator.scaling_history()
    }

    pub fn sample_health(&self) -> SystemHealth {
        self.coordinator.monitor().sample(&self.pool, self.resource_sampler.as_ref())
    }

    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "pool_status": self.pool.status(),
            "agent_counts": self.pool.counts_by_type(),
            "cluster_count": self.consensus.cluster_count(),
            "coordinators": self.consensus.coordinators(),
            "partition_history": self.consensus.partition_history(),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn consensus_config(&self) -> ClusterConfig {
        self.config.consensus
    }

    /// Graceful shutdown (redesign note: cancellation token
    /// rather than a polled "running" flag). Cancels every background
    /// task, waits for them to observe cancellation, then drains the
    /// agent pool.
    pub async fn shutdown(&self) {
        self.cancellation.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.background_tasks.lock());
        for handle in handles {
            let _ = handle.await;
        }
        self.pool.shutdown(&self.cancellation).await;
        info!("vault control plane shut down");
    }
}
