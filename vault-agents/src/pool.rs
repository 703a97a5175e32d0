//! Agent Pool Manager (C4): lifecycle, health, load-balanced
//! dispatch, and auto-scaling of the heterogeneous agent population.
//!
//! Ownership: the pool is the *single writer* of every `AgentInstance`
//! and of the agent registry itself. `vault-consensus` only ever holds
//! agent ids, never an `AgentInstance`, so there is no cyclic reference
//! between pool and engine.

use crate::config::{LoadBalancingStrategy, PoolConfig};
use crate::instance::AgentInstance;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vault_core::{AgentStatus, AgentType, BoundedHistory, PoolStatus, VaultError, VaultResult};
use vault_security::audit::{AuditEvent, MerkleAuditWriter};
use vault_security::telemetry::TelemetrySink;

const SCALING_EVENT_RING_CAP: usize = 1000;

/// Explicit owning handle for an agent's decision worker, with a
/// `Weak` liveness probe the health-check loop uses instead of relying
/// on GC finalization ("Weak references" redesign note). The
/// workflow in `vault-agents::workflow` is a pure function today, so
/// this handle carries no executable state yet -- it exists so a
/// future stateful worker (e.g. one holding a live ZK session) slots
/// in without changing the pool's removal path.
#[derive(Debug)]
pub struct AgentWorkerHandle {
    pub agent_id: String,
    pub agent_type: AgentType,
}

#[derive(Debug, Clone)]
pub struct ScalingEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_type: AgentType,
    pub delta: i64,
    pub reason: String,
}

struct TypeRuntime {
    round_robin: AtomicUsize,
    last_scale_up: Mutex<Option<DateTime<Utc>>>,
    last_scale_down: Mutex<Option<DateTime<Utc>>>,
}

impl Default for TypeRuntime {
    fn default() -> Self {
        Self {
            round_robin: AtomicUsize::new(0),
            last_scale_up: Mutex::new(None),
            last_scale_down: Mutex::new(None),
        }
    }
}

pub struct AgentPool {
    config: Mutex<PoolConfig>,
    agents: DashMap<String, AgentInstance>,
    workers: DashMap<String, Arc<AgentWorkerHandle>>,
    runtimes: DashMap<AgentType, TypeRuntime>,
    scaling_events: Mutex<BoundedHistory<ScalingEvent>>,
    status: Mutex<PoolStatus>,
    next_id: AtomicUsize,
    audit: Arc<dyn MerkleAuditWriter>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl AgentPool {
    pub fn new(config: PoolConfig, audit: Arc<dyn MerkleAuditWriter>, telemetry: Arc<dyn TelemetrySink>) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Mutex::new(config),
            agents: DashMap::new(),
            workers: DashMap::new(),
            runtimes: DashMap::new(),
            scaling_events: Mutex::new(BoundedHistory::new(SCALING_EVENT_RING_CAP)),
            status: Mutex::new(PoolStatus::Initializing),
            next_id: AtomicUsize::new(0),
            audit,
            telemetry,
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config.lock().clone()
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.lock()
    }

    fn next_agent_id(&self, ty: AgentType) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{ty}-{n:06}")
    }

    /// `initialize_pool`: create `target` of each type,
    /// mark the pool Active. Background tasks are started separately
    /// via `spawn_health_check_task`/`spawn_auto_scale_task` so callers
    /// control the cancellation token lifetime.
    pub async fn initialize_pool(&self) -> VaultResult<()> {
        let config = self.config();
        for ty in AgentType::ALL {
            let bounds = config.bounds_for(ty);
            for _ in 0..bounds.target {
                self.spawn_agent(ty);
            }
        }
        *self.status.lock() = PoolStatus::Active;
        self.telemetry.gauge("pool_agents_total", self.agents.len() as f64);
        info!(count = self.agents.len(), "agent pool initialized");
        Ok(())
    }

    fn spawn_agent(&self, ty: AgentType) -> String {
        let agent_id = self.next_agent_id(ty);
        let mut instance = AgentInstance::new(agent_id.clone(), ty);
        instance.status = AgentStatus::Ready;
        let worker = Arc::new(AgentWorkerHandle { agent_id: agent_id.clone(), agent_type: ty });
        self.workers.insert(agent_id.clone(), worker);
        self.agents.insert(agent_id.clone(), instance);
        agent_id
    }

    /// Exposed so external observers (the Performance Monitor in
    /// `vault-scalability`) can register their own weak liveness probes
    /// against the same worker handles the pool itself uses — agents
    /// are registered via weak handles so a dropped worker is detected
    /// rather than silently leaked.
    pub fn worker_liveness(&self, agent_id: &str) -> Weak<AgentWorkerHandle> {
        self.workers.get(agent_id).map(|w| Arc::downgrade(&w)).unwrap_or_default()
    }

    pub fn counts_by_type(&self) -> HashMap<AgentType, usize> {
        let mut counts = HashMap::new();
        for entry in self.agents.iter() {
            *counts.entry(entry.agent_type).or_insert(0) += 1;
        }
        counts
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentInstance> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    pub fn all_agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|e| e.key().clone()).collect()
    }

    /// `get_available_agent`: filter by status and health,
    /// apply the configured load-balancing strategy, mark the chosen
    /// agent Busy.
    pub fn get_available_agent(&self, ty: Option<AgentType>) -> Option<String> {
        let candidates: Vec<String> = self
            .agents
            .iter()
            .filter(|e| {
                matches!(e.status, AgentStatus::Ready | AgentStatus::Idle)
                    && e.health_score > 0.5
                    && ty.map(|t| t == e.agent_type).unwrap_or(true)
            })
            .map(|e| e.key().clone())
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let strategy = self.config().strategy;
        let chosen = match strategy {
            LoadBalancingStrategy::RoundRobin => {
                let rt_key = ty.unwrap_or(AgentType::Neutral);
                let rt = self.runtimes.entry(rt_key).or_default();
                let idx = rt.round_robin.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates[idx].clone()
            }
            LoadBalancingStrategy::LeastLoaded => candidates
                .iter()
                .min_by(|a, b| {
                    let la = self.agents.get(*a).map(|e| e.current_load).unwrap_or(f64::MAX);
                    let lb = self.agents.get(*b).map(|e| e.current_load).unwrap_or(f64::MAX);
                    la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned()
                .unwrap_or_else(|| candidates[0].clone()),
            LoadBalancingStrategy::WeightedRandom => {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|id| {
                        let load = self.agents.get(id).map(|e| e.current_load).unwrap_or(1.0);
                        (1.0 - load).max(0.1)
                    })
                    .collect();
                let total: f64 = weights.iter().sum();
                let mut roll = rand::thread_rng().gen_range(0.0..total.max(f64::EPSILON));
                let mut chosen_idx = candidates.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    if roll < *w {
                        chosen_idx = i;
                        break;
                    }
                    roll -= w;
                }
                candidates[chosen_idx].clone()
            }
        };

        if let Some(mut agent) = self.agents.get_mut(&chosen) {
            agent.record_dispatch(Utc::now());
        }
        Some(chosen)
    }

    /// `release_agent`.
    pub fn release_agent(&self, agent_id: &str, processing_ms: f64, success: bool) {
        if let Some(mut agent) = self.agents.get_mut(agent_id) {
            agent.record_release(processing_ms, success, Utc::now());
        }
    }

    /// `remove_agent`.
    pub fn remove_agent(&self, agent_id: &str, reason: &str) {
        if let Some(mut agent) = self.agents.get_mut(agent_id) {
            agent.status = AgentStatus::Stopping;
        }
        self.agents.remove(agent_id);
        self.workers.remove(agent_id);
        info!(agent_id, reason, "agent removed from pool");
    }

    /// health scoring + "Failed agents are removed, not
    /// repaired." Returns the ids removed this pass.
    pub async fn run_health_check(&self) -> Vec<String> {
        let max_idle = self.config().max_idle_secs;
        let now = Utc::now();
        let mut failed = Vec::new();

        let ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let probe_alive = self.worker_liveness(&id).upgrade().is_some();
            if !probe_alive {
                failed.push(id);
                continue;
            }
            if let Some(mut agent) = self.agents.get_mut(&id) {
                agent.recompute_health(now, max_idle);
                if agent.health_score < 0.3 {
                    agent.status = AgentStatus::Failed;
                    failed.push(id.clone());
                }
            }
        }

        for id in &failed {
            self.remove_agent(id, "health_score below 0.3");
            let _ = self
                .audit
                .write(AuditEvent {
                    event: "agent_health_failure".to_string(),
                    timestamp: now,
                    detail: serde_json::json!({ "agent_id": id }),
                })
                .await;
        }
        failed
    }

    /// `scale_up`: honor per-type max and cooldown.
    pub async fn scale_up(&self, ty: AgentType, n: usize, reason: &str) -> VaultResult<usize> {
        let config = self.config();
        let bounds = config.bounds_for(ty);
        let cooldown = chrono::Duration::seconds(config.scale_up_cooldown_secs);

        let rt = self.runtimes.entry(ty).or_default();
        {
            let mut last = rt.last_scale_up.lock();
            let now = Utc::now();
            if let Some(prev) = *last {
                if now - prev < cooldown {
                    warn!(%ty, "scale-up dropped: within cooldown window");
                    return Ok(0);
                }
            }
            *last = Some(now);
        }
        drop(rt);

        let current = self.counts_by_type().get(&ty).copied().unwrap_or(0);
        let allowed = bounds.max.saturating_sub(current).min(n);
        for _ in 0..allowed {
            self.spawn_agent(ty);
        }
        if allowed > 0 {
            self.record_scaling_event(ty, allowed as i64, reason).await;
        }
        Ok(allowed)
    }

    /// `scale_down`: honor per-type min and cooldown.
    pub async fn scale_down(&self, ty: AgentType, n: usize, reason: &str) -> VaultResult<usize> {
        let config = self.config();
        let bounds = config.bounds_for(ty);
        let cooldown = chrono::Duration::seconds(config.scale_down_cooldown_secs);

        let rt = self.runtimes.entry(ty).or_default();
        {
            let mut last = rt.last_scale_down.lock();
            let now = Utc::now();
            if let Some(prev) = *last {
                if now - prev < cooldown {
                    warn!(%ty, "scale-down dropped: within cooldown window");
                    return Ok(0);
                }
            }
            *last = Some(now);
        }
        drop(rt);

        let current = self.counts_by_type().get(&ty).copied().unwrap_or(0);
        let allowed = current.saturating_sub(bounds.min).min(n);

        let mut candidates: Vec<String> = self
            .agents
            .iter()
            .filter(|e| e.agent_type == ty && matches!(e.status, AgentStatus::Ready | AgentStatus::Idle))
            .map(|e| e.key().clone())
            .collect();
        candidates.sort_by(|a, b| {
            let la = self.agents.get(a).map(|e| e.current_load).unwrap_or(0.0);
            let lb = self.agents.get(b).map(|e| e.current_load).unwrap_or(0.0);
            la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut removed = 0;
        for id in candidates.into_iter().take(allowed) {
            self.remove_agent(&id, reason);
            removed += 1;
        }
        if removed > 0 {
            self.record_scaling_event(ty, -(removed as i64), reason).await;
        }
        Ok(removed)
    }

    async fn record_scaling_event(&self, ty: AgentType, delta: i64, reason: &str) {
        let event = ScalingEvent {
            timestamp: Utc::now(),
            agent_type: ty,
            delta,
            reason: reason.to_string(),
        };
        self.scaling_events.lock().push(event.clone());
        self.telemetry.counter("pool_scaling_events_total", 1);
        let _ = self
            .audit
            .write(AuditEvent {
                event: "agent_pool_scaled".to_string(),
                timestamp: event.timestamp,
                detail: serde_json::json!({
                    "agent_type": ty.to_string(),
                    "delta": delta,
                    "reason": reason,
                }),
            })
            .await;
    }

    pub fn scaling_history(&self) -> Vec<ScalingEvent> {
        self.scaling_events.lock().snapshot()
    }

    /// "shutdown is draining": move every agent to Draining,
    /// then Stopping once its current dispatch (if any) finishes.
    pub async fn shutdown(&self, cancellation: &CancellationToken) {
        for mut entry in self.agents.iter_mut() {
            if entry.status != AgentStatus::Busy {
                entry.status = AgentStatus::Draining;
            }
        }
        *self.status.lock() = PoolStatus::Draining;
        cancellation.cancel();

        let ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove_agent(&id, "pool shutdown");
        }
        *self.status.lock() = PoolStatus::Initializing;
    }

    /// Background health-check loop (: "background samplers ...
    /// run as long-lived tasks that yield between ticks"). The caller
    /// owns the returned `JoinHandle`; `cancellation` is checked at
    /// every tick so shutdown is prompt, never mid-sleep-forever.
    pub fn spawn_health_check_task(self: Arc<Self>, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interval_secs = self.config().health_check_interval_secs;
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.run_health_check().await;
                        if !removed.is_empty() {
                            info!(count = removed.len(), "health check removed failed agents");
                        }
                    }
                }
            }
        })
    }

    /// Background load-based auto-scale loop: per the
    /// pool's own scale thresholds react to aggregate load per type,
    /// independent of the Scalability Coordinator's (C7) health-driven
    /// scaling in `vault-scalability`.
    pub fn spawn_auto_scale_task(self: Arc<Self>, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interval_secs = self.config().health_check_interval_secs;
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        let config = self.config();
                        for ty in AgentType::ALL {
                            let loads: Vec<f64> = self
                                .agents
                                .iter()
                                .filter(|e| e.agent_type == ty)
                                .map(|e| e.current_load)
                                .collect();
                            if loads.is_empty() {
                                continue;
                            }
                            let avg_load = loads.iter().sum::<f64>() / loads.len() as f64;
                            if avg_load > config.scale_up_threshold {
                                let _ = self.scale_up(ty, 1, "load_above_threshold").await;
                            } else if avg_load < config.scale_down_threshold {
                                let _ = self.scale_down(ty, 1, "load_below_threshold").await;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use vault_security::audit::InMemoryAuditWriter;
    use vault_security::telemetry::NullTelemetrySink;

    fn pool() -> AgentPool {
        AgentPool::new(PoolConfig::default(), Arc::new(InMemoryAuditWriter::new()), Arc::new(NullTelemetrySink)).unwrap()
    }

    #[tokio::test]
    async fn initialize_pool_creates_target_counts_per_type() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let counts = pool.counts_by_type();
        assert_eq!(counts[&AgentType::Neutral], 5);
        assert_eq!(counts[&AgentType::Permissive], 3);
        assert_eq!(counts[&AgentType::Strict], 3);
        assert_eq!(counts[&AgentType::Watchdog], 2);
    }

    #[tokio::test]
    async fn get_available_agent_marks_busy_and_excludes_from_next_pick() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();

        let first = pool.get_available_agent(Some(AgentType::Neutral)).unwrap();
        let agent = pool.agent(&first).unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);

        // The busy agent must not be picked again while still busy.
        for _ in 0..10 {
            let next = pool.get_available_agent(Some(AgentType::Neutral));
            if let Some(next_id) = next {
                assert_ne!(next_id, first);
            }
        }
    }

    #[tokio::test]
    async fn scale_up_honors_max_bound() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        // Neutral target=5, max=20 -- ask for far more than the remaining headroom.
        let added = pool.scale_up(AgentType::Neutral, 100, "test").await.unwrap();
        assert_eq!(added, 15); // 20 - 5
    }

    #[tokio::test]
    async fn second_scale_up_within_cooldown_is_dropped() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let first = pool.scale_up(AgentType::Watchdog, 1, "test").await.unwrap();
        let second = pool.scale_up(AgentType::Watchdog, 1, "test").await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0, "second scale-up within cooldown must be dropped, not queued");
    }

    #[tokio::test]
    async fn scale_down_never_drops_below_min() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        // Strict min=1, target=3 -- ask to remove more than is allowed.
        let removed = pool.scale_down(AgentType::Strict, 100, "test").await.unwrap();
        assert_eq!(removed, 2); // 3 - 1
        assert_eq!(pool.counts_by_type()[&AgentType::Strict], 1);
    }

    #[tokio::test]
    async fn health_check_removes_agents_below_threshold() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let id = pool.get_available_agent(Some(AgentType::Neutral)).unwrap();
        pool.release_agent(&id, 50.0, true);
        {
            let mut agent = pool.agents.get_mut(&id).unwrap();
            agent.total = 10;
            agent.successful = 0;
            agent.failed = 10;
            agent.avg_response_ms = 10_000.0;
        }
        let removed = pool.run_health_check().await;
        assert!(removed.contains(&id));
        assert!(pool.agent(&id).is_none());
    }

    #[tokio::test]
    async fn scaling_history_records_deltas() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        pool.scale_up(AgentType::Neutral, 2, "burst").await.unwrap();
        let history = pool.scaling_history();
        assert!(history.iter().any(|e| e.delta == 2 && e.reason == "burst"));
    }
}
