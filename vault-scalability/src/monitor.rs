//! Performance Monitor (C6): samples system + per-agent telemetry
//! every cycle, keeps a bounded history per named metric, and derives
//! a `SystemHealth` snapshot from a threshold rule set.

use crate::resource::ResourceSampler;
use crate::types::SystemHealth;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use vault_agents::{AgentPool, AgentWorkerHandle};
use vault_core::{AgentStatus, BoundedHistory, HealthLevel, ScalabilityStatus};
use vault_security::telemetry::TelemetrySink;

const METRIC_HISTORY_CAP: usize = 1000;

const METRIC_NAMES: [&str; 7] =
    ["cpu_percent", "mem_percent", "disk_percent", "network_io", "avg_response_ms", "error_rate", "active_agents"];

pub struct PerformanceMonitor {
    metric_history: DashMap<&'static str, Mutex<BoundedHistory<f64>>>,
    registrations: DashMap<String, std::sync::Weak<AgentWorkerHandle>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PerformanceMonitor {
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        let metric_history = DashMap::new();
        for name in METRIC_NAMES {
            metric_history.insert(name, Mutex::new(BoundedHistory::new(METRIC_HISTORY_CAP)));
        }
        Self { metric_history, registrations: DashMap::new(), telemetry }
    }

    fn push_metric(&self, name: &'static str, value: f64) {
        if let Some(history) = self.metric_history.get(name) {
            history.lock().push(value);
        }
    }

    pub fn metric_history(&self, name: &str) -> Vec<f64> {
        self.metric_history.get(name).map(|h| h.lock().snapshot()).unwrap_or_default()
    }

    /// "Agents are registered via weak handles; collection of
    /// a handle causes automatic deregistration." The pool remains the
    /// sole owner of the handle's `Arc`; the monitor only ever holds
    /// `Weak` copies, mirroring the pool's own health-check probe.
    pub fn sync_registrations(&self, pool: &AgentPool) {
        for id in pool.all_agent_ids() {
            self.registrations.entry(id.clone()).or_insert_with(|| pool.worker_liveness(&id));
        }
        let dead: Vec<String> = self
            .registrations
            .iter()
            .filter(|e| e.value().upgrade().is_none())
            .map(|e| e.key().clone())
            .collect();
        for id in dead {
            self.registrations.remove(&id);
        }
    }

    pub fn registered_agent_count(&self) -> usize {
        self.registrations.len()
    }

    /// : sample OS + per-agent stats, update metric history,
    /// produce `SystemHealth` by the threshold rule.
    pub fn sample(&self, pool: &AgentPool, resource_sampler: &dyn ResourceSampler) -> SystemHealth {
        self.sync_registrations(pool);

        let raw = resource_sampler.sample();
        let agent_ids = pool.all_agent_ids();
        let agents: Vec<_> = agent_ids.iter().filter_map(|id| pool.agent(id)).collect();

        let active_agents = agents.len();
        let pending_decisions = agents.iter().filter(|a| a.status == AgentStatus::Busy).count();

        let avg_response_ms = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.avg_response_ms).sum::<f64>() / agents.len() as f64
        };

        let (total, failed): (u64, u64) = agents.iter().fold((0, 0), |(t, f), a| (t + a.total, f + a.failed));
        let error_rate = if total == 0 { 0.0 } else { failed as f64 / total as f64 };

        self.push_metric("cpu_percent", raw.cpu_percent);
        self.push_metric("mem_percent", raw.mem_percent);
        self.push_metric("disk_percent", raw.disk_percent);
        self.push_metric("network_io", raw.network_io_bytes_per_sec);
        self.push_metric("avg_response_ms", avg_response_ms);
        self.push_metric("error_rate", error_rate);
        self.push_metric("active_agents", active_agents as f64);

        self.telemetry.gauge("monitor_cpu_percent", raw.cpu_percent);
        self.telemetry.gauge("monitor_active_agents", active_agents as f64);
        self.telemetry.gauge("monitor_avg_response_ms", avg_response_ms);

        let level = health_level(raw.cpu_percent, raw.mem_percent, avg_response_ms, error_rate, active_agents);
        let scalability_status = scalability_status(raw.cpu_percent, raw.mem_percent, avg_response_ms, active_agents);
        let (bottlenecks, recommendations) =
            bottlenecks_and_recommendations(raw.cpu_percent, raw.mem_percent, avg_response_ms, error_rate, active_agents);

        SystemHealth {
            cpu_percent: raw.cpu_percent,
            mem_percent: raw.mem_percent,
            disk_percent: raw.disk_percent,
            network_io_bytes_per_sec: raw.network_io_bytes_per_sec,
            active_agents,
            pending_decisions,
            avg_response_ms,
            error_rate,
            level,
            scalability_status,
            bottlenecks,
            recommendations,
            sampled_at: chrono::Utc::now(),
        }
    }
}

/// health rule, evaluated Critical -> Degraded -> Good ->
/// Excellent (first match wins, falling through in severity order).
fn health_level(cpu: f64, mem: f64, response_ms: f64, error_rate: f64, agents: usize) -> HealthLevel {
    if cpu >= 90.0 || mem >= 95.0 || response_ms >= 5000.0 || error_rate >= 0.15 || agents >= 150 {
        HealthLevel::Critical
    } else if cpu >= 70.0 || mem >= 80.0 || response_ms >= 1000.0 || error_rate >= 0.05 || agents >= 100 {
        HealthLevel::Degraded
    } else if agents > 50 {
        HealthLevel::Good
    } else {
        HealthLevel::Excellent
    }
}

/// scalability-status rule, evaluated in the given order.
fn scalability_status(cpu: f64, mem: f64, response_ms: f64, agents: usize) -> ScalabilityStatus {
    if agents > 150 {
        ScalabilityStatus::Overloaded
    } else if agents >= 100 {
        ScalabilityStatus::AtCapacity
    } else if cpu > 80.0 || mem > 85.0 || response_ms > 3000.0 {
        ScalabilityStatus::ScalingUp
    } else if cpu < 30.0 && mem < 40.0 && agents > 10 {
        ScalabilityStatus::ScalingDown
    } else {
        ScalabilityStatus::Stable
    }
}

fn bottlenecks_and_recommendations(
    cpu: f64,
    mem: f64,
    response_ms: f64,
    error_rate: f64,
    agents: usize,
) -> (Vec<String>, Vec<String>) {
    let mut bottlenecks = Vec::new();
    let mut recommendations = Vec::new();

    if cpu >= 70.0 {
        bottlenecks.push("high CPU utilization".to_string());
        recommendations.push("scale up Neutral agents or add compute capacity".to_string());
    }
    if mem >= 80.0 {
        bottlenecks.push("high memory utilization".to_string());
        recommendations.push("investigate per-agent memory growth".to_string());
    }
    if response_ms >= 1000.0 {
        bottlenecks.push("elevated response latency".to_string());
        recommendations.push("check downstream consensus cluster health".to_string());
    }
    if error_rate >= 0.05 {
        bottlenecks.push("elevated error rate".to_string());
        recommendations.push("review recent agent vote failures".to_string());
    }
    if agents >= 100 {
        bottlenecks.push("agent pool near capacity".to_string());
        recommendations.push("raise per-type max bounds or add agent types".to_string());
    }

    (bottlenecks, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::StaticResourceSampler;
    use crate::types::RawResourceSample;
    use std::sync::Arc;
    use vault_agents::PoolConfig;
    use vault_security::audit::InMemoryAuditWriter;
    use vault_security::telemetry::NullTelemetrySink;

    fn pool() -> AgentPool {
        AgentPool::new(PoolConfig::default(), Arc::new(InMemoryAuditWriter::new()), Arc::new(NullTelemetrySink)).unwrap()
    }

    #[tokio::test]
    async fn idle_pool_reports_excellent_health() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let monitor = PerformanceMonitor::new(Arc::new(NullTelemetrySink));
        let sampler = StaticResourceSampler::default();
        let health = monitor.sample(&pool, &sampler);
        assert_eq!(health.level, HealthLevel::Excellent);
        assert_eq!(health.scalability_status, ScalabilityStatus::Stable);
    }

    #[tokio::test]
    async fn high_cpu_sample_reports_critical_health() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let monitor = PerformanceMonitor::new(Arc::new(NullTelemetrySink));
        let sampler = StaticResourceSampler { fixed: RawResourceSample { cpu_percent: 92.0, ..Default::default() } };
        let health = monitor.sample(&pool, &sampler);
        assert_eq!(health.level, HealthLevel::Critical);
        assert!(health.bottlenecks.iter().any(|b| b.contains("CPU")));
    }

    #[tokio::test]
    async fn metric_history_accumulates_across_samples() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let monitor = PerformanceMonitor::new(Arc::new(NullTelemetrySink));
        let sampler = StaticResourceSampler::default();
        for _ in 0..5 {
            monitor.sample(&pool, &sampler);
        }
        assert_eq!(monitor.metric_history("cpu_percent").len(), 5);
    }

    #[tokio::test]
    async fn dead_registrations_are_pruned_after_agent_removal() {
        let pool = pool();
        pool.initialize_pool().await.unwrap();
        let monitor = PerformanceMonitor::new(Arc::new(NullTelemetrySink));
        let sampler = StaticResourceSampler::default();
        monitor.sample(&pool, &sampler);
        let before = monitor.registered_agent_count();
        assert!(before > 0);

        let ids = pool.all_agent_ids();
        pool.remove_agent(&ids[0], "test removal");
        monitor.sample(&pool, &sampler);
        assert_eq!(monitor.registered_agent_count(), before - 1);
    }
}
