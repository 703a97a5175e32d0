//! Data model for the Performance Monitor (C6) and Scalability
//! Coordinator (C7): `SystemHealth` plus the scaling-event ring shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_core::{AgentType, HealthLevel, ScalabilityStatus};

/// "SystemHealth (periodic snapshot)".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub network_io_bytes_per_sec: f64,
    pub active_agents: usize,
    pub pending_decisions: usize,
    pub avg_response_ms: f64,
    pub error_rate: f64,
    pub level: HealthLevel,
    pub scalability_status: ScalabilityStatus,
    pub bottlenecks: Vec<String>,
    pub recommendations: Vec<String>,
    pub sampled_at: DateTime<Utc>,
}

/// The raw, out-of-scope OS counters asks the monitor to
/// sample "via OS counters" each cycle. Modeled as a collaborator
/// ('s pattern for facades over capabilities this core does not
/// implement itself) rather than hand-rolling a `/proc` reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawResourceSample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub network_io_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingActionKind {
    ScaleUp,
    ScaleDown,
    None,
}

/// step 5: `{timestamp, action, type, amount, reason,
/// health_before}` appended to a bounded ring (≤100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingAction {
    pub timestamp: DateTime<Utc>,
    pub action: ScalingActionKind,
    pub agent_type: Option<AgentType>,
    pub amount: i64,
    pub reason: String,
    pub health_before: HealthLevel,
}

/// Coordinator tuning: critical/warning thresholds and the background
/// tick interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalabilityConfig {
    pub monitoring_interval_secs: u64,
    pub cpu_critical: f64,
    pub mem_critical: f64,
    pub response_critical_ms: f64,
    pub error_rate_critical: f64,
    pub agents_critical: usize,
    pub cpu_warning: f64,
    pub mem_warning: f64,
    pub response_warning_ms: f64,
    pub error_rate_warning: f64,
    pub agents_warning: usize,
    pub agents_good: usize,
    pub low_util_cpu: f64,
    pub low_util_mem: f64,
    pub low_util_agents: usize,
    pub predictor_window: usize,
    pub predictor_threshold: f64,
}

impl Default for ScalabilityConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: 30,
            cpu_critical: 90.0,
            mem_critical: 95.0,
            response_critical_ms: 5000.0,
            error_rate_critical: 0.15,
            agents_critical: 150,
            cpu_warning: 70.0,
            mem_warning: 80.0,
            response_warning_ms: 1000.0,
            error_rate_warning: 0.05,
            agents_warning: 100,
            agents_good: 50,
            low_util_cpu: 30.0,
            low_util_mem: 40.0,
            low_util_agents: 20,
            predictor_window: 10,
            predictor_threshold: 0.8,
        }
    }
}

impl ScalabilityConfig {
    pub fn validate(&self) -> vault_core::VaultResult<()> {
        if self.monitoring_interval_secs == 0 {
            return Err(vault_core::VaultError::Configuration(
                "monitoring_interval_secs must be positive".to_string(),
            ));
        }
        if self.cpu_critical <= self.cpu_warning || self.mem_critical <= self.mem_warning {
            return Err(vault_core::VaultError::Configuration(
                "critical thresholds must exceed warning thresholds".to_string(),
            ));
        }
        Ok(())
    }
}
