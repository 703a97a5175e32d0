//! `AgentInstance`: exclusively owned by the Agent Pool.

use chrono::{DateTime, Utc};
use vault_core::{AgentStatus, AgentType};

#[derive(Debug, Clone)]
pub struct AgentInstance {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub current_load: f64,
    pub avg_response_ms: f64,
    pub health_score: f64,
}

impl AgentInstance {
    pub fn new(agent_id: impl Into<String>, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            agent_type,
            status: AgentStatus::Starting,
            created_at: now,
            last_activity: now,
            total: 0,
            successful: 0,
            failed: 0,
            current_load: 0.0,
            avg_response_ms: 0.0,
            health_score: 1.0,
        }
    }

    /// invariant: `successful + failed <= total`.
    pub fn invariant_holds(&self) -> bool {
        self.successful + self.failed <= self.total
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }

    /// Mean of the four health factors ("Health scoring"):
    /// response-time, success-rate, load, and idle factors.
    pub fn recompute_health(&mut self, now: DateTime<Utc>, max_idle_secs: i64) {
        let response_factor = (1.0 - self.avg_response_ms / 5000.0).max(0.0);
        let success_factor = if self.total == 0 {
            1.0
        } else {
            self.successful as f64 / self.total as f64
        };
        let load_factor = (1.0 - self.current_load).max(0.0);
        let idle_secs = self.idle_for(now).num_seconds();
        let idle_factor = if idle_secs <= max_idle_secs { 1.0 } else { 0.5 };

        self.health_score = (response_factor + success_factor + load_factor + idle_factor) / 4.0;
    }

    pub fn record_dispatch(&mut self, now: DateTime<Utc>) {
        self.status = AgentStatus::Busy;
        self.last_activity = now;
    }

    /// `release_agent`: update counters, running mean of
    /// response time, decay load, transition to Idle or Ready.
    pub fn record_release(&mut self, processing_ms: f64, success: bool, now: DateTime<Utc>) {
        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.avg_response_ms = if self.total == 1 {
            processing_ms
        } else {
            (self.avg_response_ms * (self.total - 1) as f64 + processing_ms) / self.total as f64
        };
        self.current_load = (self.current_load - 0.1).max(0.0);
        self.last_activity = now;
        self.status = if self.current_load < 0.1 {
            AgentStatus::Idle
        } else {
            AgentStatus::Ready
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_starts_with_full_health_and_zero_counters() {
        let agent = AgentInstance::new("a-1", AgentType::Neutral);
        assert_eq!(agent.status, AgentStatus::Starting);
        assert!(agent.invariant_holds());
        assert_eq!(agent.health_score, 1.0);
    }

    #[test]
    fn release_decays_load_and_updates_running_mean() {
        let mut agent = AgentInstance::new("a-2", AgentType::Neutral);
        agent.current_load = 0.5;
        let now = Utc::now();
        agent.record_release(100.0, true, now);
        assert_eq!(agent.total, 1);
        assert_eq!(agent.successful, 1);
        assert_eq!(agent.avg_response_ms, 100.0);
        assert!((agent.current_load - 0.4).abs() < 1e-9);
        assert_eq!(agent.status, AgentStatus::Ready);
    }

    #[test]
    fn release_transitions_to_idle_when_load_drops_below_threshold() {
        let mut agent = AgentInstance::new("a-3", AgentType::Neutral);
        agent.current_load = 0.05;
        agent.record_release(50.0, true, Utc::now());
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[test]
    fn health_drops_with_high_response_time_and_low_success_rate() {
        let mut agent = AgentInstance::new("a-4", AgentType::Neutral);
        agent.avg_response_ms = 6000.0;
        agent.total = 10;
        agent.successful = 3;
        agent.failed = 7;
        agent.recompute_health(Utc::now(), 600);
        assert!(agent.health_score < 0.5, "health was {}", agent.health_score);
    }
}
