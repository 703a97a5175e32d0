//! Tagged-variant types shared across the pool, consensus, trust, and
//! scalability subsystems.
//!
//! The source system represented almost all of these as Python `Enum`
//! classes keyed by string, and request/response payloads as untyped
//! dicts. Every one of those is re-expressed here as a closed Rust enum
//! so that an unhandled case is a compile error rather than a runtime
//! `KeyError`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four agent personalities. Determines which decision workflow
/// variant `vault-agents::workflow` runs for a given agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Neutral,
    Permissive,
    Strict,
    Watchdog,
}

impl AgentType {
    /// All four variants, in a stable order used for pool initialization
    /// and config iteration.
    pub const ALL: [AgentType; 4] = [
        AgentType::Neutral,
        AgentType::Permissive,
        AgentType::Strict,
        AgentType::Watchdog,
    ];
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentType::Neutral => "neutral",
            AgentType::Permissive => "permissive",
            AgentType::Strict => "strict",
            AgentType::Watchdog => "watchdog",
        };
        f.write_str(s)
    }
}

/// Per-agent lifecycle status, owned exclusively by the Agent Pool
/// Manager. Transitions are documented in `vault-agents::pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Starting,
    Ready,
    Idle,
    Busy,
    Draining,
    Stopping,
    Failed,
}

/// Pool-wide status, reported alongside per-agent `AgentStatus`. Not
/// named in the distilled data model but needed so callers of
/// `initialize_pool`/scaling operations see a coherent summary rather
/// than having to infer pool state from individual agent counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Initializing,
    Active,
    ScalingUp,
    ScalingDown,
    Draining,
    Maintenance,
    Error,
}

/// Bucketed risk classification derived from a trust score.
///
/// Ordered from least to most severe so that "higher overall score
/// never maps to a strictly higher-risk level" (testable property 5)
/// can be checked with a plain `<=` comparison on `severity()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Lower is safer. `RiskLevel` already derives `Ord` in declaration
    /// order, but this accessor exists so call sites read as intent
    /// ("severity") rather than relying on enum discriminant order.
    pub fn severity(self) -> u8 {
        self as u8
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            RiskLevel::VeryLow
        } else if score >= 75.0 {
            RiskLevel::Low
        } else if score >= 60.0 {
            RiskLevel::Medium
        } else if score >= 40.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::VeryLow => "very_low",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        };
        f.write_str(s)
    }
}

/// The confidence floor a personality seeds its decision state with
/// before any evidence is weighed (the workflow's "Initialize" stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn floor(self) -> f64 {
        match self {
            ConfidenceBand::Low => 0.30,
            ConfidenceBand::Medium => 0.50,
            ConfidenceBand::High => 0.70,
        }
    }
}

/// The token every decision- and consensus-producing operation returns.
/// The source system built this as a free-form string; closing it here
/// means an agent or the consensus engine can never emit a typo'd
/// decision that downstream vault-access logic silently treats as deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Allow,
    AllowWithMonitoring,
    Deny,
    ConsensusFailed,
    InsufficientConsensus,
    Error,
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionOutcome::Allow => "ALLOW",
            DecisionOutcome::AllowWithMonitoring => "ALLOW_WITH_MONITORING",
            DecisionOutcome::Deny => "DENY",
            DecisionOutcome::ConsensusFailed => "CONSENSUS_FAILED",
            DecisionOutcome::InsufficientConsensus => "INSUFFICIENT_CONSENSUS",
            DecisionOutcome::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One of the four phases of hierarchical consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Intra,
    Inter,
    Global,
    Finalize,
}

/// Engine-wide estimate of cluster connectivity, derived from the
/// participation ratio after a global consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Connected,
    Healing,
    Partitioned,
    Isolated,
}

/// Overall system health bucket produced by the Performance Monitor
/// (C6) and consumed by the Scalability Coordinator (C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Excellent,
    Good,
    Degraded,
    Critical,
    Failed,
}

/// Scalability posture derived from agent count, CPU, memory, and
/// response time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalabilityStatus {
    Stable,
    ScalingUp,
    ScalingDown,
    AtCapacity,
    Overloaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_orders_by_severity() {
        assert!(RiskLevel::VeryLow < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::VeryHigh);
    }

    #[test]
    fn risk_level_from_score_matches_thresholds() {
        assert_eq!(RiskLevel::from_score(95.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_score(90.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_score(89.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::VeryHigh);
    }

    #[test]
    fn decision_outcome_display_matches_spec_tokens() {
        assert_eq!(DecisionOutcome::Allow.to_string(), "ALLOW");
        assert_eq!(
            DecisionOutcome::InsufficientConsensus.to_string(),
            "INSUFFICIENT_CONSENSUS"
        );
        assert_eq!(
            DecisionOutcome::AllowWithMonitoring.to_string(),
            "ALLOW_WITH_MONITORING"
        );
    }

    #[test]
    fn agent_type_round_trips_through_json() {
        for ty in AgentType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            let back: AgentType = serde_json::from_str(&json).unwrap();
            assert_eq!(ty, back);
        }
    }
}
