//! `AgentDecisionState`: per-decision scratch object owned by
//! exactly one workflow execution, discarded after the vote returns.
//! `AgentVote` is the immutable result handed back to the caller
//! (the Hierarchical Consensus Engine's intra-cluster phase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_core::{AgentType, DecisionOutcome};

/// Growing scratch state threaded through the six pipeline stages in
/// `crate::workflow`. Never serialized or shared outside the workflow
/// call that owns it.
#[derive(Debug, Clone, Default)]
pub struct AgentDecisionState {
    pub request_id: String,
    pub trust_score: f64,
    pub access_factors: Vec<String>,
    pub risk_factors: Vec<String>,
    pub confidence: f64,
    pub reasoning_chain: Vec<String>,

    // Personality-specific extensions (: "security_violations,
    // anomalies, pattern_deviations, ..."). Unused fields simply stay
    // empty for personalities that do not populate them.
    pub mandatory_requirements: Vec<String>,
    pub security_violations: Vec<String>,
    pub flexibility_applied: Vec<String>,
    pub anomalies: Vec<String>,
    pub pattern_deviations: Vec<String>,
    pub security_alerts: Vec<String>,
    pub anomaly_score: f64,

    pub final_decision: Option<DecisionOutcome>,
}

impl AgentDecisionState {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }
}

/// The immutable per-request output every personality returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentVote {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub decision: DecisionOutcome,
    pub confidence: f64,
    pub reasoning_chain: Vec<String>,
    pub access_factors: Vec<String>,
    pub risk_factors: Vec<String>,
    pub security_violations: Vec<String>,
    pub flexibility_applied: Vec<String>,
    pub anomalies: Vec<String>,
    pub pattern_deviations: Vec<String>,
    pub security_alerts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentVote {
    /// The safe failure-mode vote for a personality (
    /// "Output... On exception"): Strict/Watchdog default to a
    /// high-confidence DENY, Neutral/Permissive to a very-low-confidence
    /// DENY.
    pub fn system_error(agent_id: &str, agent_type: AgentType) -> Self {
        let confidence = match agent_type {
            AgentType::Strict | AgentType::Watchdog => 0.95,
            AgentType::Neutral | AgentType::Permissive => 0.05,
        };
        Self {
            agent_id: agent_id.to_string(),
            agent_type,
            decision: DecisionOutcome::Deny,
            confidence,
            reasoning_chain: vec!["workflow raised an internal error; defaulting to deny".to_string()],
            access_factors: Vec::new(),
            risk_factors: Vec::new(),
            security_violations: Vec::new(),
            flexibility_applied: Vec::new(),
            anomalies: Vec::new(),
            pattern_deviations: Vec::new(),
            security_alerts: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
