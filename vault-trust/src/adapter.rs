//! Context Verification Adapter (C2): a thin facade over the ZK runner
//! collaborator (`vault_security::zk::ZkContextRunner`). This component
//! is a facade, not a scorer in its own right — the per-factor
//! verified booleans it returns come straight back from the ZK runner,
//! and its own arithmetic is limited to the preliminary-score rollup
//! and the `level_met` threshold check.

use crate::context::EvaluationContext;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use vault_security::zk::ZkContextRunner;

/// Requested strength of verification: four levels, each with an
/// associated minimum preliminary-score threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationLevel {
    Basic,
    Standard,
    High,
    Maximum,
}

impl VerificationLevel {
    fn threshold(self) -> f64 {
        match self {
            VerificationLevel::Basic => 25.0,
            VerificationLevel::Standard => 65.0,
            VerificationLevel::High => 85.0,
            VerificationLevel::Maximum => 95.0,
        }
    }
}

/// Which of `{Device, Timestamp, Location, Pattern}` the caller
/// actually requires verified, expressed as a plain struct of flags
/// rather than an integer bitmask so a caller can't pass an
/// out-of-range value, the same tradeoff `EvaluationContext` makes for
/// the raw context mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequirementFlags {
    pub device: bool,
    pub timestamp: bool,
    pub location: bool,
    pub pattern: bool,
}

impl RequirementFlags {
    pub fn all() -> Self {
        Self {
            device: true,
            timestamp: true,
            location: true,
            pattern: true,
        }
    }

    fn is_satisfied_by(self, verified: &PerFactorVerified) -> bool {
        (!self.device || verified.device)
            && (!self.timestamp || verified.timestamp)
            && (!self.location || verified.location)
            && (!self.pattern || verified.pattern)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PerFactorVerified {
    device: bool,
    timestamp: bool,
    location: bool,
    pattern: bool,
}

/// Result of one `verify` call: per-factor verified booleans, a
/// preliminary trust score contribution, a combined proof hash, and
/// whether the requested level was met.
#[derive(Debug, Clone)]
pub struct ContextVerificationResult {
    pub device_verified: bool,
    pub timestamp_verified: bool,
    pub location_verified: bool,
    pub pattern_verified: bool,
    pub preliminary_score: f64,
    pub combined_proof_hash: Option<String>,
    pub level_met: bool,
}

impl ContextVerificationResult {
    fn unmet(required: RequirementFlags) -> Self {
        let _ = required;
        Self {
            device_verified: false,
            timestamp_verified: false,
            location_verified: false,
            pattern_verified: false,
            preliminary_score: 0.0,
            combined_proof_hash: None,
            level_met: false,
        }
    }
}

/// Per-factor contribution to the preliminary score (: device
/// 30, location 25, pattern 25, timestamp 20, capped at 100).
const DEVICE_CONTRIBUTION: f64 = 30.0;
const LOCATION_CONTRIBUTION: f64 = 25.0;
const PATTERN_CONTRIBUTION: f64 = 25.0;
const TIMESTAMP_CONTRIBUTION: f64 = 20.0;

pub struct ContextVerificationAdapter {
    zk: Arc<dyn ZkContextRunner>,
}

impl ContextVerificationAdapter {
    pub fn new(zk: Arc<dyn ZkContextRunner>) -> Self {
        Self { zk }
    }

    /// Verify `context` against `required` factors at `level`. Missing
    /// required context (an empty device fingerprint or challenge
    /// nonce) short-circuits to an unmet result without calling the ZK
    /// runner at all, per 's validation requirement.
    pub async fn verify(
        &self,
        user_id: &str,
        context: &EvaluationContext,
        challenge_nonce: &str,
        required: RequirementFlags,
        level: VerificationLevel,
    ) -> ContextVerificationResult {
        if required.device
            && context
                .device_fingerprint
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true)
        {
            return ContextVerificationResult::unmet(required);
        }
        if challenge_nonce.is_empty() {
            return ContextVerificationResult::unmet(required);
        }

        let mut verified = PerFactorVerified::default();
        let mut proof_hashes: Vec<String> = Vec::new();

        if required.device {
            let inputs = device_inputs(user_id, context, challenge_nonce);
            match self.zk.run("device", &inputs).await {
                Ok(result) => {
                    verified.device = result.verified;
                    if let Some(hash) = result.proof_hash {
                        proof_hashes.push(hash);
                    }
                }
                Err(e) => warn!(user_id, error = %e, factor = "device", "zk verification call failed"),
            }
        }
        if required.timestamp {
            let inputs = timestamp_inputs(context);
            match self.zk.run("timestamp", &inputs).await {
                Ok(result) => {
                    verified.timestamp = result.verified;
                    if let Some(hash) = result.proof_hash {
                        proof_hashes.push(hash);
                    }
                }
                Err(e) => warn!(user_id, error = %e, factor = "timestamp", "zk verification call failed"),
            }
        }
        if required.location {
            let inputs = location_inputs(context);
            match self.zk.run("location", &inputs).await {
                Ok(result) => {
                    verified.location = result.verified;
                    if let Some(hash) = result.proof_hash {
                        proof_hashes.push(hash);
                    }
                }
                Err(e) => warn!(user_id, error = %e, factor = "location", "zk verification call failed"),
            }
        }
        if required.pattern {
            let inputs = pattern_inputs(context);
            match self.zk.run("pattern", &inputs).await {
                Ok(result) => {
                    verified.pattern = result.verified;
                    if let Some(hash) = result.proof_hash {
                        proof_hashes.push(hash);
                    }
                }
                Err(e) => warn!(user_id, error = %e, factor = "pattern", "zk verification call failed"),
            }
        }

        let mut preliminary_score = 0.0;
        if verified.device {
            preliminary_score += DEVICE_CONTRIBUTION;
        }
        if verified.location {
            preliminary_score += LOCATION_CONTRIBUTION;
        }
        if verified.pattern {
            preliminary_score += PATTERN_CONTRIBUTION;
        }
        if verified.timestamp {
            preliminary_score += TIMESTAMP_CONTRIBUTION;
        }
        preliminary_score = preliminary_score.min(100.0);

        let combined_proof_hash = if proof_hashes.is_empty() {
            None
        } else {
            let mut hasher = blake3::Hasher::new();
            for hash in &proof_hashes {
                hasher.update(hash.as_bytes());
            }
            Some(hasher.finalize().to_hex().to_string())
        };

        let level_met = required.is_satisfied_by(&verified) && preliminary_score >= level.threshold();

        ContextVerificationResult {
            device_verified: verified.device,
            timestamp_verified: verified.timestamp,
            location_verified: verified.location,
            pattern_verified: verified.pattern,
            preliminary_score,
            combined_proof_hash,
            level_met,
        }
    }
}

fn device_inputs(user_id: &str, context: &EvaluationContext, nonce: &str) -> BTreeMap<String, serde_json::Value> {
    let mut m = BTreeMap::new();
    m.insert("user_id".to_string(), json!(user_id));
    m.insert("challenge_nonce".to_string(), json!(nonce));
    if let Some(fp) = &context.device_fingerprint {
        m.insert("device_fingerprint".to_string(), json!(fp));
    }
    m
}

fn timestamp_inputs(context: &EvaluationContext) -> BTreeMap<String, serde_json::Value> {
    let mut m = BTreeMap::new();
    if let Some(last_access) = context.last_access {
        m.insert("last_access".to_string(), json!(last_access.to_rfc3339()));
    }
    m
}

fn location_inputs(context: &EvaluationContext) -> BTreeMap<String, serde_json::Value> {
    let mut m = BTreeMap::new();
    if let Some(loc) = context.location {
        m.insert("lat".to_string(), json!(loc.lat));
        m.insert("lon".to_string(), json!(loc.lon));
    }
    m
}

fn pattern_inputs(context: &EvaluationContext) -> BTreeMap<String, serde_json::Value> {
    let mut m = BTreeMap::new();
    if let Some(session) = context.session_duration_secs {
        m.insert("session_duration_secs".to_string(), json!(session));
    }
    if let Some(typing) = context.typing_speed_kpm {
        m.insert("typing_speed_kpm".to_string(), json!(typing));
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use vault_security::zk::ReferenceZkRunner;

    fn adapter() -> ContextVerificationAdapter {
        ContextVerificationAdapter::new(Arc::new(ReferenceZkRunner))
    }

    #[tokio::test]
    async fn missing_device_fingerprint_short_circuits_to_unmet() {
        let adapter = adapter();
        let context = EvaluationContext::default();
        let result = adapter
            .verify("u1", &context, "nonce", RequirementFlags::all(), VerificationLevel::Basic)
            .await;
        assert!(!result.level_met);
        assert!(!result.device_verified);
        assert_eq!(result.preliminary_score, 0.0);
    }

    #[tokio::test]
    async fn empty_challenge_nonce_short_circuits_to_unmet() {
        let adapter = adapter();
        let context = EvaluationContext {
            device_fingerprint: Some("fp-1".to_string()),
            ..Default::default()
        };
        let result = adapter
            .verify("u1", &context, "", RequirementFlags::all(), VerificationLevel::Basic)
            .await;
        assert!(!result.level_met);
    }

    #[tokio::test]
    async fn full_context_meets_maximum_level() {
        let adapter = adapter();
        let context = EvaluationContext {
            device_fingerprint: Some("fp-1".to_string()),
            location: Some(GeoPoint { lat: 37.7, lon: -122.4 }),
            session_duration_secs: Some(900.0),
            typing_speed_kpm: Some(55.0),
            last_access: Some(chrono::Utc::now()),
            ..Default::default()
        };
        let result = adapter
            .verify("u1", &context, "nonce-123", RequirementFlags::all(), VerificationLevel::Maximum)
            .await;
        assert!(result.device_verified);
        assert!(result.timestamp_verified);
        assert!(result.location_verified);
        assert!(result.pattern_verified);
        assert_eq!(result.preliminary_score, 100.0);
        assert!(result.level_met);
        assert!(result.combined_proof_hash.is_some());
    }

    #[tokio::test]
    async fn partial_requirement_only_checks_requested_factors() {
        let adapter = adapter();
        let context = EvaluationContext {
            device_fingerprint: Some("fp-1".to_string()),
            ..Default::default()
        };
        let required = RequirementFlags {
            device: true,
            ..Default::default()
        };
        let result = adapter
            .verify("u1", &context, "nonce-123", required, VerificationLevel::Basic)
            .await;
        assert!(result.device_verified);
        assert!(!result.timestamp_verified);
        assert_eq!(result.preliminary_score, DEVICE_CONTRIBUTION);
        assert!(result.level_met);
    }

    #[tokio::test]
    async fn high_level_requires_higher_score() {
        let adapter = adapter();
        let context = EvaluationContext {
            device_fingerprint: Some("fp-1".to_string()),
            ..Default::default()
        };
        let required = RequirementFlags {
            device: true,
            ..Default::default()
        };
        let result = adapter
            .verify("u1", &context, "nonce-123", required, VerificationLevel::High)
            .await;
        assert!(!result.level_met, "30 points should not meet High's 85 threshold");
    }
}
