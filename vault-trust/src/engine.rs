//! Trust Scoring Engine (C1): `evaluate(user_id, context) -> TrustEvaluation`.
//!
//! Every sub-metric, weight, and clamp below follows the weighted
//! multi-factor table this engine is built against; nothing here is
//! discretionary except where a formula's shape is left implicit
//! (behavioral-pattern deviation scoring and adaptive-threshold
//! bookkeeping — both noted inline).

use crate::context::EvaluationContext;
use crate::store::TrustProfileStore;
use crate::types::{RiskEvent, TrustEvaluation, TrustMetrics, UserTrustProfile};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};
use vault_core::RiskLevel;
use vault_security::audit::{AuditEvent, MerkleAuditWriter};

const W_DEVICE: f64 = 0.20;
const W_TEMPORAL: f64 = 0.15;
const W_GEO: f64 = 0.15;
const W_BEHAVIORAL: f64 = 0.20;
const W_ACCESS_FREQ: f64 = 0.10;
const W_RISK: f64 = 0.10;
const W_COMPLIANCE: f64 = 0.05;
const W_HISTORICAL: f64 = 0.05;

pub struct TrustScoringEngine {
    store: Arc<dyn TrustProfileStore>,
    audit: Arc<dyn MerkleAuditWriter>,
}

impl TrustScoringEngine {
    pub fn new(store: Arc<dyn TrustProfileStore>, audit: Arc<dyn MerkleAuditWriter>) -> Self {
        Self { store, audit }
    }

    pub async fn evaluate(&self, user_id: &str, context: &EvaluationContext) -> TrustEvaluation {
        match self.evaluate_inner(user_id, context).await {
            Ok(eval) => eval,
            Err(e) => {
                error!(user_id, error = %e, "trust evaluation failed, returning system-error default");
                TrustEvaluation::system_error(user_id)
            }
        }
    }

    async fn evaluate_inner(
        &self,
        user_id: &str,
        context: &EvaluationContext,
    ) -> anyhow::Result<TrustEvaluation> {
        let mut profile = self
            .store
            .load(user_id)
            .await?
            .unwrap_or_else(|| UserTrustProfile::new(user_id));

        let history: Vec<f64> = profile.trust_history.snapshot();
        let mean_history = mean(&history);
        let variance_history = variance(&history, mean_history);

        let device_consistency = score_device_consistency(context, &profile);
        let temporal_patterns = score_temporal_patterns(context, &profile);
        let geographic_consistency = score_geographic_consistency(context, &profile);
        let behavioral_patterns = score_behavioral_patterns(context, &profile);
        let access_frequency = score_access_frequency(context, &profile);
        let risk_indicators = score_risk_indicators(context);
        let compliance_score = score_compliance(context, &profile);
        let historical_reliability = if history.is_empty() {
            50.0
        } else {
            (0.7 * mean_history + 0.3 * (100.0 - variance_history)).clamp(0.0, 100.0)
        };

        let metrics = TrustMetrics {
            device_consistency,
            temporal_patterns,
            geographic_consistency,
            behavioral_patterns,
            access_frequency,
            risk_indicators,
            compliance_score,
            historical_reliability,
        };

        let overall_score = (W_DEVICE * device_consistency
            + W_TEMPORAL * temporal_patterns
            + W_GEO * geographic_consistency
            + W_BEHAVIORAL * behavioral_patterns
            + W_ACCESS_FREQ * access_frequency
            + W_RISK * risk_indicators
            + W_COMPLIANCE * compliance_score
            + W_HISTORICAL * historical_reliability)
            .min(100.0);

        let risk_level = RiskLevel::from_score(overall_score);

        let confidence = ((2.0 * profile.total_evaluations as f64).min(80.0)
            + (20.0 - variance_history / 5.0).max(0.0))
        .min(100.0);

        let adaptive_thresholds = adaptive_thresholds(mean_history);

        let recommendations = generate_recommendations(risk_level, &metrics, overall_score);

        // Append to history, refresh baseline, update behavioral
        // baselines, record a risk event when warranted, bump
        // counters, persist.
        profile.trust_history.push(overall_score);
        profile.baseline_score = mean(&profile.trust_history.snapshot());

        if let Some(fingerprint) = &context.device_fingerprint {
            profile.behavioral_baselines.add_device(fingerprint);
        }
        if let Some(location) = context.location {
            profile.behavioral_baselines.add_location_if_new(location);
        }
        if let Some(interval) = context.access_interval_secs {
            profile.behavioral_baselines.push_interval(interval);
        }
        if let Some(duration) = context.session_duration_secs {
            profile.behavioral_baselines.push_session_duration(duration);
        }
        if let Some(typing) = context.typing_speed_kpm {
            profile.behavioral_baselines.push_typing_speed(typing);
        }

        if matches!(risk_level, RiskLevel::High | RiskLevel::VeryHigh) {
            profile.risk_events.push(RiskEvent {
                timestamp: Utc::now(),
                level: risk_level,
                score: overall_score,
            });
        }

        profile.total_evaluations += 1;
        profile.compliance_violations += context.recent_compliance_events as u64;
        profile.last_evaluation = Some(Utc::now());

        if let Err(e) = self.store.save(&profile).await {
            warn!(user_id, error = %e, "failed to persist trust profile, evaluation still returned");
        }

        let _ = self
            .audit
            .write(AuditEvent {
                event: "trust_evaluated".to_string(),
                timestamp: Utc::now(),
                detail: serde_json::json!({
                    "user_id": user_id,
                    "overall_score": overall_score,
                    "risk_level": risk_level.to_string(),
                }),
            })
            .await;

        Ok(TrustEvaluation {
            user_id: user_id.to_string(),
            overall_score,
            risk_level,
            metrics,
            confidence,
            adaptive_thresholds,
            recommendations,
            timestamp: Utc::now(),
        })
    }
}

fn score_device_consistency(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    if !context.device_verified {
        return 0.0;
    }
    let known = context
        .device_fingerprint
        .as_ref()
        .map(|fp| profile.behavioral_baselines.known_devices.contains(fp))
        .unwrap_or(false);
    if known {
        100.0
    } else {
        90.0
    }
}

fn score_temporal_patterns(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    let base = if context.timestamp_verified { 70.0 } else { 0.0 };
    let intervals = &profile.behavioral_baselines.access_intervals;
    if intervals.is_empty() {
        return base;
    }
    let Some(interval) = context.access_interval_secs else {
        return base;
    };
    let m = mean(intervals);
    if m <= 0.0 {
        return base;
    }
    let closeness = (1.0 - (interval - m).abs() / m).max(0.0);
    base + 30.0 * closeness
}

fn score_geographic_consistency(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    let base = if context.location_verified { 70.0 } else { 0.0 };
    let Some(location) = context.location else {
        return base;
    };
    match profile.behavioral_baselines.nearest_known_location_km(location) {
        Some(d) if d <= 10.0 => base + 30.0,
        Some(d) if d <= 50.0 => base + 20.0,
        Some(d) if d <= 200.0 => base + 10.0,
        _ => base,
    }
}

fn score_behavioral_patterns(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    let base = if context.pattern_verified { 70.0 } else { 0.0 };
    let session_bonus = deviation_bonus(
        context.session_duration_secs,
        &profile.behavioral_baselines.session_durations,
        15.0,
    );
    let typing_bonus = deviation_bonus(
        context.typing_speed_kpm,
        &profile.behavioral_baselines.typing_speeds,
        15.0,
    );
    (base + session_bonus + typing_bonus).min(100.0)
}

/// Up-to-`max_bonus` reward scaled by how close `value` is to the mean
/// of `baseline`, mirroring the closeness formula used for temporal
/// patterns. Each of the two behavioral sub-factors caps at 15 points;
/// this keeps the same closeness-to-mean shape used elsewhere in this
/// engine rather than inventing an unrelated one.
fn deviation_bonus(value: Option<f64>, baseline: &[f64], max_bonus: f64) -> f64 {
    let (Some(value), false) = (value, baseline.is_empty()) else {
        return 0.0;
    };
    let m = mean(baseline);
    if m <= 0.0 {
        return 0.0;
    }
    let closeness = (1.0 - (value - m).abs() / m).max(0.0);
    max_bonus * closeness
}

fn score_access_frequency(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    if profile.behavioral_baselines.access_intervals.is_empty() {
        return 60.0;
    }
    let Some(ratio) = context.access_frequency_ratio else {
        return 60.0;
    };
    if (0.5..=2.0).contains(&ratio) {
        90.0
    } else if (0.2..=3.0).contains(&ratio) {
        70.0
    } else {
        40.0
    }
}

fn score_risk_indicators(context: &EvaluationContext) -> f64 {
    let mut score = 100.0;
    score -= 10.0 * context.recent_compliance_events as f64;
    let failed_verifications = 4 - context.verification_count() as i32;
    score -= 15.0 * failed_verifications as f64;
    if let Some(interval) = context.access_interval_secs {
        if interval < 60.0 {
            score -= 20.0;
        }
    }
    score.clamp(0.0, 100.0)
}

fn score_compliance(context: &EvaluationContext, profile: &UserTrustProfile) -> f64 {
    let mut score = 100.0 - 5.0 * profile.compliance_violations as f64;
    if !context.is_business_hours {
        score -= 10.0;
    }
    if !context.ip_consistent {
        score -= 15.0;
    }
    score.clamp(0.0, 100.0)
}

fn adaptive_thresholds(mean_history: f64) -> HashMap<String, f64> {
    let delta = (0.1 * (mean_history - 75.0)).max(0.0);
    let mut thresholds = HashMap::new();
    thresholds.insert("very_low".to_string(), (90.0 + delta).max(0.0));
    thresholds.insert("low".to_string(), (75.0 + delta).max(0.0));
    thresholds.insert("medium".to_string(), (60.0 + delta).max(0.0));
    thresholds.insert("high".to_string(), (40.0 + delta).max(0.0));
    thresholds.insert("very_high".to_string(), delta.max(0.0));
    thresholds
}

/// Human-readable remediation hints for a below-ideal evaluation.
fn generate_recommendations(risk_level: RiskLevel, metrics: &TrustMetrics, overall_score: f64) -> Vec<String> {
    if overall_score >= 90.0 {
        return Vec::new();
    }
    let mut recommendations = Vec::new();
    if matches!(risk_level, RiskLevel::High | RiskLevel::VeryHigh) {
        recommendations.push("require additional verification factors".to_string());
    }
    if metrics.device_consistency < 50.0 {
        recommendations.push("register this device to improve future scoring".to_string());
    }
    if metrics.geographic_consistency < 50.0 {
        recommendations.push("confirm access from a known location".to_string());
    }
    if metrics.behavioral_patterns < 50.0 {
        recommendations.push("behavioral baseline has not yet stabilized for this user".to_string());
    }
    recommendations
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64], mean_value: f64) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTrustProfileStore;
    use vault_security::audit::InMemoryAuditWriter;

    fn engine() -> TrustScoringEngine {
        TrustScoringEngine::new(
            Arc::new(InMemoryTrustProfileStore::new()),
            Arc::new(InMemoryAuditWriter::new()),
        )
    }

    #[tokio::test]
    async fn fully_verified_new_user_scores_reasonably_high() {
        let engine = engine();
        let context = EvaluationContext {
            device_verified: true,
            timestamp_verified: true,
            location_verified: true,
            pattern_verified: true,
            is_business_hours: true,
            ip_consistent: true,
            ..Default::default()
        };
        let eval = engine.evaluate("new-user", &context).await;
        assert!(eval.overall_score > 50.0, "score was {}", eval.overall_score);
        assert_eq!(eval.metrics.device_consistency, 90.0);
    }

    #[tokio::test]
    async fn unverified_context_scores_low_and_is_high_risk() {
        let engine = engine();
        let context = EvaluationContext::default();
        let eval = engine.evaluate("ghost-user", &context).await;
        assert!(eval.overall_score < 60.0, "score was {}", eval.overall_score);
        assert!(matches!(eval.risk_level, RiskLevel::High | RiskLevel::VeryHigh));
    }

    #[tokio::test]
    async fn repeated_evaluations_increment_counters_and_persist() {
        let engine = engine();
        let context = EvaluationContext {
            device_verified: true,
            timestamp_verified: true,
            location_verified: true,
            pattern_verified: true,
            is_business_hours: true,
            ip_consistent: true,
            ..Default::default()
        };
        engine.evaluate("repeat-user", &context).await;
        let eval = engine.evaluate("repeat-user", &context).await;
        // second evaluation should see total_evaluations=1 baked into confidence
        assert!(eval.confidence >= 2.0);
    }

    #[tokio::test]
    async fn recent_access_within_60s_penalizes_risk_indicators() {
        let engine = engine();
        let context = EvaluationContext {
            device_verified: true,
            timestamp_verified: true,
            location_verified: true,
            pattern_verified: true,
            access_interval_secs: Some(5.0),
            is_business_hours: true,
            ip_consistent: true,
            ..Default::default()
        };
        let eval = engine.evaluate("rapid-user", &context).await;
        assert_eq!(eval.metrics.risk_indicators, 80.0);
    }

    #[tokio::test]
    async fn high_risk_score_yields_non_empty_recommendations() {
        let engine = engine();
        let context = EvaluationContext::default();
        let eval = engine.evaluate("low-trust-user", &context).await;
        assert!(!eval.recommendations.is_empty());
    }
}
