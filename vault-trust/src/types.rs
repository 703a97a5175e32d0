//! Data model for the Trust Scoring Engine (C1): `UserTrustProfile`
//! (the persisted, per-user running state) and `TrustEvaluation` (the
//! immutable per-call result).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use vault_core::{BoundedHistory, RiskLevel};

const TRUST_HISTORY_CAP: usize = 100;
const KNOWN_DEVICES_CAP: usize = 10;
const KNOWN_LOCATIONS_CAP: usize = 20;
const ACCESS_INTERVALS_CAP: usize = 50;
const SESSION_DURATIONS_CAP: usize = 30;
const TYPING_SPEEDS_CAP: usize = 30;
const RISK_EVENTS_CAP: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A single recorded risk event, appended whenever an evaluation lands
/// in `High` or `VeryHigh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub timestamp: DateTime<Utc>,
    pub level: RiskLevel,
    pub score: f64,
}

/// Rolling behavioral baselines, each bounded per .
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralBaselines {
    pub known_devices: HashSet<String>,
    pub known_locations: Vec<GeoPoint>,
    pub access_intervals: Vec<f64>,
    pub session_durations: Vec<f64>,
    pub typing_speeds: Vec<f64>,
}

impl Default for BehavioralBaselines {
    fn default() -> Self {
        Self {
            known_devices: HashSet::new(),
            known_locations: Vec::new(),
            access_intervals: Vec::new(),
            session_durations: Vec::new(),
            typing_speeds: Vec::new(),
        }
    }
}

impl BehavioralBaselines {
    pub fn add_device(&mut self, device_hash: &str) {
        if self.known_devices.len() >= KNOWN_DEVICES_CAP && !self.known_devices.contains(device_hash) {
            // FIFO eviction on a HashSet has no intrinsic order; drop an
            // arbitrary existing entry rather than let the set grow
            // unbounded. In practice repeat devices dominate, so this is
            // rarely exercised.
            if let Some(victim) = self.known_devices.iter().next().cloned() {
                self.known_devices.remove(&victim);
            }
        }
        self.known_devices.insert(device_hash.to_string());
    }

    pub fn add_location_if_new(&mut self, point: GeoPoint) {
        let is_far_from_all = self
            .known_locations
            .iter()
            .all(|known| haversine_approx_km(*known, point) > 5.0);
        if !is_far_from_all {
            return;
        }
        if self.known_locations.len() >= KNOWN_LOCATIONS_CAP {
            self.known_locations.remove(0);
        }
        self.known_locations.push(point);
    }

    pub fn push_interval(&mut self, interval_secs: f64) {
        push_bounded(&mut self.access_intervals, interval_secs, ACCESS_INTERVALS_CAP);
    }

    pub fn push_session_duration(&mut self, duration_secs: f64) {
        push_bounded(&mut self.session_durations, duration_secs, SESSION_DURATIONS_CAP);
    }

    pub fn push_typing_speed(&mut self, kpm: f64) {
        push_bounded(&mut self.typing_speeds, kpm, TYPING_SPEEDS_CAP);
    }

    pub fn nearest_known_location_km(&self, point: GeoPoint) -> Option<f64> {
        self.known_locations
            .iter()
            .map(|known| haversine_approx_km(*known, point))
            .fold(None, |acc, d| match acc {
                None => Some(d),
                Some(min) => Some(min.min(d)),
            })
    }
}

fn push_bounded(buf: &mut Vec<f64>, value: f64, cap: usize) {
    if buf.len() >= cap {
        buf.remove(0);
    }
    buf.push(value);
}

/// Approximate planar distance in km, scaled by a 111 km/degree
/// constant. Not a true haversine; this is an approximate planar
/// distance times 111, not a great-circle formula.
pub fn haversine_approx_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    (dlat * dlat + dlon * dlon).sqrt() * 111.0
}

/// Owned exclusively by the Trust Scoring Engine, keyed by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTrustProfile {
    pub user_id: String,
    pub baseline_score: f64,
    pub trust_history: BoundedHistory<f64>,
    pub behavioral_baselines: BehavioralBaselines,
    pub risk_events: BoundedHistory<RiskEvent>,
    pub total_evaluations: u64,
    pub compliance_violations: u64,
    pub last_evaluation: Option<DateTime<Utc>>,
}

impl UserTrustProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            baseline_score: 50.0,
            trust_history: BoundedHistory::new(TRUST_HISTORY_CAP),
            behavioral_baselines: BehavioralBaselines::default(),
            risk_events: BoundedHistory::new(RISK_EVENTS_CAP),
            total_evaluations: 0,
            compliance_violations: 0,
            last_evaluation: None,
        }
    }
}

/// Named sub-metrics, each already weighted in [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustMetrics {
    pub device_consistency: f64,
    pub temporal_patterns: f64,
    pub geographic_consistency: f64,
    pub behavioral_patterns: f64,
    pub access_frequency: f64,
    pub risk_indicators: f64,
    pub compliance_score: f64,
    pub historical_reliability: f64,
}

/// Immutable result of one `evaluate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvaluation {
    pub user_id: String,
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub metrics: TrustMetrics,
    pub confidence: f64,
    pub adaptive_thresholds: HashMap<String, f64>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TrustEvaluation {
    /// The safe default emitted on an internal error (failure
    /// modes): never raises outward.
    pub fn system_error(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            overall_score: 0.0,
            risk_level: RiskLevel::VeryHigh,
            metrics: TrustMetrics {
                device_consistency: 0.0,
                temporal_patterns: 0.0,
                geographic_consistency: 0.0,
                behavioral_patterns: 0.0,
                access_frequency: 0.0,
                risk_indicators: 0.0,
                compliance_score: 0.0,
                historical_reliability: 0.0,
            },
            confidence: 0.0,
            adaptive_thresholds: HashMap::new(),
            recommendations: vec!["system error".to_string()],
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_location_if_new_rejects_nearby_points() {
        let mut baselines = BehavioralBaselines::default();
        baselines.add_location_if_new(GeoPoint { lat: 37.0, lon: -122.0 });
        assert_eq!(baselines.known_locations.len(), 1);

        // ~1km away (roughly 0.009 degrees), should be rejected as "not new"
        baselines.add_location_if_new(GeoPoint { lat: 37.009, lon: -122.0 });
        assert_eq!(baselines.known_locations.len(), 1);
    }

    #[test]
    fn add_location_if_new_accepts_far_points() {
        let mut baselines = BehavioralBaselines::default();
        baselines.add_location_if_new(GeoPoint { lat: 37.0, lon: -122.0 });
        baselines.add_location_if_new(GeoPoint { lat: 51.5, lon: -0.1 });
        assert_eq!(baselines.known_locations.len(), 2);
    }

    #[test]
    fn intervals_stay_bounded() {
        let mut baselines = BehavioralBaselines::default();
        for i in 0..100 {
            baselines.push_interval(i as f64);
        }
        assert_eq!(baselines.access_intervals.len(), ACCESS_INTERVALS_CAP);
    }

    #[test]
    fn system_error_evaluation_is_very_high_risk_zero_score() {
        let eval = TrustEvaluation::system_error("u1");
        assert_eq!(eval.overall_score, 0.0);
        assert_eq!(eval.risk_level, RiskLevel::VeryHigh);
        assert_eq!(eval.confidence, 0.0);
    }
}
