//! The context mapping C1 and C2 both consume: the four per-factor
//! verification booleans plus optional device fingerprint, lat/lon,
//! session duration, keystrokes/min, last-access timestamp, access
//! frequency, business-hours and IP-consistency flags — expressed
//! here as a typed struct rather than a free-form dict so a missing
//! field is a compile error at the call site, not a silent `None`.

use crate::types::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub device_verified: bool,
    pub device_fingerprint: Option<String>,
    pub timestamp_verified: bool,
    pub location_verified: bool,
    pub location: Option<GeoPoint>,
    pub pattern_verified: bool,

    pub session_duration_secs: Option<f64>,
    pub typing_speed_kpm: Option<f64>,
    pub last_access: Option<DateTime<Utc>>,
    pub access_interval_secs: Option<f64>,
    /// Ratio of current access frequency to the user's typical frequency.
    pub access_frequency_ratio: Option<f64>,
    pub is_business_hours: bool,
    pub ip_consistent: bool,

    /// Number of compliance-relevant events observed in the last 7 days.
    pub recent_compliance_events: u32,
}

impl EvaluationContext {
    pub fn verification_count(&self) -> u8 {
        [
            self.device_verified,
            self.timestamp_verified,
            self.location_verified,
            self.pattern_verified,
        ]
        .iter()
        .filter(|v| **v)
        .count() as u8
    }
}
