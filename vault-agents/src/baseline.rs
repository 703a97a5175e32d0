//! Per-user rolling baselines the Watchdog personality maintains.
//! Distinct from `vault_trust`'s `UserTrustProfile` baselines: this is
//! Watchdog's own view, kept entirely inside `vault-agents` since it
//! belongs to the agent workflow, not the trust engine.

use dashmap::DashMap;
use std::collections::HashSet;
use vault_core::BoundedHistory;

const SAMPLE_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct WatchdogBaselines {
    pub typing_speeds: BoundedHistory<f64>,
    pub session_durations: BoundedHistory<f64>,
    pub access_frequencies: BoundedHistory<f64>,
    pub access_hours: HashSet<u8>,
}

impl Default for WatchdogBaselines {
    fn default() -> Self {
        Self {
            typing_speeds: BoundedHistory::new(SAMPLE_CAP),
            session_durations: BoundedHistory::new(SAMPLE_CAP),
            access_frequencies: BoundedHistory::new(SAMPLE_CAP),
            access_hours: HashSet::new(),
        }
    }
}

impl WatchdogBaselines {
    pub fn observe(&mut self, typing_kpm: Option<f64>, session_secs: Option<f64>, frequency: Option<f64>, access_hour: Option<u8>) {
        if let Some(v) = typing_kpm {
            self.typing_speeds.push(v);
        }
        if let Some(v) = session_secs {
            self.session_durations.push(v);
        }
        if let Some(v) = frequency {
            self.access_frequencies.push(v);
        }
        if let Some(hour) = access_hour {
            self.access_hours.insert(hour);
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn stddev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn z_score(value: f64, values: &[f64]) -> f64 {
    let m = mean(values);
    let sd = stddev(values, m);
    if sd <= f64::EPSILON {
        0.0
    } else {
        (value - m) / sd
    }
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().cloned().fold(0.0, f64::max)
}

/// Single-writer-per-user store (: "per-user writes are
/// serialized; cross-user writes are independent"). `DashMap` gives us
/// that directly: distinct keys never contend.
#[derive(Debug, Default)]
pub struct WatchdogBaselineStore {
    profiles: DashMap<String, WatchdogBaselines>,
}

impl WatchdogBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloned snapshot of the user's current baselines, or a fresh
    /// default if this is the first time Watchdog has seen this user.
    pub fn snapshot(&self, user_id: &str) -> WatchdogBaselines {
        self.profiles.get(user_id).map(|r| r.clone()).unwrap_or_default()
    }

    pub fn record(
        &self,
        user_id: &str,
        typing_kpm: Option<f64>,
        session_secs: Option<f64>,
        frequency: Option<f64>,
        access_hour: Option<u8>,
    ) {
        self.profiles
            .entry(user_id.to_string())
            .or_default()
            .observe(typing_kpm, session_secs, frequency, access_hour);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_score_is_zero_with_no_variance() {
        assert_eq!(z_score(10.0, &[10.0, 10.0, 10.0]), 0.0);
    }

    #[test]
    fn z_score_is_zero_with_insufficient_history() {
        assert_eq!(z_score(500.0, &[]), 0.0);
    }

    #[test]
    fn store_keeps_baselines_independent_across_users() {
        let store = WatchdogBaselineStore::new();
        store.record("alice", Some(60.0), None, None, Some(9));
        store.record("bob", Some(600.0), None, None, Some(3));

        assert_eq!(store.snapshot("alice").typing_speeds.snapshot(), vec![60.0]);
        assert_eq!(store.snapshot("bob").typing_speeds.snapshot(), vec![600.0]);
    }
}
