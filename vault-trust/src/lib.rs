//! Trust Scoring Engine (C1) and Context Verification Adapter (C2).
//!
//! `vault-trust` is the first layer above `vault-core`/`vault-security`
//! that produces a domain result rather than a facade: `evaluate` turns
//! a raw context into a `TrustEvaluation`, and `ContextVerificationAdapter`
//! turns the same raw fields plus a requested verification level into a
//! `ContextVerificationResult` that C3 (`vault-agents`) consumes
//! alongside the trust score.

mod adapter;
mod context;
mod engine;
mod store;
mod types;

pub use adapter::{
    ContextVerificationAdapter, ContextVerificationResult, RequirementFlags, VerificationLevel,
};
pub use context::EvaluationContext;
pub use engine::TrustScoringEngine;
pub use store::{is_plausible_data_dir, InMemoryTrustProfileStore, JsonFileTrustProfileStore, TrustProfileStore};
pub use types::{
    haversine_approx_km, BehavioralBaselines, GeoPoint, RiskEvent, TrustEvaluation, TrustMetrics,
    UserTrustProfile,
};
