//! Closed error taxonomy shared across the control plane.
//!
//! The consensus engine's public surface must never raise: failures are
//! contained at the nearest component boundary, so this crate defines a
//! `thiserror`-typed enum for that one part of the stack. Internals
//! still use `anyhow::Result` for plumbing; the typed `VaultError` only
//! appears at the boundary where a category actually needs to be
//! distinguished by a caller (e.g. fatal configuration errors at
//! startup vs. a transient capacity error a caller might retry).

use thiserror::Error;

/// A categorized, closed set of failure kinds.
#[derive(Debug, Error, Clone)]
pub enum VaultError {
    /// Invalid cluster-size bounds, `min > max`, non-positive intervals.
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Pool at max capacity, or no agent available matching the
    /// requested type/capabilities. Never fatal — surfaced to the
    /// caller as a failed cluster vote, not an aborted request.
    #[error("capacity exhausted: {0}")]
    Capacity(String),

    /// A single agent's decision call raised. Never aborts the
    /// enclosing cluster; the cluster substitutes a synthetic
    /// `{decision: ERROR, confidence: 0}` vote.
    #[error("agent vote failed: {0}")]
    VoteFailure(String),

    /// A consensus phase deadline elapsed before all votes arrived.
    /// Aggregation proceeds with whatever votes did arrive.
    #[error("phase timed out: {0}")]
    PhaseTimeout(String),

    /// Cluster participation dropped below the connectivity threshold.
    /// Non-fatal; annotated in the consensus result.
    #[error("partition detected: {0}")]
    PartitionDetected(String),

    /// An agent's health score fell below the removal threshold.
    #[error("agent health failure: {0}")]
    HealthFailure(String),

    /// The trust profile store could not be read or written. The
    /// calling evaluation still returns a result; the profile is
    /// treated as stale rather than missing.
    #[error("trust profile persistence error: {0}")]
    Persistence(String),

    /// Anything unexpected that a top-level C1/C3/C5/C7 operation
    /// caught rather than letting propagate. Each such operation
    /// converts this into a safe default (a DENY decision, or a
    /// zero-score/VeryHigh-risk trust evaluation) before returning.
    #[error("internal error: {0}")]
    System(String),
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl From<anyhow::Error> for VaultError {
    fn from(err: anyhow::Error) -> Self {
        VaultError::System(err.to_string())
    }
}
