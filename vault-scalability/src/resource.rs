//! Facade over the OS-level resource counters (CPU/mem/disk/network).
//! The external observability stack this would feed is out of scope
//! here, so this is a thin collaborator trait with an in-process
//! default, mirroring how `vault-security` models the crypto/ZK/audit
//! collaborators it does not own either.

/// One cycle's worth of raw OS counters.
use crate::types::RawResourceSample;

pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> RawResourceSample;
}

/// Always reports an idle, healthy system. Lets the monitor and
/// coordinator run (and be tested) with no live OS-counter backend
/// wired in; a real deployment supplies a `ResourceSampler` backed by
/// whatever host-metrics crate the surrounding deployment already uses.
#[derive(Debug, Default)]
pub struct StaticResourceSampler {
    pub fixed: RawResourceSample,
}

impl ResourceSampler for StaticResourceSampler {
    fn sample(&self) -> RawResourceSample {
        self.fixed
    }
}
