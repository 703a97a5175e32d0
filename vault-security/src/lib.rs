//! Facades over the collaborators this workspace does not own:
//! cryptographic primitives, the ZK context runner, the Merkle audit
//! log writer, and the telemetry sink. Every trait here is a stable
//! contract the core depends on;
//! the reference implementations exist so the rest of the workspace
//! can be exercised in tests without a production backend wired in.

pub mod audit;
pub mod crypto;
pub mod telemetry;
pub mod zk;

pub use audit::{AuditEvent, InMemoryAuditWriter, MerkleAuditWriter};
pub use crypto::{
    AeadCipher, Ed25519Signer, Gf256Shamir, HkdfSha256, KeyDerivation, KeyEncapsulation,
    ReferenceKem, RingAesGcm, ShamirSecretSharing, SignatureScheme,
};
pub use telemetry::{NullTelemetrySink, PrometheusTelemetrySink, TelemetrySink};
pub use zk::{ReferenceZkRunner, ZkContextRunner, ZkProofResult};
