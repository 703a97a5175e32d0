//! Performance Monitor (C6) and Scalability Coordinator (C7): telemetry
//! sampling, health classification, and rule-based pool scaling.

mod coordinator;
mod monitor;
mod predictor;
mod resource;
mod types;

pub use coordinator::ScalabilityCoordinator;
pub use monitor::PerformanceMonitor;
pub use predictor::LoadPredictor;
pub use resource::{ResourceSampler, StaticResourceSampler};
pub use types::{RawResourceSample, ScalabilityConfig, ScalingAction, ScalingActionKind, SystemHealth};
