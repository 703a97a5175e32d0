//! Agent Decision Workflow (C3) and Agent Pool Manager (C4).

mod baseline;
mod config;
mod instance;
mod pool;
mod state;
mod workflow;

pub use baseline::{mean, stddev, z_score, WatchdogBaselineStore, WatchdogBaselines};
pub use config::{LoadBalancingStrategy, PoolConfig, TypeBounds};
pub use instance::AgentInstance;
pub use pool::{AgentPool, AgentWorkerHandle, ScalingEvent};
pub use state::{AgentDecisionState, AgentVote};
pub use workflow::{decide, DecisionInput};
