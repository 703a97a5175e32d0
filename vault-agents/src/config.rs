//! Pool configuration: per-type min/target/max counts, scaling
//! thresholds and cooldowns, health-check cadence, and load-balancing
//! strategy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vault_core::AgentType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TypeBounds {
    pub min: usize,
    pub target: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastLoaded,
    WeightedRandom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub bounds: HashMap<AgentType, TypeBounds>,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_cooldown_secs: i64,
    pub scale_down_cooldown_secs: i64,
    pub health_check_interval_secs: u64,
    pub max_idle_secs: i64,
    pub strategy: LoadBalancingStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let mut bounds = HashMap::new();
        bounds.insert(AgentType::Neutral, TypeBounds { min: 2, target: 5, max: 20 });
        bounds.insert(AgentType::Permissive, TypeBounds { min: 1, target: 3, max: 15 });
        bounds.insert(AgentType::Strict, TypeBounds { min: 1, target: 3, max: 15 });
        bounds.insert(AgentType::Watchdog, TypeBounds { min: 1, target: 2, max: 10 });

        Self {
            bounds,
            scale_up_threshold: 0.7,
            scale_down_threshold: 0.3,
            scale_up_cooldown_secs: 60,
            scale_down_cooldown_secs: 300,
            health_check_interval_secs: 30,
            max_idle_secs: 600,
            strategy: LoadBalancingStrategy::LeastLoaded,
        }
    }
}

impl PoolConfig {
    pub fn bounds_for(&self, ty: AgentType) -> TypeBounds {
        self.bounds.get(&ty).copied().unwrap_or(TypeBounds { min: 0, target: 0, max: usize::MAX })
    }

    /// `ConfigurationError`: `min > max`, or non-positive
    /// intervals, is fatal at startup.
    pub fn validate(&self) -> vault_core::VaultResult<()> {
        for (ty, bounds) in &self.bounds {
            if bounds.min > bounds.max {
                return Err(vault_core::VaultError::Configuration(format!(
                    "{ty}: min ({}) > max ({})",
                    bounds.min, bounds.max
                )));
            }
            if bounds.target < bounds.min || bounds.target > bounds.max {
                return Err(vault_core::VaultError::Configuration(format!(
                    "{ty}: target ({}) must be within [min, max] = [{}, {}]",
                    bounds.target, bounds.min, bounds.max
                )));
            }
        }
        if self.health_check_interval_secs == 0 {
            return Err(vault_core::VaultError::Configuration(
                "health_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn min_greater_than_max_fails_validation() {
        let mut config = PoolConfig::default();
        config.bounds.insert(AgentType::Neutral, TypeBounds { min: 10, target: 10, max: 5 });
        assert!(config.validate().is_err());
    }
}
