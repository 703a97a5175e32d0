//! Configuration surface for the vault control plane: one `VaultConfig`
//! aggregating every subsystem's own config type, loaded from a single
//! JSON file with defaults written on first run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vault_agents::PoolConfig;
use vault_consensus::ClusterConfig;
use vault_scalability::ScalabilityConfig;

const CONFIG_FILE: &str = "vault.config.json";

/// Which `TelemetrySink` and `TrustProfileStore` backends `System::new`
/// should wire up. These collaborators live outside this crate's core,
/// but a deployment still has to pick one at startup, so it lives here
/// rather than as a hardcoded choice in `System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub telemetry: TelemetryBackend,
    pub persist_trust_profiles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryBackend {
    Null,
    Prometheus,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryBackend::Prometheus,
            persist_trust_profiles: true,
        }
    }
}

/// Trust Scoring Engine tuning surface. The sub-metric weights are
/// fixed (not discretionary), so there is nothing to parameterize
/// there; this exists so `VaultConfig` still names a `trust` section,
/// and so a deployment can size the per-user history rings without
/// recompiling (`vault-trust` uses fixed caps today; this is read by
/// `System::new` only to validate it is non-zero, ready for when those
/// caps move here).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustConfig {
    pub trust_history_capacity: usize,
    pub risk_event_history_capacity: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_history_capacity: 100,
            risk_event_history_capacity: 200,
        }
    }
}

impl TrustConfig {
    pub fn validate(&self) -> vault_core::VaultResult<()> {
        if self.trust_history_capacity == 0 || self.risk_event_history_capacity == 0 {
            return Err(vault_core::VaultError::Configuration(
                "trust history capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root configuration for the vault control plane: one struct-of-structs
/// aggregating every subsystem's own config type plus the shared
/// `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub data_dir: PathBuf,
    pub trust: TrustConfig,
    pub agents: PoolConfig,
    pub consensus: ClusterConfig,
    pub scalability: ScalabilityConfig,
    pub security: SecurityConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/vault-trust"),
            trust: TrustConfig::default(),
            agents: PoolConfig::default(),
            consensus: ClusterConfig::default(),
            scalability: ScalabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Validate every subsystem's config in one place, so `System::new`
    /// fails fast with a single `VaultError::Configuration` rather than
    /// partway through wiring up collaborators.
    pub fn validate(&self) -> vault_core::VaultResult<()> {
        self.trust.validate()?;
        self.agents.validate()?;
        self.consensus.validate()?;
        self.scalability.validate()?;
        Ok(())
    }

    /// Load configuration from `vault.config.json` in the current
    /// working directory, writing a validated default on first run.
    pub async fn load() -> Result<Self> {
        match tokio::fs::read_to_string(CONFIG_FILE).await {
            Ok(content) => {
                let config: Self = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("failed to parse {CONFIG_FILE}: {e}"))?;
                config.validate()?;
                Ok(config)
            }
            Err(_) => {
                let default_config = Self::default();
                default_config.save().await?;
                Ok(default_config)
            }
        }
    }

    /// Save configuration to `vault.config.json`, pretty-printed.
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(CONFIG_FILE, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = VaultConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: VaultConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data_dir, config.data_dir);
        assert_eq!(back.consensus.optimal_size, config.consensus.optimal_size);
    }

    #[test]
    fn zero_history_capacity_is_rejected() {
        let mut config = VaultConfig::default();
        config.trust.trust_history_capacity = 0;
        assert!(config.validate().is_err());
    }
}
