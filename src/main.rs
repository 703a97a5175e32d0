//! Vault control plane CLI: a thin `clap` entry point over `System`,
//! standing in for an HTTP surface without implementing one. Every
//! subcommand prints JSON to stdout.

mod config;
mod system;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::VaultConfig;
use std::path::PathBuf;
use system::{AccessRequest, System};
use tracing::{error, info};
use vault_core::AgentType;

#[derive(Parser)]
#[command(name = "vault-controlplane", about = "Distributed trust-and-consensus control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate the agent pool, cluster it, and exercise the
    /// background loops once before shutting down cleanly.
    Initialize,
    /// Report current pool/cluster status.
    Status,
    /// Sample the Performance Monitor once and report `SystemHealth`.
    Metrics,
    /// Agent pool introspection.
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Run one access request through C1/C2/C5 from a JSON file.
    Consensus {
        /// Path to a JSON-encoded `AccessRequest`.
        request_file: PathBuf,
    },
    /// Manually scale one agent type up (positive delta) or down
    /// (negative delta), bypassing the Scalability Coordinator's rule
    /// set but not its cooldowns/bounds.
    Scale {
        agent_type: String,
        delta: i64,
        #[arg(default_value = "operator request")]
        reason: String,
    },
    /// Report the bounded scaling-action history.
    ScalingHistory,
    /// Initialize, then immediately run the graceful shutdown path.
    Shutdown,
}

#[derive(Subcommand)]
enum AgentsAction {
    /// Per-type agent counts and pool status.
    Pool,
}

fn parse_agent_type(s: &str) -> Result<AgentType> {
    match s {
        "neutral" => Ok(AgentType::Neutral),
        "permissive" => Ok(AgentType::Permissive),
        "strict" => Ok(AgentType::Strict),
        "watchdog" => Ok(AgentType::Watchdog),
        other => anyhow::bail!("unknown agent type: {other} (expected neutral|permissive|strict|watchdog)"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("vault_controlplane=info".parse()?))
        .json()
        .init();

    let cli = Cli::parse();

    let config = VaultConfig::load().await.context("loading vault.config.json")?;
    let system = match System::new(config).await {
        Ok(system) => system,
        Err(e) => {
            error!("failed to initialize vault control plane: {e}");
            return Err(e);
        }
    };

    match cli.command {
        Command::Initialize => {
            system.initialize().await?;
            info!("vault control plane initialized");
            print_json(&system.status())?;
            system.shutdown().await;
        }
        Command::Status => {
            system.initialize().await?;
            print_json(&system.status())?;
            system.shutdown().await;
        }
        Command::Metrics => {
            system.initialize().await?;
            let health = system.sample_health();
            print_json(&health)?;
            system.shutdown().await;
        }
        Command::Agents { action: AgentsAction::Pool } => {
            system.initialize().await?;
            print_json(&system.status())?;
            system.shutdown().await;
        }
        Command::Consensus { request_file } => {
            system.initialize().await?;
            let content = tokio::fs::read_to_string(&request_file)
                .await
                .with_context(|| format!("reading {request_file:?}"))?;
            let request: AccessRequest =
                serde_json::from_str(&content).with_context(|| format!("parsing {request_file:?}"))?;
            let result = system.evaluate_access(&request).await?;
            print_json(&result)?;
            system.shutdown().await;
        }
        Command::Scale { agent_type, delta, reason } => {
            system.initialize().await?;
            let ty = parse_agent_type(&agent_type)?;
            let executed = system.manual_scale(ty, delta, &reason).await?;
            print_json(&serde_json::json!({ "executed": executed }))?;
            system.shutdown().await;
        }
        Command::ScalingHistory => {
            system.initialize().await?;
            print_json(&system.scaling_history())?;
            system.shutdown().await;
        }
        Command::Shutdown => {
            system.initialize().await?;
            system.shutdown().await;
            print_json(&serde_json::json!({ "status": "shut_down" }))?;
        }
    }

    Ok(())
}
