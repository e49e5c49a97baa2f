//! Command-line interface for the gateway daemon.

use clap::{Parser, Subcommand};

use crate::config::GatewayConfig;
use crate::pairing::PairingManager;
use crate::store::JsonStore;

#[derive(Parser)]
#[command(name = "krill-gateway", version, about = "Krill protocol gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway daemon (default).
    Run,
    /// Inspect or revoke device pairings.
    Pair {
        #[command(subcommand)]
        action: PairAction,
    },
}

#[derive(Subcommand)]
pub enum PairAction {
    /// List pairings, optionally filtered by agent id.
    List {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Revoke a pairing by id.
    Revoke { pairing_id: String },
}

/// Run a `pair` subcommand against the local store.
pub async fn run_pair_action(config: &GatewayConfig, action: PairAction) -> crate::Result<()> {
    let manager = PairingManager::new(
        JsonStore::new(config.pairings_path.clone()),
        config.agent.clone(),
    );

    match action {
        PairAction::List { agent } => {
            let pairings = manager.list_pairings(agent.as_deref()).await?;
            if pairings.is_empty() {
                println!("No pairings.");
                return Ok(());
            }
            for p in pairings {
                println!(
                    "{}  {}  {} ({})  paired {}  last seen {}",
                    p.pairing_id, p.user_id, p.device_name, p.device_id, p.created_at, p.last_seen_at
                );
            }
        }
        PairAction::Revoke { pairing_id } => {
            if manager.revoke_pairing(&pairing_id).await? {
                println!("Revoked {}", pairing_id);
            } else {
                println!("Pairing {} not found (already revoked?)", pairing_id);
            }
        }
    }
    Ok(())
}
