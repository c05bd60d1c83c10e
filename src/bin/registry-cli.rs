use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use institution_registry::config::load_config;
use institution_registry::network::NetworkProfile;
use institution_registry::observability::init_logging;
use institution_registry::registration::{generate_nonce, CommitRevealRegistrar, RegistrationData};
use institution_registry::wallet::{LocalWalletProvider, WalletSession};
use institution_registry::{RegistryConfig, TransactionSubmitter};

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Operator CLI for commit-reveal institution registration", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "registry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show wallet and registration state
    Status,
    /// Show the account's native balance
    Balance,
    /// Switch the wallet to the configured network (or the local dev chain)
    Switch {
        #[arg(long)]
        local: bool,
    },
    /// Submit a registration commitment
    Commit {
        #[command(flatten)]
        registration: RegistrationArgs,
    },
    /// Reveal a committed registration with the stake
    Reveal {
        #[command(flatten)]
        registration: RegistrationArgs,
    },
    /// Time left until reveal is allowed
    Remaining,
    /// Print a fresh random nonce
    Nonce,
}

#[derive(clap::Args)]
struct RegistrationArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    country: String,

    /// Repeat for each specialty. Order matters.
    #[arg(long = "specialty", required = true)]
    specialties: Vec<String>,

    /// Generated when omitted on commit; required on reveal.
    #[arg(long)]
    nonce: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Nonce = cli.command {
        print_json(&json!({ "nonce": generate_nonce() }))?;
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    init_logging(&config.observability);
    let (session, registrar) = connect(&config).await?;

    match cli.command {
        Commands::Status => {
            let registration = registrar.check_pending().await?;
            print_json(&json!({
                "wallet": session.state(),
                "network": config.network.name,
                "registration": registration,
                "pending_reveal": registrar.pending_reveal(),
                "commitment": registrar.commitment(),
                "failure_reason": registrar.failure_reason(),
            }))?;
        }
        Commands::Balance => {
            let balance = session.get_balance().await?;
            print_json(&json!({
                "address": session.state().address_hex(),
                "balance": balance,
                "symbol": config.network.native_currency.symbol,
            }))?;
        }
        Commands::Switch { local } => {
            let target = if local {
                NetworkProfile::local()
            } else {
                config.network.clone()
            };
            session.switch_network(&target).await?;
            print_json(&json!({ "chain_id": session.state().chain_id, "network": target.name }))?;
        }
        Commands::Commit { registration } => {
            let nonce = registration.nonce.unwrap_or_else(generate_nonce);
            let data = registration.into_data(nonce);
            let receipt = registrar.commit(&data).await?;
            print_json(&json!({
                "nonce": nonce,
                "commit_hash": receipt.commit_hash,
                "tx_hash": receipt.tx_hash,
                "explorer": config.network.tx_url(&receipt.tx_hash),
                "reveal_eligible_at": receipt.reveal_eligible_at,
            }))?;
        }
        Commands::Reveal { registration } => {
            let nonce = registration
                .nonce
                .ok_or("--nonce is required to reveal; use the one printed at commit")?;
            let data = registration.into_data(nonce);
            let receipt = registrar.reveal(&data).await?;
            print_json(&json!({
                "tx_hash": receipt.tx_hash,
                "block_number": receipt.block_number,
                "explorer": config.network.tx_url(&receipt.tx_hash),
            }))?;
        }
        Commands::Remaining => {
            print_json(&json!({
                "state": registrar.state(),
                "remaining_secs": registrar.time_remaining().map(|d| d.as_secs()),
                "reveal_eligible_at": registrar.reveal_eligible_at(),
            }))?;
        }
        // Printed before connecting.
        Commands::Nonce => {}
    }

    Ok(())
}

impl RegistrationArgs {
    fn into_data(self, nonce: u64) -> RegistrationData {
        RegistrationData::new(self.name, self.country, self.specialties, nonce)
    }
}

async fn connect(
    config: &RegistryConfig,
) -> Result<(Arc<WalletSession>, CommitRevealRegistrar), Box<dyn std::error::Error>> {
    let provider = LocalWalletProvider::from_env(
        &config.network,
        config.transactions.receipt_timeout(),
    )?;
    let session = Arc::new(WalletSession::new(Arc::new(provider), config.network.clone()));
    session.connect().await?;

    let submitter = Arc::new(TransactionSubmitter::new(
        session.clone(),
        config.transactions.clone(),
    ));
    let registrar = CommitRevealRegistrar::from_config(submitter, config)?;
    Ok((session, registrar))
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
