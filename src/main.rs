//! candy-mint command line.
//!
//! # Architecture Overview
//!
//! ```text
//!   config (TOML + CANDY_* env) ──→ RpcLedger (HTTP JSON-RPC + websocket pubsub)
//!                                        │
//!        ┌───────────────────────────────┼──────────────────────────────┐
//!        ▼                               ▼                              ▼
//!   block-reference / rent         confirm <sig>              memo / broadcast
//!   (direct ledger queries)    (ConfirmationTracker)   (BatchSubmitter → ResilientBroadcaster
//!                                                              → ConfirmationTracker)
//! ```
//!
//! `config` and `mint-window` run offline.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use clap::{Parser, Subcommand};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use candy_mint::candy::{CandyMachine, CandyMachineData, MintState};
use candy_mint::config::{load_or_default, MintConfig};
use candy_mint::ledger::transaction::{self, TransactionGroup};
use candy_mint::ledger::{Commitment, KeypairWallet, LedgerConnection, RpcLedger, WalletAdapter};
use candy_mint::observability::{logging, metrics};
use candy_mint::submission::{
    BatchSubmitter, ConfirmationTracker, NoopObserver, ResilientBroadcaster, SequencePolicy,
};

const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

#[derive(Parser)]
#[command(name = "candy-mint")]
#[command(about = "Submit and track candy machine transactions", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults plus CANDY_* environment otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,
    /// Fetch a recent block reference
    BlockReference {
        #[arg(long)]
        commitment: Option<Commitment>,
    },
    /// Minimum balance for a rent-exempt account of SIZE bytes
    Rent { size: usize },
    /// Wait for a submitted transaction to resolve
    Confirm {
        signature: String,
        #[arg(long, default_value_t = Commitment::Confirmed)]
        commitment: Commitment,
        /// Subscription only, no status polling
        #[arg(long)]
        no_poll: bool,
    },
    /// Evaluate the mint window of candy machine data read from a TOML FILE
    MintWindow {
        file: PathBuf,
        /// Unix seconds to evaluate at; defaults to the current time
        #[arg(long)]
        now: Option<i64>,
    },
    /// Broadcast a base64 encoded signed transaction read from FILE
    Broadcast { file: PathBuf },
    /// Send one memo transaction per message, signed by the local keypair
    Memo {
        #[arg(required = true)]
        messages: Vec<String>,
        /// Keypair file; falls back to CANDY_WALLET_KEYPAIR
        #[arg(short, long)]
        keypair: Option<PathBuf>,
        /// parallel, sequential or stopOnFailure
        #[arg(long)]
        sequence: Option<SequencePolicy>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match &cli.command {
        Commands::Config => {
            print_config(&config)?;
            return Ok(());
        }
        Commands::MintWindow { file, now } => {
            print_mint_window(file, *now)?;
            return Ok(());
        }
        _ => {}
    }

    let ledger = Arc::new(RpcLedger::new(&config.ledger)?);
    if !ledger.is_healthy().await {
        tracing::warn!(rpc_url = %config.ledger.rpc_url, "Ledger node reports unhealthy");
    }

    match cli.command {
        Commands::Config | Commands::MintWindow { .. } => {}
        Commands::BlockReference { commitment } => {
            let commitment = commitment.unwrap_or(config.submission.commitment);
            let block = ledger.get_recent_block_reference(commitment).await?;
            println!("blockhash: {}", block.blockhash);
            println!("last valid block height: {}", block.last_valid_block_height);
        }
        Commands::Rent { size } => {
            let lamports = ledger.get_minimum_balance_for_size(size).await?;
            println!("{} lamports", lamports);
        }
        Commands::Confirm {
            signature,
            commitment,
            no_poll,
        } => {
            let signature = Signature::from_str(&signature)?;
            let tracker = ConfirmationTracker::new(ledger)
                .with_poll_interval(Duration::from_millis(config.submission.poll_interval_ms));
            let status = tracker
                .await_confirmation(
                    &signature,
                    Duration::from_millis(config.submission.confirm_timeout_ms),
                    commitment,
                    !no_poll,
                )
                .await;
            println!("{:?}", status);
        }
        Commands::Broadcast { file } => {
            let encoded = std::fs::read_to_string(&file)?;
            let wire = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
            let signed = transaction::deserialize(&wire)?;
            let broadcaster = ResilientBroadcaster::new(ledger, (&config.submission).into());
            let sent = broadcaster.send_signed_transaction(&signed).await?;
            println!("{} confirmed in slot {}", sent.id, sent.slot);
        }
        Commands::Memo {
            messages,
            keypair,
            sequence,
        } => {
            let wallet = match keypair {
                Some(path) => KeypairWallet::from_file(&path)?,
                None => KeypairWallet::from_env()?,
            };
            let memo_program = Pubkey::from_str(MEMO_PROGRAM_ID)?;
            let payer = wallet.address();
            let groups: Vec<TransactionGroup> = messages
                .iter()
                .map(|message| {
                    TransactionGroup::new(vec![Instruction::new_with_bytes(
                        memo_program,
                        message.as_bytes(),
                        vec![AccountMeta::new_readonly(payer, true)],
                    )])
                })
                .collect();

            let submitter = BatchSubmitter::from_config(ledger, &config.submission);
            let outcome = submitter
                .send_transactions(
                    &wallet as &dyn WalletAdapter,
                    &groups,
                    sequence.unwrap_or(config.submission.sequence),
                    &NoopObserver,
                    None,
                )
                .await?;

            for entry in &outcome.outcomes {
                match &entry.result {
                    Ok(sent) => println!("[{}] {} slot {}", entry.index, sent.id, sent.slot),
                    Err(e) => println!("[{}] failed: {}", entry.index, e),
                }
            }
            if let Some(index) = outcome.stopped_at {
                println!("stopped at {}", index);
            }
        }
    }

    Ok(())
}

fn print_config(config: &MintConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(config)?);
    match CandyMachine::from_config(&config.candy_machine) {
        Ok(candy) => {
            let (creator, _) = candy.creator();
            println!("# candy machine creator: {}", creator);
        }
        Err(e) => println!("# {}", e),
    }
    Ok(())
}

fn print_mint_window(file: &Path, now: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    let data: CandyMachineData = toml::from_str(&std::fs::read_to_string(file)?)?;
    let now = match now {
        Some(now) => now,
        None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64,
    };

    let state = MintState::evaluate(&data, now);
    println!("items remaining: {}", state.items_remaining);
    println!("sold out: {}", state.is_sold_out);
    println!("presale: {}", state.is_presale);
    println!("active: {}", state.is_active);
    Ok(())
}
