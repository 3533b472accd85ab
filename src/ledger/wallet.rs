//! Wallet seam and a local keypair wallet.
//!
//! # Security
//! - Keypairs are read from a file path, never from the config file itself
//! - Secret material is never logged or serialized

use std::path::Path;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

/// Environment variable holding the path to a keypair file.
pub const KEYPAIR_PATH_ENV_VAR: &str = "CANDY_WALLET_KEYPAIR";

/// Errors raised by a wallet.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Keypair could not be loaded.
    #[error("Keypair error: {0}")]
    Keypair(String),

    /// The wallet refused or failed to sign.
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// A wallet that owns the fee-paying identity.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// The connected public identity, or `None` while disconnected.
    fn public_key(&self) -> Option<Pubkey>;

    /// Sign every transaction in one approval.
    ///
    /// Returns the transactions in the order they were handed in.
    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError>;
}

/// Wallet backed by a keypair held in memory.
#[derive(Debug)]
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        tracing::info!(address = %keypair.pubkey(), "Wallet initialized");
        Self { keypair }
    }

    /// Load a keypair file in the JSON byte-array format.
    pub fn from_file(path: &Path) -> Result<Self, WalletError> {
        let keypair = read_keypair_file(path).map_err(|e| {
            WalletError::Keypair(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(keypair))
    }

    /// Load the keypair file named by `CANDY_WALLET_KEYPAIR`.
    pub fn from_env() -> Result<Self, WalletError> {
        let path = std::env::var(KEYPAIR_PATH_ENV_VAR).map_err(|_| {
            WalletError::Keypair(format!(
                "Environment variable {} not set",
                KEYPAIR_PATH_ENV_VAR
            ))
        })?;
        Self::from_file(Path::new(&path))
    }

    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletAdapter for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_all_transactions(
        &self,
        mut transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        for transaction in transactions.iter_mut() {
            let blockhash = transaction.message.recent_blockhash;
            transaction
                .try_partial_sign(&[&self.keypair], blockhash)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
        }
        tracing::debug!(count = transactions.len(), "Signed transaction batch");
        Ok(transactions)
    }
}
