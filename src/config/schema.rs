//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and every field
//! has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::ledger::types::Commitment;
use crate::submission::SequencePolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MintConfig {
    /// Ledger node endpoints.
    pub ledger: LedgerConfig,

    /// Fixed on-chain identities.
    pub candy_machine: CandyMachineConfig,

    /// Broadcast and confirmation tuning.
    pub submission: SubmissionConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Ledger connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Pubsub websocket URL; derived from `rpc_url` when absent.
    pub ws_url: Option<String>,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            ws_url: None,
            failover_urls: Vec::new(),
            rpc_timeout_secs: 10,
        }
    }
}

/// Candy machine identities (base58 public keys).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CandyMachineConfig {
    /// Candy machine program id.
    pub program_id: String,

    /// Candy machine account id. Must be supplied by file or environment.
    pub candy_machine_id: String,
}

impl Default for CandyMachineConfig {
    fn default() -> Self {
        Self {
            program_id: "cndy3Z4yapfJBmL3ShUp5exZKqR3z33thTzeNMm2gRZ".to_string(),
            candy_machine_id: String::new(),
        }
    }
}

/// Submission pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Time allowed for one transaction to confirm, in milliseconds.
    pub confirm_timeout_ms: u64,

    /// Interval between redundant rebroadcasts, in milliseconds.
    pub resend_interval_ms: u64,

    /// Interval between status polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Commitment for the shared block reference.
    pub commitment: Commitment,

    /// Commitment the confirmation tracker waits for.
    pub confirm_commitment: Commitment,

    /// Commitment used when simulating a failed transaction.
    pub simulate_commitment: Commitment,

    /// Default sequencing policy for batches.
    pub sequence: SequencePolicy,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 15_000,
            resend_interval_ms: 500,
            poll_interval_ms: 2_000,
            commitment: Commitment::SingleGossip,
            confirm_commitment: Commitment::Recent,
            simulate_commitment: Commitment::Single,
            sequence: SequencePolicy::Parallel,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
