//! Candy machine identities.
//!
//! Program and machine ids are process-wide configuration, parsed once at
//! startup. Instruction encoding stays with the callers that build
//! [`TransactionGroup`](crate::ledger::transaction::TransactionGroup)s.

pub mod state;

use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::config::CandyMachineConfig;

pub use state::{CandyMachineData, EndSetting, EndSettingKind, MintState};

/// Seed prefix of the creator address derived per candy machine.
pub const CREATOR_SEED: &[u8] = b"candy_machine";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandyError {
    #[error("Invalid {field}: '{value}'")]
    InvalidId { field: &'static str, value: String },

    #[error("Candy machine id not configured")]
    MissingMachineId,
}

/// A deployed candy machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandyMachine {
    pub program_id: Pubkey,
    pub id: Pubkey,
}

impl CandyMachine {
    pub fn from_config(config: &CandyMachineConfig) -> Result<Self, CandyError> {
        if config.candy_machine_id.is_empty() {
            return Err(CandyError::MissingMachineId);
        }
        Ok(Self {
            program_id: parse_id("program_id", &config.program_id)?,
            id: parse_id("candy_machine_id", &config.candy_machine_id)?,
        })
    }

    /// Address that signs as first creator of every item this machine mints.
    pub fn creator(&self) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[CREATOR_SEED, self.id.as_ref()], &self.program_id)
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<Pubkey, CandyError> {
    Pubkey::from_str(value).map_err(|_| CandyError::InvalidId {
        field,
        value: value.to_string(),
    })
}
