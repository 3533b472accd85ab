//! Transaction assembly and wire encoding.
//!
//! # Responsibilities
//! - Turn one instruction group into one unsigned transaction
//! - Stamp the shared block reference, wallet as fee payer
//! - Apply auxiliary partial signatures before the wallet signs
//! - Serialize signed transactions for broadcast

use std::sync::Arc;

use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::{Signer, SignerError};
use solana_sdk::transaction::Transaction;

use crate::ledger::types::BlockReference;

/// Auxiliary credential that co-signs a transaction (e.g. a fresh mint account).
pub type AuxSigner = Arc<dyn Signer + Send + Sync>;

/// Instructions that land in one transaction, plus the non-wallet signers they need.
#[derive(Clone, Default)]
pub struct TransactionGroup {
    pub instructions: Vec<Instruction>,
    pub signers: Vec<AuxSigner>,
}

impl TransactionGroup {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            signers: Vec::new(),
        }
    }

    pub fn with_signer(mut self, signer: AuxSigner) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl std::fmt::Debug for TransactionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGroup")
            .field("instructions", &self.instructions.len())
            .field(
                "signers",
                &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Build the unsigned transaction for one group.
///
/// The wallet pays fees and is the first required signer. Every auxiliary
/// signer becomes a required signer too: accounts the instructions already
/// reference are promoted to signers, keys they never mention are appended to
/// the read-only signer section of the message.
pub fn build_unsigned(
    group: &TransactionGroup,
    fee_payer: &Pubkey,
    block: &BlockReference,
) -> Result<Transaction, SignerError> {
    let aux_keys: Vec<Pubkey> = group.signers.iter().map(|s| s.pubkey()).collect();

    let mut instructions = group.instructions.clone();
    for meta in instructions.iter_mut().flat_map(|ix| ix.accounts.iter_mut()) {
        if aux_keys.contains(&meta.pubkey) {
            meta.is_signer = true;
        }
    }

    let mut message = Message::new_with_blockhash(&instructions, Some(fee_payer), &block.blockhash);
    let unreferenced: Vec<Pubkey> = aux_keys
        .iter()
        .filter(|key| !message.account_keys.contains(key))
        .copied()
        .collect();
    require_signers(&mut message, &unreferenced);

    let mut transaction = Transaction::new_unsigned(message);
    if !group.signers.is_empty() {
        let signers: Vec<&dyn Signer> = group
            .signers
            .iter()
            .map(|s| s.as_ref() as &dyn Signer)
            .collect();
        transaction.try_partial_sign(&signers, block.blockhash)?;
    }

    Ok(transaction)
}

/// Append `keys` as read-only signers, shifting every later account index.
fn require_signers(message: &mut Message, keys: &[Pubkey]) {
    if keys.is_empty() {
        return;
    }
    let at = message.header.num_required_signatures as usize;
    let shift = keys.len() as u8;

    for (offset, key) in keys.iter().enumerate() {
        message.account_keys.insert(at + offset, *key);
    }
    message.header.num_required_signatures += shift;
    message.header.num_readonly_signed_accounts += shift;

    let bump = |index: &mut u8| {
        if *index as usize >= at {
            *index += shift;
        }
    };
    for instruction in &mut message.instructions {
        bump(&mut instruction.program_id_index);
        instruction.accounts.iter_mut().for_each(bump);
    }
}

/// Identifier of a transaction: its fee payer's signature.
pub fn transaction_id(transaction: &Transaction) -> Signature {
    transaction.signatures.first().copied().unwrap_or_default()
}

pub fn serialize(transaction: &Transaction) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(transaction)
}

pub fn deserialize(wire: &[u8]) -> Result<Transaction, bincode::Error> {
    bincode::deserialize(wire)
}
