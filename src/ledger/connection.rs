//! The ledger seam used by the submission pipeline.

use async_trait::async_trait;
use solana_sdk::signature::Signature;

use crate::ledger::types::{
    BlockReference, Commitment, LedgerResult, SendOptions, SignatureStatus, SignatureSubscription,
    SimulationResult, SubscriptionId,
};

/// Handle to a ledger node.
///
/// Shared read-only across every concurrent broadcast, poll and subscription;
/// implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Submit an already signed, serialized transaction.
    async fn send_raw_transaction(
        &self,
        wire_transaction: &[u8],
        options: SendOptions,
    ) -> LedgerResult<Signature>;

    /// Register for a single notification about `signature`.
    async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> LedgerResult<SignatureSubscription>;

    /// Drop a subscription. Unknown handles are not an error.
    async fn unsubscribe(&self, subscription: SubscriptionId) -> LedgerResult<()>;

    /// Whether the subscription is still registered on this connection.
    fn has_subscription(&self, subscription: SubscriptionId) -> bool;

    /// Status per signature, `None` for signatures the node does not know.
    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> LedgerResult<Vec<Option<SignatureStatus>>>;

    async fn get_recent_block_reference(
        &self,
        commitment: Commitment,
    ) -> LedgerResult<BlockReference>;

    async fn simulate_transaction(
        &self,
        wire_transaction: &[u8],
        commitment: Commitment,
    ) -> LedgerResult<SimulationResult>;

    /// Lamports needed for an account of `size` bytes to be rent exempt.
    async fn get_minimum_balance_for_size(&self, size: usize) -> LedgerResult<u64>;
}
