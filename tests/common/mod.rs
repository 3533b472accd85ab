//! Shared fixtures for integration tests: an in-memory ledger, wallets,
//! observers and a raw JSON-RPC HTTP backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::Instant;

use candy_mint::ledger::transaction::{self, TransactionGroup};
use candy_mint::ledger::{
    BlockReference, Commitment, KeypairWallet, LedgerConnection, LedgerError, LedgerResult,
    SendOptions, SignatureNotification, SignatureStatus, SignatureSubscription, SimulationResult,
    SubscriptionId, WalletAdapter, WalletError,
};
use candy_mint::submission::{SubmissionObserver, SubmitError};

/// How the mock ledger treats one transaction.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Status query number `n` (1-based) and later report confirmation.
    ConfirmOnQuery { n: u32, slot: u64 },
    /// Status query number `n` and later report an execution error.
    FailOnQuery { n: u32, err: Value },
    /// The subscription fires as soon as it is registered.
    NotifyOnSubscribe { slot: u64, err: Option<Value> },
    /// Nothing ever resolves.
    Silent,
}

#[derive(Debug, Clone)]
pub struct SendRecord {
    pub signature: Signature,
    pub payload: Vec<u8>,
    pub at: Instant,
}

struct Subscription {
    signature: Signature,
    sender: Option<oneshot::Sender<SignatureNotification>>,
}

/// In-memory ledger scripted per transaction.
///
/// Transactions are matched by the data of their first instruction, or
/// directly by signature for tracker tests.
pub struct MockLedger {
    pub blockhash: Hash,
    by_payload: Mutex<HashMap<Vec<u8>, Behavior>>,
    by_signature: Mutex<HashMap<Signature, Behavior>>,
    sends: Mutex<Vec<SendRecord>>,
    queries: Mutex<HashMap<Signature, u32>>,
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    unsubscribed: Mutex<Vec<SubscriptionId>>,
    next_subscription: AtomicU64,
    simulation: Mutex<LedgerResult<SimulationResult>>,
    pub block_reference_calls: AtomicU32,
    pub simulate_calls: AtomicU32,
    /// Upcoming status queries that fail with a transport error.
    pub failing_queries: AtomicU32,
    pub fail_subscriptions: AtomicBool,
    pub fail_sends: AtomicBool,
    /// Delay between registering a subscription and replying with its id.
    pub subscribe_delay: Mutex<std::time::Duration>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            blockhash: Hash::new_from_array([42; 32]),
            by_payload: Mutex::new(HashMap::new()),
            by_signature: Mutex::new(HashMap::new()),
            sends: Mutex::new(Vec::new()),
            queries: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            unsubscribed: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            simulation: Mutex::new(Ok(SimulationResult::default())),
            block_reference_calls: AtomicU32::new(0),
            simulate_calls: AtomicU32::new(0),
            failing_queries: AtomicU32::new(0),
            fail_subscriptions: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            subscribe_delay: Mutex::new(std::time::Duration::ZERO),
        }
    }
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_payload(&self, payload: &[u8], behavior: Behavior) {
        self.by_payload
            .lock()
            .unwrap()
            .insert(payload.to_vec(), behavior);
    }

    pub fn script_signature(&self, signature: Signature, behavior: Behavior) {
        self.by_signature.lock().unwrap().insert(signature, behavior);
    }

    pub fn set_simulation(&self, result: LedgerResult<SimulationResult>) {
        *self.simulation.lock().unwrap() = result;
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sends_of(&self, payload: &[u8]) -> usize {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.payload == payload)
            .count()
    }

    pub fn queries_of(&self, signature: &Signature) -> u32 {
        self.queries
            .lock()
            .unwrap()
            .get(signature)
            .copied()
            .unwrap_or(0)
    }

    pub fn subscription_count(&self) -> u64 {
        self.next_subscription.load(Ordering::SeqCst) - 1
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.unsubscribed.lock().unwrap().clone()
    }

    fn behavior(&self, signature: &Signature) -> Behavior {
        self.by_signature
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or(Behavior::Silent)
    }
}

fn payload_of(transaction: &Transaction) -> Vec<u8> {
    transaction
        .message
        .instructions
        .first()
        .map(|ix| ix.data.clone())
        .unwrap_or_default()
}

#[async_trait]
impl LedgerConnection for MockLedger {
    async fn send_raw_transaction(
        &self,
        wire_transaction: &[u8],
        options: SendOptions,
    ) -> LedgerResult<Signature> {
        assert!(options.skip_preflight, "broadcasts must skip preflight");
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("connection refused".into()));
        }

        let decoded = transaction::deserialize(wire_transaction)
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        let signature = transaction::transaction_id(&decoded);
        let payload = payload_of(&decoded);

        if let Some(behavior) = self.by_payload.lock().unwrap().get(&payload).cloned() {
            self.by_signature
                .lock()
                .unwrap()
                .entry(signature)
                .or_insert(behavior);
        }
        self.sends.lock().unwrap().push(SendRecord {
            signature,
            payload,
            at: Instant::now(),
        });
        Ok(signature)
    }

    async fn subscribe_signature(
        &self,
        signature: &Signature,
        _commitment: Commitment,
    ) -> LedgerResult<SignatureSubscription> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(LedgerError::Subscription("websocket closed".into()));
        }

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (sender, notification) = oneshot::channel();
        let sender = match self.behavior(signature) {
            Behavior::NotifyOnSubscribe { slot, err } => {
                let _ = sender.send(SignatureNotification { slot, err });
                None
            }
            _ => Some(sender),
        };
        self.subscriptions.lock().unwrap().insert(
            id,
            Subscription {
                signature: *signature,
                sender,
            },
        );

        let delay = *self.subscribe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(SignatureSubscription { id, notification })
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> LedgerResult<()> {
        self.subscriptions.lock().unwrap().remove(&subscription);
        self.unsubscribed.lock().unwrap().push(subscription);
        Ok(())
    }

    fn has_subscription(&self, subscription: SubscriptionId) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .contains_key(&subscription)
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> LedgerResult<Vec<Option<SignatureStatus>>> {
        let mut statuses = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let query = {
                let mut queries = self.queries.lock().unwrap();
                let count = queries.entry(*signature).or_insert(0);
                *count += 1;
                *count
            };

            let failing = self.failing_queries.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_queries.store(failing - 1, Ordering::SeqCst);
                return Err(LedgerError::Transport("status query dropped".into()));
            }

            let status = match self.behavior(signature) {
                Behavior::ConfirmOnQuery { n, slot } if query >= n => Some(SignatureStatus {
                    slot,
                    confirmations: Some(1),
                    err: None,
                    confirmation_status: Some("confirmed".into()),
                }),
                Behavior::ConfirmOnQuery { slot, .. } => Some(SignatureStatus {
                    slot,
                    confirmations: Some(0),
                    err: None,
                    confirmation_status: Some("processed".into()),
                }),
                Behavior::FailOnQuery { n, err } if query >= n => Some(SignatureStatus {
                    slot: 7,
                    confirmations: Some(0),
                    err: Some(err),
                    confirmation_status: Some("processed".into()),
                }),
                _ => None,
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    async fn get_recent_block_reference(
        &self,
        _commitment: Commitment,
    ) -> LedgerResult<BlockReference> {
        self.block_reference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BlockReference {
            blockhash: self.blockhash,
            last_valid_block_height: 1_000,
        })
    }

    async fn simulate_transaction(
        &self,
        _wire_transaction: &[u8],
        _commitment: Commitment,
    ) -> LedgerResult<SimulationResult> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.simulation.lock().unwrap() {
            Ok(result) => Ok(result.clone()),
            Err(e) => Err(LedgerError::Transport(e.to_string())),
        }
    }

    async fn get_minimum_balance_for_size(&self, size: usize) -> LedgerResult<u64> {
        Ok(size as u64 * 10)
    }
}

/// Wallet with no connected identity.
#[derive(Default)]
pub struct DisconnectedWallet {
    pub sign_calls: AtomicU32,
}

#[async_trait]
impl WalletAdapter for DisconnectedWallet {
    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(transactions)
    }
}

/// Keypair wallet that remembers every batch it was asked to sign.
pub struct RecordingWallet {
    pub inner: KeypairWallet,
    pub batches: Mutex<Vec<Vec<Transaction>>>,
}

impl RecordingWallet {
    pub fn new() -> Self {
        Self {
            inner: KeypairWallet::new(Keypair::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> Pubkey {
        self.inner.address()
    }

    pub fn batches(&self) -> Vec<Vec<Transaction>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletAdapter for RecordingWallet {
    fn public_key(&self) -> Option<Pubkey> {
        self.inner.public_key()
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.batches.lock().unwrap().push(transactions.clone());
        self.inner.sign_all_transactions(transactions).await
    }
}

/// Observer collecting callback indices in call order.
#[derive(Default)]
pub struct RecordingObserver {
    pub successes: Mutex<Vec<usize>>,
    pub failures: Mutex<Vec<usize>>,
}

impl RecordingObserver {
    pub fn successes(&self) -> Vec<usize> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<usize> {
        self.failures.lock().unwrap().clone()
    }
}

impl SubmissionObserver for RecordingObserver {
    fn on_success(&self, _id: &Signature, index: usize) {
        self.successes.lock().unwrap().push(index);
    }

    fn on_failure(&self, _transaction: &Transaction, index: usize, _error: &SubmitError) {
        self.failures.lock().unwrap().push(index);
    }
}

/// One memo-style instruction carrying `payload`, signed by `payer`.
pub fn payload_group(payer: &Pubkey, payload: &[u8]) -> TransactionGroup {
    TransactionGroup::new(vec![Instruction::new_with_bytes(
        Pubkey::new_from_array([9; 32]),
        payload,
        vec![AccountMeta::new_readonly(*payer, true)],
    )])
}

/// A transaction fully signed by a fresh keypair.
pub fn signed_transaction(payload: &[u8], blockhash: Hash) -> Transaction {
    let payer = Keypair::new();
    let block = BlockReference {
        blockhash,
        last_valid_block_height: 1_000,
    };
    let group = payload_group(&payer.pubkey(), payload);
    let mut tx = transaction::build_unsigned(&group, &payer.pubkey(), &block).unwrap();
    tx.try_partial_sign(&[&payer], blockhash).unwrap();
    tx
}

/// Start a JSON-RPC backend answering each request body with `handler`.
///
/// Returns the bound address.
pub async fn start_rpc_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_json_body(&mut socket).await else {
                            return;
                        };
                        let body = handler(request).to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_json_body(socket: &mut tokio::net::TcpStream) -> Option<Value> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length: usize = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        let body_start = header_end + 4;
        if buf.len() >= body_start + length {
            return serde_json::from_slice(&buf[body_start..body_start + length]).ok();
        }
    }
}

/// JSON-RPC success envelope for `request`.
pub fn rpc_result(request: &Value, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": request["id"], "result": result })
}

/// JSON-RPC error envelope for `request`.
pub fn rpc_error(request: &Value, code: i64, message: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "error": { "code": code, "message": message }
    })
}

/// Instruction for one open connection of a [`PubsubNode`].
#[derive(Debug)]
pub enum NodeCommand {
    Notify { subscription: SubscriptionId, slot: u64 },
    Close,
}

/// Raw websocket node answering `signatureSubscribe`/`signatureUnsubscribe`.
///
/// Subscription ids are unique across connections, starting at 1.
pub struct PubsubNode {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<(String, SubscriptionId)>>>,
    unsubscribed: Arc<Mutex<Vec<SubscriptionId>>>,
    controls: Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<NodeCommand>>>>,
}

impl PubsubNode {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn subscribed(&self) -> Vec<(String, SubscriptionId)> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.unsubscribed.lock().unwrap().clone()
    }

    /// Send a command to the most recent connection.
    pub fn command(&self, command: NodeCommand) {
        let controls = self.controls.lock().unwrap();
        controls
            .last()
            .expect("no connection yet")
            .send(command)
            .unwrap();
    }
}

pub async fn start_pubsub_node() -> PubsubNode {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let node = PubsubNode {
        addr: listener.local_addr().unwrap(),
        connections: Arc::new(AtomicU32::new(0)),
        subscribed: Arc::new(Mutex::new(Vec::new())),
        unsubscribed: Arc::new(Mutex::new(Vec::new())),
        controls: Arc::new(Mutex::new(Vec::new())),
    };
    let next_subscription = Arc::new(AtomicU64::new(1));

    let connections = node.connections.clone();
    let subscribed = node.subscribed.clone();
    let unsubscribed = node.unsubscribed.clone();
    let controls = node.controls.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
                continue;
            };
            connections.fetch_add(1, Ordering::SeqCst);
            let (control, mut control_rx) = tokio::sync::mpsc::unbounded_channel();
            controls.lock().unwrap().push(control);

            let next_subscription = next_subscription.clone();
            let subscribed = subscribed.clone();
            let unsubscribed = unsubscribed.clone();
            tokio::spawn(async move {
                let (mut sink, mut source) = ws.split();
                loop {
                    tokio::select! {
                        frame = source.next() => {
                            let Some(Ok(Message::Text(text))) = frame else { break };
                            let request: Value = serde_json::from_str(text.as_str()).unwrap();
                            let result = match request["method"].as_str() {
                                Some("signatureSubscribe") => {
                                    let id = next_subscription.fetch_add(1, Ordering::SeqCst);
                                    let signature = request["params"][0].as_str().unwrap_or_default();
                                    subscribed.lock().unwrap().push((signature.to_string(), id));
                                    serde_json::json!(id)
                                }
                                Some("signatureUnsubscribe") => {
                                    let id = request["params"][0].as_u64().unwrap_or_default();
                                    unsubscribed.lock().unwrap().push(id);
                                    serde_json::json!(true)
                                }
                                _ => Value::Null,
                            };
                            let reply = rpc_result(&request, result).to_string();
                            if sink.send(Message::text(reply)).await.is_err() {
                                break;
                            }
                        }
                        command = control_rx.recv() => match command {
                            Some(NodeCommand::Notify { subscription, slot }) => {
                                let frame = serde_json::json!({
                                    "jsonrpc": "2.0",
                                    "method": "signatureNotification",
                                    "params": {
                                        "result": { "context": { "slot": slot }, "value": { "err": null } },
                                        "subscription": subscription
                                    }
                                });
                                let _ = sink.send(Message::text(frame.to_string())).await;
                            }
                            Some(NodeCommand::Close) | None => {
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                        },
                    }
                }
            });
        }
    });

    node
}
