//! JSON-RPC ledger client with timeout and failover handling.
//!
//! # Responsibilities
//! - Speak JSON-RPC over HTTP to the primary endpoint, falling back to failovers
//! - Bound every request by the configured deadline
//! - Delegate signature subscriptions to a lazily connected websocket,
//!   reopened on demand after it drops

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use tokio::sync::Mutex;
use tokio::time::timeout;
use url::Url;

use crate::config::LedgerConfig;
use crate::ledger::connection::LedgerConnection;
use crate::ledger::pubsub::PubsubClient;
use crate::ledger::types::{
    BlockReference, Commitment, LedgerError, LedgerResult, SendOptions, SignatureStatus,
    SignatureSubscription, SimulationResult, SubscriptionId,
};
use crate::observability::metrics;

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl From<RpcErrorObject> for LedgerError {
    fn from(e: RpcErrorObject) -> Self {
        LedgerError::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

/// `{ context, value }` wrapper used by most read methods.
#[derive(Debug, Deserialize)]
pub(crate) struct WithContext<T> {
    pub context: RpcContext,
    pub value: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcContext {
    pub slot: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

/// Derive the pubsub URL from an HTTP RPC URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and an explicit port is bumped
/// by one, matching how validators expose the two services.
pub fn websocket_url(rpc_url: &Url) -> LedgerResult<Url> {
    let mut ws = rpc_url.clone();
    let scheme = match rpc_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(LedgerError::Transport(format!(
                "Unsupported RPC scheme '{}'",
                other
            )))
        }
    };
    ws.set_scheme(scheme)
        .map_err(|_| LedgerError::Transport(format!("Cannot derive websocket URL from {}", rpc_url)))?;
    if let Some(port) = rpc_url.port() {
        ws.set_port(Some(port.saturating_add(1)))
            .map_err(|_| LedgerError::Transport(format!("Invalid port in {}", rpc_url)))?;
    }
    Ok(ws)
}

/// Ledger connection backed by a JSON-RPC node.
pub struct RpcLedger {
    http: reqwest::Client,
    /// Primary endpoint first, then failovers.
    endpoints: Vec<Url>,
    ws_url: Url,
    timeout_duration: Duration,
    request_id: AtomicU64,
    /// Current websocket client, replaced after its socket closes.
    pubsub: ArcSwapOption<PubsubClient>,
    /// Serializes websocket (re)connects.
    connecting: Mutex<()>,
}

impl RpcLedger {
    /// Create a client from configuration.
    ///
    /// No request is made here; the websocket is only opened on the first
    /// subscription.
    pub fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        let primary: Url = config.rpc_url.parse().map_err(|e| {
            LedgerError::Transport(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let mut endpoints = vec![primary.clone()];
        for url_str in &config.failover_urls {
            match url_str.parse() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let ws_url = match &config.ws_url {
            Some(ws) => ws.parse().map_err(|e| {
                LedgerError::Transport(format!("Invalid websocket URL '{}': {}", ws, e))
            })?,
            None => websocket_url(&primary)?,
        };

        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        tracing::info!(
            rpc_url = %primary,
            ws_url = %ws_url,
            failovers = endpoints.len() - 1,
            "Ledger client initialized"
        );

        Ok(Self {
            http,
            endpoints,
            ws_url,
            timeout_duration,
            request_id: AtomicU64::new(1),
            pubsub: ArcSwapOption::empty(),
            connecting: Mutex::new(()),
        })
    }

    /// Issue one JSON-RPC call, trying each endpoint in turn.
    ///
    /// An error object returned by a node is final; only transport failures
    /// and timeouts move on to the next endpoint.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let mut last_error = None;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            match timeout(self.timeout_duration, self.post(endpoint, &body)).await {
                Ok(Ok(response)) => return Self::unwrap_response(method, response),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                    last_error = Some(LedgerError::Timeout(self.timeout_duration.as_secs()));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| LedgerError::Transport("No RPC endpoints configured".to_string())))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        body: &Value,
    ) -> LedgerResult<RpcResponse<T>> {
        let response = self
            .http
            .post(endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("HTTP status {}", status)));
        }

        response
            .json::<RpcResponse<T>>()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    fn unwrap_response<T>(method: &str, response: RpcResponse<T>) -> LedgerResult<T> {
        if let Some(error) = response.error {
            return Err(error.into());
        }
        response
            .result
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{} returned no result", method)))
    }

    /// The live websocket client, opening a new one if there is none or the
    /// last one closed.
    async fn pubsub(&self) -> LedgerResult<Arc<PubsubClient>> {
        if let Some(client) = self.live_pubsub() {
            return Ok(client);
        }

        let _connecting = self.connecting.lock().await;
        if let Some(client) = self.live_pubsub() {
            return Ok(client);
        }
        if self.pubsub.load().is_some() {
            tracing::warn!(ws_url = %self.ws_url, "Pubsub connection lost; reconnecting");
        }

        let client = Arc::new(PubsubClient::connect(&self.ws_url, self.timeout_duration).await?);
        self.pubsub.store(Some(client.clone()));
        Ok(client)
    }

    fn live_pubsub(&self) -> Option<Arc<PubsubClient>> {
        self.pubsub.load_full().filter(|client| !client.is_closed())
    }

    /// Check if the node is reachable and reports itself healthy.
    pub async fn is_healthy(&self) -> bool {
        let healthy = matches!(
            self.call::<String>("getHealth", json!([])).await.as_deref(),
            Ok("ok")
        );
        metrics::record_ledger_health(self.endpoints[0].as_str(), healthy);
        healthy
    }
}

#[async_trait]
impl LedgerConnection for RpcLedger {
    async fn send_raw_transaction(
        &self,
        wire_transaction: &[u8],
        options: SendOptions,
    ) -> LedgerResult<Signature> {
        let mut config = json!({
            "encoding": "base64",
            "skipPreflight": options.skip_preflight,
        });
        if let Some(commitment) = options.preflight_commitment {
            config["preflightCommitment"] = json!(commitment.normalized().as_str());
        }

        let signature: String = self
            .call(
                "sendTransaction",
                json!([BASE64.encode(wire_transaction), config]),
            )
            .await?;

        Signature::from_str(&signature)
            .map_err(|e| LedgerError::InvalidResponse(format!("Bad signature '{}': {}", signature, e)))
    }

    async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> LedgerResult<SignatureSubscription> {
        self.pubsub()
            .await?
            .subscribe_signature(signature, commitment)
            .await
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> LedgerResult<()> {
        // Handles from a replaced connection are already gone on the node.
        match self.live_pubsub() {
            Some(client) if client.has_subscription(subscription) => {
                client.unsubscribe(subscription).await
            }
            _ => Ok(()),
        }
    }

    fn has_subscription(&self, subscription: SubscriptionId) -> bool {
        self.live_pubsub()
            .map_or(false, |client| client.has_subscription(subscription))
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> LedgerResult<Vec<Option<SignatureStatus>>> {
        let signatures: Vec<String> = signatures.iter().map(|s| s.to_string()).collect();
        let response: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([signatures, { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(response.value)
    }

    async fn get_recent_block_reference(
        &self,
        commitment: Commitment,
    ) -> LedgerResult<BlockReference> {
        let response: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": commitment.normalized().as_str() }]),
            )
            .await?;

        let blockhash = Hash::from_str(&response.value.blockhash).map_err(|e| {
            LedgerError::InvalidResponse(format!(
                "Bad blockhash '{}': {}",
                response.value.blockhash, e
            ))
        })?;

        tracing::debug!(
            slot = response.context.slot,
            blockhash = %blockhash,
            "Fetched block reference"
        );

        Ok(BlockReference {
            blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn simulate_transaction(
        &self,
        wire_transaction: &[u8],
        commitment: Commitment,
    ) -> LedgerResult<SimulationResult> {
        // The stored blockhash may have expired by now; let the node swap in a
        // fresh one, which also requires skipping signature verification.
        let response: WithContext<SimulationResult> = self
            .call(
                "simulateTransaction",
                json!([
                    BASE64.encode(wire_transaction),
                    {
                        "encoding": "base64",
                        "commitment": commitment.normalized().as_str(),
                        "sigVerify": false,
                        "replaceRecentBlockhash": true,
                    }
                ]),
            )
            .await?;
        Ok(response.value)
    }

    async fn get_minimum_balance_for_size(&self, size: usize) -> LedgerResult<u64> {
        self.call("getMinimumBalanceForRentExemption", json!([size]))
            .await
    }
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("endpoints", &self.endpoints)
            .field("ws_url", &self.ws_url)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
