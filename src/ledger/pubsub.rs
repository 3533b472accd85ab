//! Websocket signature subscriptions.
//!
//! One reader task routes every inbound frame: replies go to the request that
//! is waiting on that id, `signatureNotification`s go to the subscription that
//! registered for them. Subscriptions are registered by the reader itself when
//! the subscribe reply arrives, so a notification that follows the reply on
//! the wire can never be missed. A subscribe reply nobody is waiting for any
//! more is unsubscribed on the spot.
//!
//! A client whose socket closed stays closed; [`RpcLedger`](super::RpcLedger)
//! replaces it on the next subscription.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use solana_sdk::signature::Signature;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::ledger::types::{
    Commitment, LedgerError, LedgerResult, SignatureNotification, SignatureSubscription,
    SubscriptionId,
};

struct PendingRequest {
    reply: oneshot::Sender<LedgerResult<Value>>,
    /// Present for subscribe requests; registered under the returned id.
    on_notification: Option<oneshot::Sender<SignatureNotification>>,
}

type PendingMap = DashMap<u64, PendingRequest>;
type SubscriptionMap = DashMap<SubscriptionId, oneshot::Sender<SignatureNotification>>;

/// State shared between the client handle and its reader task.
struct Shared {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    subscriptions: SubscriptionMap,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl Shared {
    fn new(outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            outbound,
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a request whose reply nobody awaits.
    fn fire_and_forget(&self, method: &str, params: Value) {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": method,
            "params": params,
        });
        if self.outbound.send(Message::text(body.to_string())).is_err() {
            tracing::debug!(method, "Pubsub writer stopped; request dropped");
        }
    }
}

/// Client side of the node's pubsub websocket.
pub struct PubsubClient {
    shared: Arc<Shared>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PubsubClient {
    /// Open the websocket and start the reader and writer tasks.
    pub async fn connect(url: &Url, request_timeout: Duration) -> LedgerResult<Self> {
        let (stream, _) = timeout(request_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| LedgerError::Timeout(request_timeout.as_secs()))?
            .map_err(|e| LedgerError::Transport(format!("Websocket connect to {}: {}", url, e)))?;

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let shared = Arc::new(Shared::new(outbound));

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "Websocket write failed");
                    break;
                }
            }
        });

        let reader = {
            let shared = shared.clone();
            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    match frame {
                        Ok(Message::Text(text)) => route_frame(text.as_str(), &shared),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Websocket read failed");
                            break;
                        }
                    }
                }
                shared.closed.store(true, Ordering::SeqCst);
                shared.pending.clear();
                shared.subscriptions.clear();
                tracing::info!("Pubsub connection closed");
            })
        };

        tracing::info!(url = %url, "Pubsub connection established");

        Ok(Self {
            shared,
            request_timeout,
            reader,
            writer,
        })
    }

    /// Whether the socket is gone. A closed client never reopens.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        on_notification: Option<oneshot::Sender<SignatureNotification>>,
    ) -> LedgerResult<Value> {
        if self.is_closed() {
            return Err(LedgerError::Transport("Pubsub connection closed".to_string()));
        }

        let id = self.shared.next_id();
        let (reply, reply_rx) = oneshot::channel();
        self.shared.pending.insert(
            id,
            PendingRequest {
                reply,
                on_notification,
            },
        );

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if self.shared.outbound.send(Message::text(body.to_string())).is_err() {
            self.shared.pending.remove(&id);
            return Err(LedgerError::Transport("Pubsub writer stopped".to_string()));
        }

        match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LedgerError::Transport(
                "Pubsub connection closed before reply".to_string(),
            )),
            Err(_) => {
                self.shared.pending.remove(&id);
                Err(LedgerError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }

    pub async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> LedgerResult<SignatureSubscription> {
        let (notify, notification) = oneshot::channel();
        let result = self
            .request(
                "signatureSubscribe",
                json!([signature.to_string(), { "commitment": commitment.normalized().as_str() }]),
                Some(notify),
            )
            .await?;

        let id = result.as_u64().ok_or_else(|| {
            LedgerError::Subscription(format!("Unexpected subscription id {}", result))
        })?;

        tracing::debug!(signature = %signature, subscription = id, "Signature subscription registered");
        Ok(SignatureSubscription { id, notification })
    }

    pub async fn unsubscribe(&self, subscription: SubscriptionId) -> LedgerResult<()> {
        self.shared.subscriptions.remove(&subscription);
        self.request("signatureUnsubscribe", json!([subscription]), None)
            .await
            .map(|_| ())
    }

    pub fn has_subscription(&self, subscription: SubscriptionId) -> bool {
        self.shared.subscriptions.contains_key(&subscription)
    }
}

impl Drop for PubsubClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl std::fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubClient")
            .field("subscriptions", &self.shared.subscriptions.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Dispatch one inbound text frame.
fn route_frame(text: &str, shared: &Shared) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable pubsub frame");
            return;
        }
    };

    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        let Some((_, request)) = shared.pending.remove(&id) else {
            return;
        };

        let result = match frame.get("error") {
            Some(error) if !error.is_null() => Err(LedgerError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            _ => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
        };

        let mut registered = None;
        if let (Ok(value), Some(notify)) = (&result, request.on_notification) {
            if let Some(subscription) = value.as_u64() {
                shared.subscriptions.insert(subscription, notify);
                registered = Some(subscription);
            }
        }

        if request.reply.send(result).is_err() {
            // The subscriber gave up before the reply arrived.
            if let Some(subscription) = registered {
                shared.subscriptions.remove(&subscription);
                shared.fire_and_forget("signatureUnsubscribe", json!([subscription]));
                tracing::debug!(subscription, "Dropped subscription nobody is waiting for");
            }
        }
        return;
    }

    if frame.get("method").and_then(Value::as_str) == Some("signatureNotification") {
        if let Some((subscription, notification)) = parse_signature_notification(&frame) {
            // Nodes drop signature subscriptions after the first notification.
            if let Some((_, notify)) = shared.subscriptions.remove(&subscription) {
                let _ = notify.send(notification);
            }
        }
    }
}

/// Extract `(subscription, notification)` from a `signatureNotification` frame.
///
/// `receivedSignature` frames carry a string value and are ignored.
fn parse_signature_notification(frame: &Value) -> Option<(SubscriptionId, SignatureNotification)> {
    let params = frame.get("params")?;
    let subscription = params.get("subscription")?.as_u64()?;
    let result = params.get("result")?;
    let slot = result.get("context")?.get("slot")?.as_u64()?;
    let value = result.get("value")?.as_object()?;
    let err = value.get("err").cloned().filter(|e| !e.is_null());
    Some((subscription, SignatureNotification { slot, err }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> (Shared, mpsc::UnboundedReceiver<Message>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        (Shared::new(outbound), outbound_rx)
    }

    fn notification(subscription: u64, err: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "signatureNotification",
            "params": {
                "result": { "context": { "slot": 42 }, "value": { "err": err } },
                "subscription": subscription
            }
        })
        .to_string()
    }

    #[test]
    fn test_subscribe_reply_registers_subscription() {
        let (shared, _outbound) = shared();
        let (reply, mut reply_rx) = oneshot::channel();
        let (notify, mut notification_rx) = oneshot::channel();
        shared.pending.insert(
            7,
            PendingRequest {
                reply,
                on_notification: Some(notify),
            },
        );

        route_frame(r#"{"jsonrpc":"2.0","result":23,"id":7}"#, &shared);
        assert_eq!(reply_rx.try_recv().unwrap().unwrap(), json!(23));
        assert!(shared.subscriptions.contains_key(&23));

        route_frame(&notification(23, Value::Null), &shared);
        let received = notification_rx.try_recv().unwrap();
        assert_eq!(received.slot, 42);
        assert!(received.err.is_none());
        assert!(!shared.subscriptions.contains_key(&23));
    }

    #[test]
    fn test_abandoned_subscribe_reply_is_unsubscribed() {
        let (shared, mut outbound) = shared();
        let (reply, reply_rx) = oneshot::channel();
        let (notify, _notification_rx) = oneshot::channel();
        shared.pending.insert(
            3,
            PendingRequest {
                reply,
                on_notification: Some(notify),
            },
        );
        drop(reply_rx);

        route_frame(r#"{"jsonrpc":"2.0","result":31,"id":3}"#, &shared);
        assert!(!shared.subscriptions.contains_key(&31));

        let Message::Text(text) = outbound.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        let request: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(request["method"], "signatureUnsubscribe");
        assert_eq!(request["params"], json!([31]));
    }

    #[test]
    fn test_notification_carries_error() {
        let frame: Value =
            serde_json::from_str(&notification(5, json!({ "InstructionError": [0, { "Custom": 1 }] })))
                .unwrap();
        let (subscription, parsed) = parse_signature_notification(&frame).unwrap();
        assert_eq!(subscription, 5);
        assert!(parsed.err.is_some());
    }

    #[test]
    fn test_received_signature_frame_ignored() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "signatureNotification",
            "params": {
                "result": { "context": { "slot": 1 }, "value": "receivedSignature" },
                "subscription": 9
            }
        });
        assert!(parse_signature_notification(&frame).is_none());
    }

    #[test]
    fn test_error_reply_is_rpc_error() {
        let (shared, _outbound) = shared();
        let (reply, mut reply_rx) = oneshot::channel();
        shared.pending.insert(
            1,
            PendingRequest {
                reply,
                on_notification: None,
            },
        );

        route_frame(
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":1}"#,
            &shared,
        );
        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            Err(LedgerError::Rpc { code: -32602, .. })
        ));
    }
}
