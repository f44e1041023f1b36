//! JSON-RPC account source.
//!
//! - POST getAccountInfo (base64 encoding) for snapshots
//! - websocket accountSubscribe for live updates
//!
//! Both use the configured commitment level so the snapshot and the feed
//! agree on what "current" means.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use sigorder_types::{Pubkey, Result, SigOrderError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::{AccountSource, AccountSubscription, LedgerConfig};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    value: Option<AccountValue>,
}

#[derive(Debug, Deserialize)]
struct AccountValue {
    /// `[payload, encoding]`
    data: (String, String),
}

/// Account source backed by a ledger RPC node.
pub struct RpcAccountSource {
    rpc_url: String,
    ws_url: String,
    commitment: String,
    client: reqwest::Client,
}

impl RpcAccountSource {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SigOrderError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            ws_url: config.ws_url.clone(),
            commitment: config.commitment.clone(),
            client,
        })
    }

    fn account_params(&self, address: &Pubkey) -> Value {
        json!([address.to_base58(), {"encoding": "base64", "commitment": self.commitment}])
    }
}

/// Decode a `[payload, "base64"]` account data pair.
fn decode_account_data(data: &(String, String)) -> Result<Vec<u8>> {
    if data.1 != "base64" {
        return Err(SigOrderError::Decode(format!("unexpected account encoding {}", data.1)));
    }
    BASE64
        .decode(data.0.as_bytes())
        .map_err(|e| SigOrderError::Decode(format!("invalid base64 account data: {}", e)))
}

/// Pull account data out of an `accountNotification` message.
fn notification_data(msg: &Value) -> Option<Result<Vec<u8>>> {
    if msg.get("method")?.as_str()? != "accountNotification" {
        return None;
    }
    let value = msg.pointer("/params/result/value")?;
    let data: (String, String) = match serde_json::from_value(value.get("data")?.clone()) {
        Ok(d) => d,
        Err(e) => return Some(Err(SigOrderError::Decode(e.to_string()))),
    };
    Some(decode_account_data(&data))
}

#[async_trait]
impl AccountSource for RpcAccountSource {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": self.account_params(address),
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SigOrderError::Transport(format!("rpc request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(SigOrderError::Transport(format!(
                "rpc returned status {}",
                resp.status()
            )));
        }

        let parsed: RpcResponse<AccountInfoResult> = resp
            .json()
            .await
            .map_err(|e| SigOrderError::Decode(format!("failed to parse rpc response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(SigOrderError::Transport(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        match parsed.result.and_then(|r| r.value) {
            Some(value) => decode_account_data(&value.data).map(Some),
            None => Ok(None),
        }
    }

    async fn subscribe(&self, address: &Pubkey) -> Result<AccountSubscription> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| SigOrderError::Subscription(format!("websocket connect failed: {}", e)))?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "accountSubscribe",
            "params": self.account_params(address),
        });
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| SigOrderError::Subscription(format!("subscribe request failed: {}", e)))?;

        // Wait for the subscription id so no notification can precede it.
        let subscription_id = loop {
            let msg = ws
                .next()
                .await
                .ok_or_else(|| SigOrderError::Subscription("websocket closed before subscribe ack".into()))?
                .map_err(|e| SigOrderError::Subscription(e.to_string()))?;
            let Message::Text(text) = msg else { continue };
            let parsed: RpcResponse<u64> = serde_json::from_str(&text)
                .map_err(|e| SigOrderError::Subscription(format!("bad subscribe ack: {}", e)))?;
            if let Some(err) = parsed.error {
                return Err(SigOrderError::Subscription(format!(
                    "accountSubscribe rejected ({}): {}",
                    err.code, err.message
                )));
            }
            if let Some(id) = parsed.result {
                break id;
            }
        };
        info!(%address, subscription_id, "account subscription active");

        let (tx, rx) = mpsc::unbounded_channel();
        let address = *address;
        let task = tokio::spawn(async move {
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                            warn!(%address, "ignoring non-json websocket frame");
                            continue;
                        };
                        match notification_data(&value) {
                            Some(Ok(data)) => {
                                if tx.send(data).is_err() {
                                    break;
                                }
                            }
                            Some(Err(e)) => warn!(%address, error = %e, "undecodable account notification"),
                            None => debug!(%address, "ignoring websocket message"),
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if ws.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%address, error = %e, "account websocket failed");
                        break;
                    }
                }
            }
            debug!(%address, subscription_id, "account feed ended");
        });

        Ok(AccountSubscription::new(rx, move || task.abort()))
    }
}
