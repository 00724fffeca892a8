//! JSON-RPC provider over HTTP for node endpoints with unlocked accounts.
//!
//! HTTP endpoints cannot push notifications, so `accountsChanged` and
//! `chainChanged` are synthesised by [`HttpProvider::poll`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventHandler, EventKind, ListenerRegistry, ProviderEvent, SubscriptionId, WalletProvider};
use crate::error::ProviderError;

/// JSON-RPC request wrapper.
#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response wrapper.
#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// Last values observed by [`HttpProvider::poll`].
#[derive(Default)]
struct Observed {
    accounts: Option<Vec<String>>,
    chain_id: Option<String>,
}

pub struct HttpProvider {
    http: reqwest::Client,
    rpc_url: String,
    listeners: ListenerRegistry,
    observed: Mutex<Observed>,
}

impl HttpProvider {
    pub fn new(rpc_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
            listeners: ListenerRegistry::new(),
            observed: Mutex::new(Observed::default()),
        }
    }

    /// Perform a raw JSON-RPC call.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let resp: RpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method} request failed: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to parse {method} response: {e}")))?;

        if let Some(err) = resp.error {
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        // `eth_getTransactionReceipt` legitimately returns null while pending.
        Ok(resp.result.unwrap_or(Value::Null))
    }

    /// Query accounts and chain id, emitting an event for each value that
    /// changed since the previous poll. The first poll only records.
    pub async fn poll(&self) -> Result<(), ProviderError> {
        let accounts_value = self.rpc_call("eth_accounts", serde_json::json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(accounts_value)
            .map_err(|e| ProviderError::Transport(format!("eth_accounts: {e}")))?;
        let chain_id = self
            .rpc_call("eth_chainId", serde_json::json!([]))
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Transport("eth_chainId: expected string".into()))?;

        let mut events = Vec::new();
        {
            let mut observed = self.observed.lock();
            if observed.accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                events.push(ProviderEvent::AccountsChanged(accounts.clone()));
            }
            if observed.chain_id.as_ref().is_some_and(|prev| *prev != chain_id) {
                events.push(ProviderEvent::ChainChanged(chain_id.clone()));
            }
            observed.accounts = Some(accounts);
            observed.chain_id = Some(chain_id);
        }

        for event in &events {
            let delivered = self.listeners.emit(event);
            tracing::debug!(event = event.kind().as_str(), delivered, "provider event");
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        // A node has no permission prompt: authorised accounts are its unlocked ones.
        let method = match method {
            "eth_requestAccounts" => "eth_accounts",
            other => other,
        };
        self.rpc_call(method, params).await
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.listeners.subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}
