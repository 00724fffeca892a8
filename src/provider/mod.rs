//! Provider gateway: detects the wallet provider and hands out read and
//! signing handles to it.

pub mod http;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{
    chain::Log,
    error::{ProviderError, WalletError},
    types::{parse_hex_u64, Address, ChainId, TxHash},
};

pub use http::HttpProvider;

/// Kinds of provider notifications the session listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountsChanged,
    ChainChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::ChainChanged => "chainChanged",
        }
    }
}

/// A notification pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Ordered list of authorised account strings; empty when locked.
    AccountsChanged(Vec<String>),
    /// Hex-encoded chain id.
    ChainChanged(String),
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => EventKind::ChainChanged,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Request/notification surface of an injected wallet (EIP-1193 shaped).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    /// Returns false if `id` was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Subscription table shared by provider adapters.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, EventKind, EventHandler)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, handler));
        tracing::debug!(subscription = %id, event = kind.as_str(), "listener registered");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _, _)| *sid != id);
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "listener removed");
        }
        removed
    }

    /// Deliver `event` to every matching listener. Returns the delivery count.
    ///
    /// The handler list is cloned first, so handlers may (un)subscribe.
    pub fn emit(&self, event: &ProviderEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| h.clone())
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }
}

/// Transaction receipt fields the client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Read/RPC handle over the wallet provider.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<dyn WalletProvider>,
}

impl ProviderHandle {
    pub fn new(inner: Arc<dyn WalletProvider>) -> Self {
        Self { inner }
    }

    /// Raw request, returning the provider's own error.
    pub async fn raw_request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.inner.request(method, params).await
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.raw_request(method, params)
            .await
            .map_err(|e| WalletError::rpc(method, e))
    }

    pub async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let result = self.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(&result)
    }

    pub async fn chain_id(&self) -> Result<ChainId, WalletError> {
        let result = self.request("eth_chainId", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| WalletError::MalformedResponse("eth_chainId: expected string".into()))?;
        parse_hex_u64(hex)
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, WalletError> {
        let result = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| WalletError::MalformedResponse("eth_call: expected string".into()))?;
        crate::types::parse_hex_bytes(hex)
    }

    /// All logs emitted by `address` with the given topic 0, in log order.
    pub async fn get_logs(&self, address: Address, topic0: [u8; 32]) -> Result<Vec<Log>, WalletError> {
        let result = self
            .request(
                "eth_getLogs",
                json!([{
                    "address": address.to_string(),
                    "topics": [format!("0x{}", hex::encode(topic0))],
                    "fromBlock": "earliest",
                    "toBlock": "latest",
                }]),
            )
            .await?;
        let entries = result
            .as_array()
            .ok_or_else(|| WalletError::MalformedResponse("eth_getLogs: expected array".into()))?;
        let mut logs = entries.iter().map(Log::from_json).collect::<Result<Vec<_>, _>>()?;
        logs.sort_by_key(|l| l.position());
        Ok(logs)
    }

    pub async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, WalletError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .map(parse_hex_u64)
            .transpose()?;
        let block_number = result
            .get("blockNumber")
            .and_then(Value::as_str)
            .map(parse_hex_u64)
            .transpose()?;
        Ok(Some(Receipt {
            // Pre-Byzantium receipts have no status field.
            success: status.map_or(true, |s| s == 1),
            block_number,
        }))
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.inner.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

/// A provider handle authorised to send transactions from `from`.
#[derive(Clone)]
pub struct SigningHandle {
    provider: ProviderHandle,
    from: Address,
}

impl SigningHandle {
    pub fn from(&self) -> Address {
        self.from
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    /// Submit a transaction through the wallet and return its hash.
    pub async fn send_transaction(&self, to: Address, data: &[u8]) -> Result<TxHash, WalletError> {
        let result = self
            .provider
            .raw_request(
                "eth_sendTransaction",
                json!([{
                    "from": self.from.to_string(),
                    "to": to.to_string(),
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await
            .map_err(|e| {
                if e.is_user_rejection() {
                    WalletError::UserRejected(e.to_string())
                } else {
                    WalletError::SubmissionFailure { source: e }
                }
            })?;
        result
            .as_str()
            .ok_or_else(|| WalletError::MalformedResponse("eth_sendTransaction: expected hash".into()))?
            .parse()
    }
}

/// Detects the injected wallet and constructs handles to it.
#[derive(Clone, Default)]
pub struct ProviderGateway {
    injected: Option<Arc<dyn WalletProvider>>,
}

impl ProviderGateway {
    pub fn new(injected: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { injected }
    }

    pub fn is_available(&self) -> bool {
        self.injected.is_some()
    }

    pub fn read_handle(&self) -> Result<ProviderHandle, WalletError> {
        self.injected
            .clone()
            .map(ProviderHandle::new)
            .ok_or(WalletError::ProviderUnavailable)
    }

    /// Derive a signer for the wallet's first authorised account.
    pub async fn signing_handle(&self) -> Result<SigningHandle, WalletError> {
        let provider = self.read_handle()?;
        let accounts = provider
            .request_accounts()
            .await
            .map_err(|e| WalletError::SignerUnavailable(e.to_string()))?;
        let from = accounts
            .first()
            .copied()
            .ok_or_else(|| WalletError::SignerUnavailable("no authorised accounts".into()))?;
        Ok(SigningHandle { provider, from })
    }
}

pub(crate) fn parse_accounts(value: &Value) -> Result<Vec<Address>, WalletError> {
    value
        .as_array()
        .ok_or_else(|| WalletError::MalformedResponse("accounts: expected array".into()))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| WalletError::MalformedResponse("account is not a string".into()))?
                .parse()
        })
        .collect()
}
