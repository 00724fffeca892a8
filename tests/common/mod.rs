//! Scriptable in-memory wallet provider shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use nft_mint_client::{
    chain::{
        abi::{self, Token},
        contract::{TRANSFER_BATCH, TRANSFER_SINGLE, WHITELIST_UPDATED},
    },
    config::{ClientConfig, DesiredNetwork},
    error::ProviderError,
    provider::{EventKind, EventHandler, ListenerRegistry, ProviderEvent, SubscriptionId, WalletProvider},
    types::Address,
};

pub const SEPOLIA_HEX: &str = "0xaa36a7";
pub const MAINNET_HEX: &str = "0x1";

pub fn addr(byte: u8) -> Address {
    Address([byte; 20])
}

pub fn contract_address() -> Address {
    addr(0xcc)
}

/// Config with a fast receipt poll so confirmations resolve quickly.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(contract_address(), DesiredNetwork::default());
    config.receipt_poll_interval = Duration::from_millis(5);
    config
}

fn uint_word(v: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&v.to_be_bytes());
    out
}

fn address_topic(a: Address) -> String {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(&a.0);
    format!("0x{}", hex::encode(out))
}

fn topic_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(abi::event_topic(signature)))
}

fn log_json(topics: Vec<String>, data: Vec<u8>, block: u64, index: u64) -> Value {
    json!({
        "blockNumber": format!("0x{block:x}"),
        "logIndex": format!("0x{index:x}"),
        "topics": topics,
        "data": format!("0x{}", hex::encode(data)),
    })
}

pub fn whitelist_log(user: Address, added: bool, block: u64, index: u64) -> Value {
    log_json(
        vec![topic_hex(WHITELIST_UPDATED), address_topic(user)],
        abi::encode(&[Token::Bool(added)]),
        block,
        index,
    )
}

pub fn transfer_single_log(to: Address, id: u128, block: u64, index: u64) -> Value {
    log_json(
        vec![
            topic_hex(TRANSFER_SINGLE),
            address_topic(to),
            address_topic(Address::ZERO),
            address_topic(to),
        ],
        abi::encode(&[Token::Uint(id), Token::Uint(1)]),
        block,
        index,
    )
}

/// `TransferBatch` mint with `ids` and a value of 1 for each.
pub fn transfer_batch_log(to: Address, ids: &[u128], block: u64, index: u64) -> Value {
    let ids_offset = 64u128;
    let values_offset = ids_offset + 32 * (ids.len() as u128 + 1);
    let mut data = Vec::new();
    data.extend_from_slice(&uint_word(ids_offset));
    data.extend_from_slice(&uint_word(values_offset));
    data.extend_from_slice(&uint_word(ids.len() as u128));
    for id in ids {
        data.extend_from_slice(&uint_word(*id));
    }
    data.extend_from_slice(&uint_word(ids.len() as u128));
    for _ in ids {
        data.extend_from_slice(&uint_word(1));
    }
    log_json(
        vec![
            topic_hex(TRANSFER_BATCH),
            address_topic(to),
            address_topic(Address::ZERO),
            address_topic(to),
        ],
        data,
        block,
        index,
    )
}

struct MockState {
    accounts: Vec<String>,
    chain_id: String,
    calls: HashMap<[u8; 4], Vec<u8>>,
    logs: HashMap<String, Vec<Value>>,
    failures: HashMap<String, ProviderError>,
    hanging: HashSet<String>,
    receipt_success: bool,
    receipts_pending: bool,
    tx_counter: u8,
    requests: Vec<(String, Value)>,
}

/// Wallet provider double: answers from scripted tables and records every
/// request it receives.
pub struct MockProvider {
    listeners: ListenerRegistry,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(accounts: &[Address], chain_id: &str) -> Arc<Self> {
        Arc::new(Self {
            listeners: ListenerRegistry::new(),
            state: Mutex::new(MockState {
                accounts: accounts.iter().map(|a| a.to_string()).collect(),
                chain_id: chain_id.to_string(),
                calls: HashMap::new(),
                logs: HashMap::new(),
                failures: HashMap::new(),
                hanging: HashSet::new(),
                receipt_success: true,
                receipts_pending: false,
                tx_counter: 0,
                requests: Vec::new(),
            }),
        })
    }

    /// Connected-ready provider on the desired chain.
    pub fn on_sepolia(account: Address) -> Arc<Self> {
        Self::new(&[account], SEPOLIA_HEX)
    }

    pub fn as_wallet(self: &Arc<Self>) -> Arc<dyn WalletProvider> {
        self.clone()
    }

    pub fn set_accounts(&self, accounts: &[Address]) {
        self.state.lock().accounts = accounts.iter().map(|a| a.to_string()).collect();
    }

    /// Script the return data of `eth_call` for a function signature.
    pub fn set_call(&self, signature: &str, output: Vec<u8>) {
        self.state.lock().calls.insert(abi::selector(signature), output);
    }

    pub fn set_logs(&self, event_signature: &str, logs: Vec<Value>) {
        self.state.lock().logs.insert(topic_hex(event_signature), logs);
    }

    /// Make every request for `method` fail with `error`.
    pub fn fail(&self, method: &str, error: ProviderError) {
        self.state.lock().failures.insert(method.to_string(), error);
    }

    pub fn clear_failure(&self, method: &str) {
        self.state.lock().failures.remove(method);
    }

    /// Make requests for `method` never resolve, like an unanswered prompt.
    pub fn hang(&self, method: &str) {
        self.state.lock().hanging.insert(method.to_string());
    }

    pub fn release(&self, method: &str) {
        self.state.lock().hanging.remove(method);
    }

    pub fn set_receipt_success(&self, success: bool) {
        self.state.lock().receipt_success = success;
    }

    pub fn set_receipts_pending(&self, pending: bool) {
        self.state.lock().receipts_pending = pending;
    }

    /// Standard contract reads: limit 3, the given owner, a token URI under
    /// `ipfs://cid/` and a 5% royalty.
    pub fn script_contract(&self, owner: Address) {
        self.set_call("maxMintsPerUser()", abi::encode(&[Token::Uint(3)]));
        self.set_call("owner()", abi::encode(&[Token::Address(owner)]));
        self.set_call(
            "uri(uint256)",
            abi::encode(&[Token::String("ipfs://cid/1.json".into())]),
        );
        self.set_call(
            "royaltyInfo(uint256,uint256)",
            abi::encode(&[Token::Address(owner), Token::Uint(500)]),
        );
        self.set_call("whitelist(address)", abi::encode(&[Token::Bool(true)]));
        self.set_call("userMintCount(address)", abi::encode(&[Token::Uint(1)]));
    }

    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.listeners.emit(&event)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.count(kind)
    }

    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn respond(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let mut state = self.state.lock();
        state.requests.push((method.to_string(), params.clone()));
        if let Some(err) = state.failures.get(method) {
            return Err(err.clone());
        }

        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!(state.accounts)),
            "eth_chainId" => Ok(json!(state.chain_id)),
            "eth_call" => {
                let data = params[0]["data"].as_str().unwrap_or_default();
                let bytes = hex::decode(data.trim_start_matches("0x")).unwrap_or_default();
                let mut selector = [0u8; 4];
                if bytes.len() >= 4 {
                    selector.copy_from_slice(&bytes[..4]);
                }
                state
                    .calls
                    .get(&selector)
                    .map(|out| json!(format!("0x{}", hex::encode(out))))
                    .ok_or_else(|| ProviderError::rpc(-32000, "execution reverted"))
            }
            "eth_getLogs" => {
                let topic = params[0]["topics"][0].as_str().unwrap_or_default();
                Ok(json!(state.logs.get(topic).cloned().unwrap_or_default()))
            }
            "eth_sendTransaction" => {
                state.tx_counter += 1;
                Ok(json!(format!("0x{}", hex::encode([state.tx_counter; 32]))))
            }
            "eth_getTransactionReceipt" => {
                if state.receipts_pending {
                    return Ok(Value::Null);
                }
                let status = if state.receipt_success { "0x1" } else { "0x0" };
                Ok(json!({ "status": status, "blockNumber": "0x10" }))
            }
            "wallet_switchEthereumChain" => {
                if let Some(id) = params[0]["chainId"].as_str() {
                    state.chain_id = id.to_string();
                }
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => Ok(Value::Null),
            other => Err(ProviderError::Unsupported(other.to_string())),
        }
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        // Suspend once, like a real round-trip, so concurrent callers interleave.
        tokio::task::yield_now().await;
        let hanging = self.state.lock().hanging.contains(method);
        if hanging {
            std::future::pending::<()>().await;
        }
        self.respond(method, &params)
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.listeners.subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// Poll `check` until it holds, failing the test after one second.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
