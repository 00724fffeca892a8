pub mod abi;
pub mod contract;

use serde_json::Value;

use crate::{
    error::WalletError,
    types::{parse_hex_bytes, parse_hex_u64},
};

pub use contract::{ContractCaller, MintContract, PendingTransaction, TransferEvent, WhitelistUpdate};

/// A raw event log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// `u64::MAX` for pending logs, so they order last.
    pub block_number: u64,
    pub log_index: u64,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

impl Log {
    /// Position in the chain's total log order.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn from_json(value: &Value) -> Result<Self, WalletError> {
        let quantity = |key: &str| -> Result<u64, WalletError> {
            match value.get(key).and_then(Value::as_str) {
                Some(hex) => parse_hex_u64(hex),
                None => Ok(u64::MAX),
            }
        };

        let topics = value
            .get("topics")
            .and_then(Value::as_array)
            .ok_or_else(|| WalletError::MalformedResponse("log: missing topics".into()))?
            .iter()
            .map(|t| {
                let bytes = parse_hex_bytes(t.as_str().unwrap_or_default())?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| WalletError::MalformedResponse("log: topic is not 32 bytes".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data = parse_hex_bytes(value.get("data").and_then(Value::as_str).unwrap_or("0x"))?;

        Ok(Log {
            block_number: quantity("blockNumber")?,
            log_index: quantity("logIndex")?,
            topics,
            data,
        })
    }
}
