//! Error taxonomy for wallet, RPC and transaction failures.

use serde_json::Value;

use crate::{
    chain::abi,
    types::{parse_hex_bytes, ChainId, TxHash},
};

/// EIP-1193: the user rejected the request.
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-3326: the requested chain has not been added to the wallet.
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

/// Fallback text when no revert reason can be recovered.
pub const GENERIC_FAILURE: &str = "An unknown error occurred.";

/// Error reported by a wallet provider or JSON-RPC endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("RPC error ({code}): {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("method not supported by provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ProviderError::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(CODE_USER_REJECTED)
    }

    /// Whether the provider does not know the chain it was asked to switch to.
    ///
    /// Some wallets wrap the code as `data.originalError.code`.
    pub fn is_unrecognized_chain(&self) -> bool {
        match self {
            ProviderError::Rpc { code, data, .. } => {
                *code == CODE_UNRECOGNIZED_CHAIN
                    || data
                        .as_ref()
                        .and_then(|d| d.pointer("/originalError/code"))
                        .and_then(Value::as_i64)
                        == Some(CODE_UNRECOGNIZED_CHAIN)
            }
            _ => false,
        }
    }

    /// Contract-supplied revert reason, if the error carries one.
    pub fn revert_reason(&self) -> Option<String> {
        let ProviderError::Rpc { message, data, .. } = self else {
            return None;
        };

        let payload = data.as_ref().and_then(|d| match d {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("data").and_then(Value::as_str),
            _ => None,
        });
        if let Some(reason) = payload
            .and_then(|hex| parse_hex_bytes(hex).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes))
        {
            return Some(reason);
        }

        message
            .strip_prefix("execution reverted: ")
            .map(str::to_string)
            .filter(|r| !r.is_empty())
    }
}

/// Failures surfaced by the session, reconciliation and mutation layers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    #[error("no wallet provider detected")]
    ProviderUnavailable,
    #[error("request rejected by user: {0}")]
    UserRejected(String),
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error("wallet is on chain {actual}, expected {expected}")]
    ChainMismatch { expected: ChainId, actual: ChainId },
    #[error("{method} failed: {source}")]
    RpcFailure {
        method: String,
        #[source]
        source: ProviderError,
    },
    #[error("transaction submission failed: {source}")]
    SubmissionFailure {
        #[source]
        source: ProviderError,
    },
    #[error("transaction {tx_hash} failed: {reason}")]
    ConfirmationFailure { tx_hash: TxHash, reason: String },
    #[error("wallet not connected")]
    NotConnected,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl WalletError {
    pub fn rpc(method: &str, source: ProviderError) -> Self {
        if source.is_user_rejection() {
            return WalletError::UserRejected(source.to_string());
        }
        WalletError::RpcFailure {
            method: method.to_string(),
            source,
        }
    }

    /// Human-readable reason shown to the user: the contract's revert
    /// reason when one is available, otherwise a generic message.
    pub fn user_message(&self) -> String {
        let reason = match self {
            WalletError::SubmissionFailure { source } | WalletError::RpcFailure { source, .. } => {
                source.revert_reason()
            }
            WalletError::ConfirmationFailure { reason, .. } => Some(reason.clone()),
            WalletError::UserRejected(_) => Some("Request rejected in wallet.".to_string()),
            WalletError::NotConnected => Some("Please connect your wallet first.".to_string()),
            WalletError::InvalidArgument(msg) => Some(msg.clone()),
            _ => None,
        };
        reason.unwrap_or_else(|| GENERIC_FAILURE.to_string())
    }
}
