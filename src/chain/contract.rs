//! Typed facade over the mint contract.
//!
//! A contract bound to a [`ProviderHandle`] can read and query events; one
//! bound to a [`SigningHandle`] can additionally send transactions.

use std::time::Duration;

use super::{
    abi::{self, Token},
    Log,
};
use crate::{
    error::WalletError,
    provider::{ProviderHandle, Receipt, SigningHandle},
    types::{Address, TxHash},
};

pub const WHITELIST_UPDATED: &str = "WhitelistUpdated(address,bool)";
pub const TRANSFER_SINGLE: &str = "TransferSingle(address,address,address,uint256,uint256)";
pub const TRANSFER_BATCH: &str = "TransferBatch(address,address,address,uint256[],uint256[])";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Handles a contract can be bound to.
pub trait ContractCaller {
    fn provider(&self) -> &ProviderHandle;
}

impl ContractCaller for ProviderHandle {
    fn provider(&self) -> &ProviderHandle {
        self
    }
}

impl ContractCaller for SigningHandle {
    fn provider(&self) -> &ProviderHandle {
        SigningHandle::provider(self)
    }
}

/// One `WhitelistUpdated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistUpdate {
    pub user: Address,
    pub added: bool,
    pub position: (u64, u64),
}

/// A `TransferSingle` or `TransferBatch` log; single transfers carry one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub ids: Vec<u128>,
    pub position: (u64, u64),
}

impl TransferEvent {
    pub fn is_mint(&self) -> bool {
        self.from.is_zero()
    }
}

pub struct MintContract<H> {
    address: Address,
    handle: H,
    poll_interval: Duration,
}

impl<H: ContractCaller> MintContract<H> {
    /// Bind the contract schema at `address` to `handle`. Performs no I/O.
    pub fn bind(handle: H, address: Address) -> Self {
        Self {
            address,
            handle,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval between receipt polls for transactions sent through this binding.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>, WalletError> {
        let data = abi::encode_call(signature, args);
        self.handle.provider().call(self.address, &data).await
    }

    pub async fn max_mints_per_user(&self) -> Result<u64, WalletError> {
        let out = self.read("maxMintsPerUser()", &[]).await?;
        abi::decode_u64(&abi::word(&out, 0)?)
    }

    pub async fn owner(&self) -> Result<Address, WalletError> {
        let out = self.read("owner()", &[]).await?;
        Ok(abi::decode_address(&abi::word(&out, 0)?))
    }

    pub async fn uri(&self, token_id: u128) -> Result<String, WalletError> {
        let out = self.read("uri(uint256)", &[Token::Uint(token_id)]).await?;
        abi::decode_string(&out, 0)
    }

    /// ERC-2981 `(receiver, royaltyAmount)` for a sale of `sale_price`.
    pub async fn royalty_info(
        &self,
        token_id: u128,
        sale_price: u128,
    ) -> Result<(Address, u128), WalletError> {
        let out = self
            .read(
                "royaltyInfo(uint256,uint256)",
                &[Token::Uint(token_id), Token::Uint(sale_price)],
            )
            .await?;
        Ok((
            abi::decode_address(&abi::word(&out, 0)?),
            abi::decode_uint(&abi::word(&out, 1)?)?,
        ))
    }

    pub async fn whitelist(&self, user: Address) -> Result<bool, WalletError> {
        let out = self.read("whitelist(address)", &[Token::Address(user)]).await?;
        Ok(abi::decode_bool(&abi::word(&out, 0)?))
    }

    pub async fn user_mint_count(&self, user: Address) -> Result<u64, WalletError> {
        let out = self.read("userMintCount(address)", &[Token::Address(user)]).await?;
        abi::decode_u64(&abi::word(&out, 0)?)
    }

    async fn logs(&self, signature: &str) -> Result<Vec<Log>, WalletError> {
        self.handle
            .provider()
            .get_logs(self.address, abi::event_topic(signature))
            .await
    }

    /// Every `WhitelistUpdated` event over the full history, in log order.
    pub async fn whitelist_updates(&self) -> Result<Vec<WhitelistUpdate>, WalletError> {
        self.logs(WHITELIST_UPDATED)
            .await?
            .iter()
            .map(decode_whitelist_update)
            .collect()
    }

    /// Every `TransferSingle` event, in log order. Logs that cannot be
    /// decoded are skipped with a warning.
    pub async fn transfer_singles(&self) -> Result<Vec<TransferEvent>, WalletError> {
        let logs = self.logs(TRANSFER_SINGLE).await?;
        Ok(decode_transfers(&logs, decode_transfer_single))
    }

    pub async fn transfer_batches(&self) -> Result<Vec<TransferEvent>, WalletError> {
        let logs = self.logs(TRANSFER_BATCH).await?;
        Ok(decode_transfers(&logs, decode_transfer_batch))
    }
}

impl MintContract<SigningHandle> {
    pub fn signer(&self) -> Address {
        self.handle.from()
    }

    async fn send(&self, signature: &str, args: &[Token]) -> Result<PendingTransaction, WalletError> {
        let data = abi::encode_call(signature, args);
        let hash = self.handle.send_transaction(self.address, &data).await?;
        tracing::info!(method = signature, tx_hash = %hash, "transaction submitted");
        Ok(PendingTransaction {
            hash,
            provider: self.handle.provider().clone(),
            poll_interval: self.poll_interval,
        })
    }

    pub async fn mint(&self) -> Result<PendingTransaction, WalletError> {
        self.send("mint()", &[]).await
    }

    pub async fn add_to_whitelist(&self, user: Address) -> Result<PendingTransaction, WalletError> {
        self.send("addToWhitelist(address)", &[Token::Address(user)]).await
    }

    pub async fn remove_from_whitelist(&self, user: Address) -> Result<PendingTransaction, WalletError> {
        self.send("removeFromWhitelist(address)", &[Token::Address(user)])
            .await
    }

    pub async fn batch_update_whitelist(
        &self,
        users: &[Address],
        statuses: &[bool],
    ) -> Result<PendingTransaction, WalletError> {
        if users.len() != statuses.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} addresses but {} statuses",
                users.len(),
                statuses.len()
            )));
        }
        self.send(
            "batchUpdateWhitelist(address[],bool[])",
            &[
                Token::AddressArray(users.to_vec()),
                Token::BoolArray(statuses.to_vec()),
            ],
        )
        .await
    }

    pub async fn set_max_mints_per_user(&self, limit: u64) -> Result<PendingTransaction, WalletError> {
        self.send("setMaxMintsPerUser(uint256)", &[Token::Uint(u128::from(limit))])
            .await
    }

    pub async fn set_base_uri(&self, uri: &str) -> Result<PendingTransaction, WalletError> {
        self.send("setBaseURI(string)", &[Token::String(uri.to_string())])
            .await
    }

    pub async fn set_royalty(&self, royalty_bps: u64) -> Result<PendingTransaction, WalletError> {
        self.send("setRoyalty(uint256)", &[Token::Uint(u128::from(royalty_bps))])
            .await
    }
}

/// A submitted transaction whose hash is known but which may not be mined.
pub struct PendingTransaction {
    hash: TxHash,
    provider: ProviderHandle,
    poll_interval: Duration,
}

impl PendingTransaction {
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait until the transaction is mined. A reverted receipt is a
    /// [`WalletError::ConfirmationFailure`]. Failed receipt queries are
    /// retried; there is no timeout.
    pub async fn confirm(self) -> Result<Receipt, WalletError> {
        loop {
            match self.provider.transaction_receipt(self.hash).await {
                Ok(Some(receipt)) if !receipt.success => {
                    return Err(WalletError::ConfirmationFailure {
                        tx_hash: self.hash,
                        reason: "transaction reverted".to_string(),
                    });
                }
                Ok(Some(receipt)) => {
                    tracing::info!(tx_hash = %self.hash, block = ?receipt.block_number, "transaction confirmed");
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tx_hash = %self.hash, error = %e, "receipt query failed; retrying");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Log decoding
// ---------------------------------------------------------------------------

fn topic(log: &Log, index: usize) -> Result<&[u8; 32], WalletError> {
    log.topics.get(index).ok_or_else(|| {
        WalletError::MalformedResponse(format!("log has {} topics, need {}", log.topics.len(), index + 1))
    })
}

/// `user` is indexed on current deployments; older ones logged it in data.
fn decode_whitelist_update(log: &Log) -> Result<WhitelistUpdate, WalletError> {
    let (user, added) = if log.topics.len() >= 2 {
        (Address::from_word(topic(log, 1)?), abi::word(&log.data, 0)?)
    } else {
        (
            abi::decode_address(&abi::word(&log.data, 0)?),
            abi::word(&log.data, 1)?,
        )
    };
    Ok(WhitelistUpdate {
        user,
        added: abi::decode_bool(&added),
        position: log.position(),
    })
}

fn decode_transfers(
    logs: &[Log],
    decode: fn(&Log) -> Result<TransferEvent, WalletError>,
) -> Vec<TransferEvent> {
    logs.iter()
        .filter_map(|log| match decode(log) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(position = ?log.position(), error = %e, "skipping undecodable transfer log");
                None
            }
        })
        .collect()
}

fn decode_transfer_single(log: &Log) -> Result<TransferEvent, WalletError> {
    Ok(TransferEvent {
        from: Address::from_word(topic(log, 2)?),
        to: Address::from_word(topic(log, 3)?),
        ids: vec![abi::decode_uint(&abi::word(&log.data, 0)?)?],
        position: log.position(),
    })
}

fn decode_transfer_batch(log: &Log) -> Result<TransferEvent, WalletError> {
    Ok(TransferEvent {
        from: Address::from_word(topic(log, 2)?),
        to: Address::from_word(topic(log, 3)?),
        ids: abi::decode_uint_array(&log.data, 0)?,
        position: log.position(),
    })
}
