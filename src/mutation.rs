//! Mutation orchestrator: sequences signed writes (mint and owner-only
//! admin actions), tracks the in-flight mint, and refreshes derived state
//! once a write is confirmed.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{MintContract, PendingTransaction},
    config::ClientConfig,
    error::WalletError,
    events::AppEvents,
    provider::{ProviderGateway, SigningHandle},
    reconcile::Reconciler,
    session::SessionMachine,
    types::{Address, TxHash},
};

const NOTICE_CONNECT_FIRST: &str = "Please connect your wallet first.";
const EMPTY_WHITELIST_UPDATE: &str = "whitelist update needs at least one address";

/// Progress of the current (or last) mint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintState {
    pub in_progress: bool,
    /// Set as soon as the wallet returns a hash, before confirmation.
    pub tx_hash: Option<TxHash>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub address: Address,
    pub added: bool,
}

/// Owner-only contract updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// One entry is sent as add/remove; several as a batch update.
    SetWhitelist(Vec<WhitelistEntry>),
    SetMaxMints(u64),
    SetBaseUri(String),
    /// Royalty in basis points.
    SetRoyalty(u64),
}

impl AdminAction {
    pub fn name(&self) -> &'static str {
        match self {
            AdminAction::SetWhitelist(entries) if entries.len() == 1 => {
                if entries[0].added {
                    "addToWhitelist"
                } else {
                    "removeFromWhitelist"
                }
            }
            AdminAction::SetWhitelist(_) => "batchUpdateWhitelist",
            AdminAction::SetMaxMints(_) => "setMaxMintsPerUser",
            AdminAction::SetBaseUri(_) => "setBaseURI",
            AdminAction::SetRoyalty(_) => "setRoyalty",
        }
    }

    fn validate(&self) -> Result<(), WalletError> {
        match self {
            AdminAction::SetWhitelist(entries) if entries.is_empty() => {
                Err(WalletError::InvalidArgument(EMPTY_WHITELIST_UPDATE.into()))
            }
            _ => Ok(()),
        }
    }

    async fn submit(
        &self,
        contract: &MintContract<SigningHandle>,
    ) -> Result<PendingTransaction, WalletError> {
        match self {
            AdminAction::SetWhitelist(entries) => match entries.as_slice() {
                [] => Err(WalletError::InvalidArgument(EMPTY_WHITELIST_UPDATE.into())),
                [entry] if entry.added => contract.add_to_whitelist(entry.address).await,
                [entry] => contract.remove_from_whitelist(entry.address).await,
                many => {
                    let (users, statuses): (Vec<Address>, Vec<bool>) =
                        many.iter().map(|e| (e.address, e.added)).unzip();
                    contract.batch_update_whitelist(&users, &statuses).await
                }
            },
            AdminAction::SetMaxMints(limit) => contract.set_max_mints_per_user(*limit).await,
            AdminAction::SetBaseUri(uri) => contract.set_base_uri(uri).await,
            AdminAction::SetRoyalty(bps) => contract.set_royalty(*bps).await,
        }
    }
}

pub struct MutationOrchestrator {
    gateway: ProviderGateway,
    config: ClientConfig,
    session: Arc<SessionMachine>,
    reconciler: Arc<Reconciler>,
    events: AppEvents,
    mint: Mutex<MintState>,
}

impl MutationOrchestrator {
    pub fn new(
        gateway: ProviderGateway,
        config: ClientConfig,
        session: Arc<SessionMachine>,
        reconciler: Arc<Reconciler>,
        events: AppEvents,
    ) -> Self {
        Self {
            gateway,
            config,
            session,
            reconciler,
            events,
            mint: Mutex::new(MintState::default()),
        }
    }

    pub fn mint_state(&self) -> MintState {
        self.mint.lock().clone()
    }

    async fn signing_contract(&self) -> Result<MintContract<SigningHandle>, WalletError> {
        let signer = self.gateway.signing_handle().await?;
        Ok(MintContract::bind(signer, self.config.contract_address)
            .with_poll_interval(self.config.receipt_poll_interval))
    }

    /// Mint for the connected account. Returns the resulting state; a call
    /// made while another mint is in progress changes nothing.
    pub async fn mint(&self) -> MintState {
        if !self.session.current().is_connected() {
            self.events.notice(NOTICE_CONNECT_FIRST);
            return self.mint_state();
        }

        let Some(in_progress) = MintInProgress::acquire(&self.mint) else {
            tracing::debug!("mint already in progress");
            return self.mint_state();
        };

        if let Err(e) = self.submit_mint().await {
            tracing::error!(error = %e, "minting failed");
            let reason = e.user_message();
            self.events
                .emit("mint:failed", serde_json::json!({ "error": reason }));
            self.mint.lock().error = Some(reason);
        }

        drop(in_progress);
        self.mint_state()
    }

    async fn submit_mint(&self) -> Result<(), WalletError> {
        let contract = self.signing_contract().await?;
        tracing::info!(account = %contract.signer(), "sending mint transaction");
        let pending = contract.mint().await?;

        let hash = pending.hash();
        self.mint.lock().tx_hash = Some(hash);
        self.events
            .emit("mint:submitted", serde_json::json!({ "txHash": hash }));

        pending.confirm().await?;
        self.events
            .emit("mint:confirmed", serde_json::json!({ "txHash": hash }));

        self.reconciler.fetch_user_context().await;
        Ok(())
    }

    /// Send an admin action, wait for it to be mined, then refresh the
    /// contract snapshot and invalidate the scan cache.
    pub async fn run_admin_action(&self, action: AdminAction) -> Result<TxHash, WalletError> {
        let name = action.name();
        match self.execute_admin_action(&action).await {
            Ok(hash) => {
                tracing::info!(action = name, tx_hash = %hash, "admin action confirmed");
                self.events.emit(
                    "admin:confirmed",
                    serde_json::json!({ "action": name, "txHash": hash }),
                );
                Ok(hash)
            }
            Err(e) => {
                tracing::error!(action = name, error = %e, "admin action failed");
                self.events.emit(
                    "admin:failed",
                    serde_json::json!({ "action": name, "error": e.user_message() }),
                );
                Err(e)
            }
        }
    }

    async fn execute_admin_action(&self, action: &AdminAction) -> Result<TxHash, WalletError> {
        action.validate()?;
        let contract = self.signing_contract().await?;
        let pending = action.submit(&contract).await?;
        let hash = pending.hash();
        pending.confirm().await?;

        self.reconciler.fetch_contract_snapshot().await;
        self.reconciler.invalidate_cache();
        Ok(hash)
    }

    /// Whitelist update from parallel address/status lists.
    pub async fn update_whitelist(
        &self,
        addresses: &[Address],
        statuses: &[bool],
    ) -> Result<TxHash, WalletError> {
        if addresses.len() != statuses.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} addresses but {} statuses",
                addresses.len(),
                statuses.len()
            )));
        }
        let entries = addresses
            .iter()
            .zip(statuses)
            .map(|(address, added)| WhitelistEntry {
                address: *address,
                added: *added,
            })
            .collect();
        self.run_admin_action(AdminAction::SetWhitelist(entries)).await
    }

    pub async fn set_max_mints(&self, limit: u64) -> Result<TxHash, WalletError> {
        self.run_admin_action(AdminAction::SetMaxMints(limit)).await
    }

    pub async fn set_base_uri(&self, uri: &str) -> Result<TxHash, WalletError> {
        self.run_admin_action(AdminAction::SetBaseUri(uri.to_string()))
            .await
    }

    pub async fn set_royalty(&self, royalty_bps: u64) -> Result<TxHash, WalletError> {
        self.run_admin_action(AdminAction::SetRoyalty(royalty_bps))
            .await
    }
}

/// Holds `MintState::in_progress` for the lifetime of one mint attempt,
/// including when the attempt's future is dropped before completing.
struct MintInProgress<'a>(&'a Mutex<MintState>);

impl<'a> MintInProgress<'a> {
    /// Start an attempt with a fresh state, or `None` if one is running.
    fn acquire(mint: &'a Mutex<MintState>) -> Option<Self> {
        let mut state = mint.lock();
        if state.in_progress {
            return None;
        }
        *state = MintState {
            in_progress: true,
            tx_hash: None,
            error: None,
        };
        Some(Self(mint))
    }
}

impl Drop for MintInProgress<'_> {
    fn drop(&mut self) {
        self.0.lock().in_progress = false;
    }
}
