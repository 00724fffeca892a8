//! Reconciliation engine: derives contract, user, whitelist and ownership
//! state from contract reads and event history.
//!
//! Every read path absorbs its own failures. A failed read resets the
//! derived value to its defaults and logs; nothing is raised to callers.

pub mod index;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    chain::MintContract,
    config::ClientConfig,
    error::WalletError,
    provider::{ProviderGateway, ProviderHandle},
    session::SessionMachine,
    types::Address,
};

pub use index::{fold_holders, fold_whitelist, Holdings};

/// Token whose URI and royalty are sampled for the snapshot.
const SAMPLE_TOKEN_ID: u128 = 1;
/// Sale price for `royaltyInfo`; the royalty amount is then in basis points.
const ROYALTY_SALE_PRICE: u128 = 10_000;

/// Contract configuration, always taken from a single read batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSnapshot {
    pub total_supply: u64,
    pub max_mints_per_user: u64,
    pub owner_address: Option<Address>,
    #[serde(rename = "baseURI")]
    pub base_uri: Option<String>,
    pub royalty_bps: u64,
}

/// Per-account state for the connected address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub is_whitelisted: bool,
    pub user_mint_count: u64,
}

#[derive(Default)]
struct UserEntry {
    /// Address the context was fetched for.
    address: Option<Address>,
    context: UserContext,
}

#[derive(Default)]
struct ScanCache {
    has_scanned: bool,
    /// Bumped by every invalidation; scans started under an older
    /// generation do not populate the cache.
    generation: u64,
    whitelist: Vec<Address>,
    holders: Holdings,
}

pub struct Reconciler {
    gateway: ProviderGateway,
    config: ClientConfig,
    session: Arc<SessionMachine>,
    snapshot: Mutex<ContractSnapshot>,
    in_flight: AtomicUsize,
    user: Mutex<UserEntry>,
    scan: Mutex<ScanCache>,
}

impl Reconciler {
    pub fn new(gateway: ProviderGateway, config: ClientConfig, session: Arc<SessionMachine>) -> Self {
        Self {
            gateway,
            config,
            session,
            snapshot: Mutex::new(ContractSnapshot::default()),
            in_flight: AtomicUsize::new(0),
            user: Mutex::new(UserEntry::default()),
            scan: Mutex::new(ScanCache::default()),
        }
    }

    fn read_contract(&self) -> Result<MintContract<ProviderHandle>, WalletError> {
        Ok(MintContract::bind(
            self.gateway.read_handle()?,
            self.config.contract_address,
        ))
    }

    pub fn snapshot(&self) -> ContractSnapshot {
        self.snapshot.lock().clone()
    }

    /// True while at least one snapshot fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Read the contract configuration batch and replace the snapshot with
    /// it, or with defaults if any member of the batch failed.
    pub async fn fetch_contract_snapshot(&self) -> ContractSnapshot {
        let _loading = InFlight::enter(&self.in_flight);
        let snapshot = match self.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch contract data");
                ContractSnapshot::default()
            }
        };
        *self.snapshot.lock() = snapshot.clone();
        snapshot
    }

    async fn read_snapshot(&self) -> Result<ContractSnapshot, WalletError> {
        let contract = self.read_contract()?;
        let (max_mints, owner, token_uri, (_, royalty)) = tokio::try_join!(
            contract.max_mints_per_user(),
            contract.owner(),
            contract.uri(SAMPLE_TOKEN_ID),
            contract.royalty_info(SAMPLE_TOKEN_ID, ROYALTY_SALE_PRICE),
        )?;

        let royalty_bps = u64::try_from(royalty)
            .map_err(|_| WalletError::MalformedResponse(format!("royalty {royalty} out of range")))?;

        Ok(ContractSnapshot {
            total_supply: self.config.max_supply,
            max_mints_per_user: max_mints,
            owner_address: Some(owner),
            base_uri: base_uri_of(&token_uri),
            royalty_bps,
        })
    }

    /// UserContext for the currently connected address; defaults if it was
    /// fetched for a different address or never fetched.
    pub fn user_context(&self) -> UserContext {
        let current = self.session.address();
        let entry = self.user.lock();
        if current.is_some() && entry.address == current {
            entry.context.clone()
        } else {
            UserContext::default()
        }
    }

    /// Refresh whitelist status and mint count for the connected address.
    /// No-op when disconnected.
    pub async fn fetch_user_context(&self) -> UserContext {
        let Some(address) = self.session.address() else {
            return self.user_context();
        };

        let context = match self.read_user(address).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "failed to fetch user data");
                UserContext::default()
            }
        };
        *self.user.lock() = UserEntry {
            address: Some(address),
            context: context.clone(),
        };
        context
    }

    async fn read_user(&self, address: Address) -> Result<UserContext, WalletError> {
        let contract = self.read_contract()?;
        let (is_whitelisted, user_mint_count) =
            tokio::try_join!(contract.whitelist(address), contract.user_mint_count(address))?;
        Ok(UserContext {
            is_whitelisted,
            user_mint_count,
        })
    }

    /// Current whitelist members by event replay; empty on failure.
    pub async fn scan_whitelist(&self) -> Vec<Address> {
        match self.read_contract() {
            Ok(contract) => self.scan_whitelist_with(&contract).await,
            Err(e) => {
                tracing::error!(error = %e, "whitelist scan failed");
                Vec::new()
            }
        }
    }

    async fn scan_whitelist_with(&self, contract: &MintContract<ProviderHandle>) -> Vec<Address> {
        match contract.whitelist_updates().await {
            Ok(updates) => {
                let members = fold_whitelist(&updates);
                tracing::info!(events = updates.len(), members = members.len(), "whitelist scanned");
                members
            }
            Err(e) => {
                tracing::error!(error = %e, "whitelist scan failed");
                Vec::new()
            }
        }
    }

    /// Owner -> minted token ids by event replay; empty on failure.
    pub async fn scan_holders(&self) -> Holdings {
        match self.read_contract() {
            Ok(contract) => self.scan_holders_with(&contract).await,
            Err(e) => {
                tracing::error!(error = %e, "holder scan failed");
                Holdings::new()
            }
        }
    }

    async fn scan_holders_with(&self, contract: &MintContract<ProviderHandle>) -> Holdings {
        match tokio::try_join!(contract.transfer_singles(), contract.transfer_batches()) {
            Ok((singles, batches)) => {
                let holdings = fold_holders(&singles, &batches);
                tracing::info!(
                    singles = singles.len(),
                    batches = batches.len(),
                    holders = holdings.len(),
                    "holders scanned"
                );
                holdings
            }
            Err(e) => {
                tracing::error!(error = %e, "holder scan failed");
                Holdings::new()
            }
        }
    }

    /// Run both scans unless a previous run is still valid. Returns whether
    /// the scans ran.
    pub async fn refresh_all(&self) -> bool {
        let generation = {
            let cache = self.scan.lock();
            if cache.has_scanned {
                tracing::debug!("scan cache hit");
                return false;
            }
            cache.generation
        };

        let contract = match self.read_contract() {
            Ok(contract) => contract,
            Err(e) => {
                tracing::error!(error = %e, "chain data refresh failed");
                return false;
            }
        };

        let (whitelist, holders) = tokio::join!(
            self.scan_whitelist_with(&contract),
            self.scan_holders_with(&contract)
        );

        let mut cache = self.scan.lock();
        if cache.generation != generation {
            tracing::debug!("cache invalidated during scan; discarding results");
            return true;
        }
        cache.whitelist = whitelist;
        cache.holders = holders;
        cache.has_scanned = true;
        true
    }

    /// Drop cached scan results so the next access re-derives them.
    pub fn invalidate_cache(&self) {
        let mut cache = self.scan.lock();
        cache.has_scanned = false;
        cache.generation += 1;
        cache.whitelist.clear();
        cache.holders.clear();
        tracing::debug!("scan cache invalidated");
    }

    pub fn has_scanned(&self) -> bool {
        self.scan.lock().has_scanned
    }

    pub fn whitelist(&self) -> Vec<Address> {
        self.scan.lock().whitelist.clone()
    }

    pub fn holders(&self) -> Holdings {
        self.scan.lock().holders.clone()
    }

    /// Whether the connected address is the contract owner. Fetches the
    /// snapshot first when the owner is not yet known.
    pub async fn is_contract_owner(&self) -> bool {
        let Some(address) = self.session.address() else {
            return false;
        };
        let owner = match self.snapshot().owner_address {
            Some(owner) => Some(owner),
            None => self.fetch_contract_snapshot().await.owner_address,
        };
        owner == Some(address)
    }
}

/// Counts an in-flight snapshot fetch for as long as it is alive, including
/// when the fetch future is dropped early.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Base URI of a token URI: everything up to and including the last `/`.
fn base_uri_of(token_uri: &str) -> Option<String> {
    token_uri
        .rfind('/')
        .map(|idx| token_uri[..=idx].to_string())
}
