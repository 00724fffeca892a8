//! Wallet session state machine.
//!
//! Owns the connection lifecycle (`Disconnected -> Connecting -> Connected`),
//! tracks the active account and chain, keeps exactly one pair of provider
//! listeners while connected, and asks the wallet to move to the desired
//! network when it is elsewhere.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;

use crate::{
    config::DesiredNetwork,
    error::WalletError,
    events::AppEvents,
    provider::{EventKind, ProviderEvent, ProviderGateway, ProviderHandle, SubscriptionId},
    types::{parse_hex_u64, Address, ChainId},
};

pub const NOTICE_NO_WALLET: &str = "Please install a wallet like MetaMask.";
const NOTICE_CONNECT_FAILED: &str = "Failed to connect wallet.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Observable session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
    pub connecting: bool,
}

impl WalletSession {
    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.connecting {
            SessionState::Connecting
        } else if self.address.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// `0x1234...abcd`, or empty when disconnected.
    pub fn short_address(&self) -> String {
        self.address.map(|a| a.short()).unwrap_or_default()
    }
}

/// Result of one network-switch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The chain was unknown and an add request was accepted instead.
    Added,
}

/// The listener pair registered on a successful connection.
struct Listeners {
    handle: ProviderHandle,
    accounts: SubscriptionId,
    chain: SubscriptionId,
}

pub struct SessionMachine {
    gateway: ProviderGateway,
    network: DesiredNetwork,
    events: AppEvents,
    state: watch::Sender<WalletSession>,
    listeners: Mutex<Option<Listeners>>,
}

impl SessionMachine {
    pub fn new(gateway: ProviderGateway, network: DesiredNetwork, events: AppEvents) -> Arc<Self> {
        let (state, _) = watch::channel(WalletSession::default());
        Arc::new(Self {
            gateway,
            network,
            events,
            state,
            listeners: Mutex::new(None),
        })
    }

    pub fn current(&self) -> WalletSession {
        self.state.borrow().clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.state.borrow().address
    }

    /// Receiver notified on every session change.
    pub fn watch(&self) -> watch::Receiver<WalletSession> {
        self.state.subscribe()
    }

    pub fn desired_network(&self) -> &DesiredNetwork {
        &self.network
    }

    pub fn is_provider_available(&self) -> bool {
        self.gateway.is_available()
    }

    /// Request account access and establish the session.
    ///
    /// A no-op while another connect is in flight. Failures reset the
    /// session and surface a notice; they are never returned.
    pub async fn connect(self: &Arc<Self>) -> SessionState {
        let connecting = self.state.borrow().connecting;
        if connecting {
            tracing::debug!("connect already in progress");
            return SessionState::Connecting;
        }
        if !self.gateway.is_available() {
            self.events.notice(NOTICE_NO_WALLET);
            return self.current().state();
        }

        let Some(mut attempt) = ConnectAttempt::acquire(self) else {
            return SessionState::Connecting;
        };

        match self.establish().await {
            Ok(Some(address)) => {
                tracing::info!(address = %address, "wallet connected");
                attempt.settled = true;
            }
            Ok(None) => {
                tracing::warn!("wallet returned no accounts");
                self.events.notice(NOTICE_CONNECT_FAILED);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to connect wallet");
                self.events.notice(NOTICE_CONNECT_FAILED);
            }
        }

        drop(attempt);
        self.current().state()
    }

    async fn establish(self: &Arc<Self>) -> Result<Option<Address>, WalletError> {
        let handle = self.gateway.read_handle()?;
        let accounts = handle.request_accounts().await?;
        let Some(address) = accounts.first().copied() else {
            return Ok(None);
        };
        self.state.send_modify(|s| s.address = Some(address));

        let chain_id = handle.chain_id().await?;
        self.state.send_modify(|s| s.chain_id = Some(chain_id));

        self.register_listeners(&handle);
        if chain_id != self.network.chain_id {
            self.spawn_network_switch(handle, chain_id);
        }
        Ok(Some(address))
    }

    /// Reset the session and drop the listeners registered at connect time.
    /// Safe to call when not connected.
    pub fn disconnect(&self) {
        self.teardown();
        tracing::info!("wallet disconnected");
    }

    fn teardown(&self) {
        self.state.send_modify(|s| *s = WalletSession::default());
        let listeners = self.listeners.lock().take();
        if let Some(l) = listeners {
            l.handle.unsubscribe(l.accounts);
            l.handle.unsubscribe(l.chain);
        }
    }

    fn register_listeners(self: &Arc<Self>, handle: &ProviderHandle) {
        let mut listeners = self.listeners.lock();
        if listeners.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let accounts = handle.subscribe(
            EventKind::AccountsChanged,
            Arc::new(move |event| {
                if let (Some(session), ProviderEvent::AccountsChanged(accounts)) = (weak.upgrade(), event) {
                    session.on_accounts_changed(accounts);
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(self);
        let chain = handle.subscribe(
            EventKind::ChainChanged,
            Arc::new(move |event| {
                if let (Some(session), ProviderEvent::ChainChanged(hex)) = (weak.upgrade(), event) {
                    session.on_chain_changed(hex);
                }
            }),
        );

        *listeners = Some(Listeners {
            handle: handle.clone(),
            accounts,
            chain,
        });
    }

    fn on_accounts_changed(&self, accounts: &[String]) {
        if !self.current().is_connected() {
            return;
        }
        let Some(first) = accounts.first() else {
            tracing::info!("wallet reported no accounts");
            self.disconnect();
            return;
        };
        match first.parse::<Address>() {
            Ok(address) => {
                tracing::info!(address = %address, "account changed");
                self.state.send_modify(|s| s.address = Some(address));
            }
            Err(e) => tracing::warn!(account = %first, error = %e, "ignoring malformed account"),
        }
    }

    fn on_chain_changed(&self, chain_hex: &str) {
        if !self.current().is_connected() {
            return;
        }
        let chain_id = match parse_hex_u64(chain_hex) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(chain = %chain_hex, error = %e, "ignoring malformed chain id");
                return;
            }
        };
        tracing::info!(chain_id, "chain changed");
        self.state.send_modify(|s| s.chain_id = Some(chain_id));
        if chain_id != self.network.chain_id {
            match self.gateway.read_handle() {
                Ok(handle) => self.spawn_network_switch(handle, chain_id),
                Err(e) => tracing::warn!(error = %e, "cannot request network switch"),
            }
        }
    }

    /// Ask the wallet to move to the desired network in the background.
    /// The outcome is only logged; session fields are left to provider events.
    fn spawn_network_switch(&self, handle: ProviderHandle, current: ChainId) {
        let network = self.network.clone();
        let mismatch = WalletError::ChainMismatch {
            expected: network.chain_id,
            actual: current,
        };
        tracing::warn!(error = %mismatch, "requesting network switch");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; skipping network switch");
            return;
        };
        runtime.spawn(async move {
            match switch_network(&handle, &network).await {
                Ok(outcome) => tracing::info!(chain_id = network.chain_id, ?outcome, "network switch requested"),
                Err(e) => tracing::warn!(chain_id = network.chain_id, error = %e, "network switch failed"),
            }
        });
    }
}

/// Marks the session as connecting for the lifetime of one connect attempt.
/// An attempt that is dropped without settling (failed, no accounts, or
/// cancelled mid-flight) resets the session.
struct ConnectAttempt<'a> {
    session: &'a SessionMachine,
    settled: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn acquire(session: &'a SessionMachine) -> Option<Self> {
        let mut acquired = false;
        session.state.send_if_modified(|s| {
            if s.connecting {
                return false;
            }
            s.connecting = true;
            acquired = true;
            true
        });
        acquired.then_some(Self {
            session,
            settled: false,
        })
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.teardown();
        }
        self.session.state.send_modify(|s| s.connecting = false);
    }
}

/// Request a switch to `network`; when the wallet does not know the chain,
/// request that it be added instead. The switch is not retried afterwards.
pub async fn switch_network(
    handle: &ProviderHandle,
    network: &DesiredNetwork,
) -> Result<SwitchOutcome, WalletError> {
    let switch = handle
        .raw_request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": network.chain_id_hex() }]),
        )
        .await;

    match switch {
        Ok(_) => Ok(SwitchOutcome::Switched),
        Err(e) if e.is_unrecognized_chain() => {
            tracing::info!(chain = %network.display_name, "chain unknown to wallet; requesting add");
            handle
                .request("wallet_addEthereumChain", json!([network.add_chain_params()]))
                .await?;
            Ok(SwitchOutcome::Added)
        }
        Err(e) => Err(WalletError::rpc("wallet_switchEthereumChain", e)),
    }
}
