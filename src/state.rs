use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::ClientConfig,
    events::AppEvents,
    mutation::MutationOrchestrator,
    provider::{ProviderGateway, WalletProvider},
    reconcile::Reconciler,
    session::SessionMachine,
};

/// Shared application state: one instance per process, created at startup
/// and injected into every consumer.
pub struct AppState {
    pub config: ClientConfig,
    /// Broadcast channel for notices and state-change events (WebSocket).
    pub events: AppEvents,
    pub session: Arc<SessionMachine>,
    pub reconciler: Arc<Reconciler>,
    pub mutations: Arc<MutationOrchestrator>,
}

impl AppState {
    /// Wire all components around the (optional) injected wallet provider.
    pub fn new(config: ClientConfig, provider: Option<Arc<dyn WalletProvider>>) -> Arc<Self> {
        let gateway = ProviderGateway::new(provider);
        let events = AppEvents::new();

        let session = SessionMachine::new(gateway.clone(), config.network.clone(), events.clone());
        let reconciler = Arc::new(Reconciler::new(
            gateway.clone(),
            config.clone(),
            session.clone(),
        ));
        let mutations = Arc::new(MutationOrchestrator::new(
            gateway,
            config.clone(),
            session.clone(),
            reconciler.clone(),
            events.clone(),
        ));

        Arc::new(Self {
            config,
            events,
            session,
            reconciler,
            mutations,
        })
    }

    /// Whether the connected address owns the contract. Gate for admin routes.
    pub async fn is_owner(&self) -> bool {
        self.reconciler.is_contract_owner().await
    }

    /// Forward session changes to event listeners and re-fetch the user
    /// context whenever the connected address changes.
    pub fn spawn_session_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let state = self.clone();
        let mut rx = self.session.watch();
        tokio::spawn(async move {
            let mut last_address = rx.borrow().address;
            while rx.changed().await.is_ok() {
                let session = rx.borrow_and_update().clone();
                state.events.emit(
                    "session:changed",
                    serde_json::json!({
                        "address": session.address,
                        "chainId": session.chain_id,
                        "connecting": session.connecting,
                        "state": session.state(),
                    }),
                );

                if session.address != last_address {
                    last_address = session.address;
                    if let Some(address) = session.address {
                        tracing::debug!(address = %address, "address changed; refreshing user context");
                        state.reconciler.fetch_user_context().await;
                    }
                }
            }
        })
    }
}
