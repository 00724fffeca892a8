//! Wallet session and chain-data reconciliation client for an ERC-1155
//! mint contract.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod mutation;
pub mod provider;
pub mod reconcile;
pub mod routes;
pub mod session;
pub mod state;
pub mod types;

pub use error::{ProviderError, WalletError};
pub use routes::build_router;
pub use state::AppState;
