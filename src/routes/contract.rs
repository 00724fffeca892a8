use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    mutation::MintState,
    reconcile::{ContractSnapshot, UserContext},
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContractResponse {
    is_loading: bool,
    #[serde(flatten)]
    snapshot: ContractSnapshot,
}

/// `GET /api/contract`: last contract snapshot.
async fn get_contract(State(state): State<Arc<AppState>>) -> Json<ContractResponse> {
    Json(ContractResponse {
        is_loading: state.reconciler.is_loading(),
        snapshot: state.reconciler.snapshot(),
    })
}

/// `POST /api/contract/refresh`: re-read the contract configuration.
async fn refresh_contract(State(state): State<Arc<AppState>>) -> Json<ContractResponse> {
    let snapshot = state.reconciler.fetch_contract_snapshot().await;
    Json(ContractResponse {
        is_loading: state.reconciler.is_loading(),
        snapshot,
    })
}

/// `GET /api/user`: whitelist status and mint count of the connected account.
async fn get_user(State(state): State<Arc<AppState>>) -> Json<UserContext> {
    Json(state.reconciler.user_context())
}

/// `POST /api/user/refresh`
async fn refresh_user(State(state): State<Arc<AppState>>) -> Json<UserContext> {
    Json(state.reconciler.fetch_user_context().await)
}

/// `GET /api/mint`: progress of the current or last mint.
async fn get_mint(State(state): State<Arc<AppState>>) -> Json<MintState> {
    Json(state.mutations.mint_state())
}

/// `POST /api/mint`: mint and wait for confirmation.
async fn mint(State(state): State<Arc<AppState>>) -> Json<MintState> {
    Json(state.mutations.mint().await)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/contract", get(get_contract))
        .route("/contract/refresh", post(refresh_contract))
        .route("/user", get(get_user))
        .route("/user/refresh", post(refresh_user))
        .route("/mint", get(get_mint).post(mint))
}
