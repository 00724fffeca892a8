//! Owner-only routes. Every request passes the owner guard first.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::WalletError,
    mutation::{AdminAction, WhitelistEntry},
    state::AppState,
    types::{Address, TxHash},
};

/// Refuse the request unless the connected account owns the contract.
async fn require_owner(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    if !state.session.current().is_connected() {
        return Err((StatusCode::UNAUTHORIZED, "wallet not connected".to_string()));
    }
    if !state.is_owner().await {
        return Err((
            StatusCode::FORBIDDEN,
            "connected account is not the contract owner".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

/// `GET /api/admin/whitelist`: current whitelist members.
async fn get_whitelist(State(state): State<Arc<AppState>>) -> Json<Vec<Address>> {
    state.reconciler.refresh_all().await;
    Json(state.reconciler.whitelist())
}

/// `GET /api/admin/holders`: minted token ids grouped by owner.
async fn get_holders(State(state): State<Arc<AppState>>) -> Json<BTreeMap<Address, Vec<u128>>> {
    state.reconciler.refresh_all().await;
    Json(state.reconciler.holders())
}

#[derive(Debug, Deserialize)]
struct WhitelistRequest {
    entries: Vec<WhitelistEntry>,
}

#[derive(Debug, Deserialize)]
struct MaxMintsRequest {
    limit: u64,
}

#[derive(Debug, Deserialize)]
struct BaseUriRequest {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoyaltyRequest {
    royalty_bps: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminResponse {
    action: &'static str,
    tx_hash: TxHash,
}

async fn run(
    state: &AppState,
    action: AdminAction,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    let name = action.name();
    state
        .mutations
        .run_admin_action(action)
        .await
        .map(|tx_hash| Json(AdminResponse { action: name, tx_hash }))
        .map_err(|e| (status_for(&e), e.user_message()))
}

fn status_for(error: &WalletError) -> StatusCode {
    match error {
        WalletError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        WalletError::UserRejected(_) => StatusCode::CONFLICT,
        WalletError::ProviderUnavailable | WalletError::SignerUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// `POST /api/admin/whitelist`: add/remove one address or batch-update many.
async fn update_whitelist(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WhitelistRequest>,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    run(&state, AdminAction::SetWhitelist(req.entries)).await
}

/// `POST /api/admin/max-mints`
async fn set_max_mints(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MaxMintsRequest>,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    run(&state, AdminAction::SetMaxMints(req.limit)).await
}

/// `POST /api/admin/base-uri`
async fn set_base_uri(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BaseUriRequest>,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    run(&state, AdminAction::SetBaseUri(req.uri)).await
}

/// `POST /api/admin/royalty`
async fn set_royalty(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoyaltyRequest>,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    run(&state, AdminAction::SetRoyalty(req.royalty_bps)).await
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/whitelist", get(get_whitelist).post(update_whitelist))
        .route("/holders", get(get_holders))
        .route("/max-mints", post(set_max_mints))
        .route("/base-uri", post(set_base_uri))
        .route("/royalty", post(set_royalty))
        .route_layer(middleware::from_fn_with_state(state, require_owner))
}
