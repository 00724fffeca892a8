use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    session::{SessionState, WalletSession},
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    state: SessionState,
    short_address: String,
    #[serde(flatten)]
    session: WalletSession,
}

impl From<WalletSession> for SessionResponse {
    fn from(session: WalletSession) -> Self {
        Self {
            state: session.state(),
            short_address: session.short_address(),
            session,
        }
    }
}

/// `GET /api/session`: current wallet session.
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(state.session.current().into())
}

/// `POST /api/session/connect`: request accounts and connect.
async fn connect(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.session.connect().await;
    Json(state.session.current().into())
}

/// `POST /api/session/disconnect`
async fn disconnect(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.session.disconnect();
    Json(state.session.current().into())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
}
