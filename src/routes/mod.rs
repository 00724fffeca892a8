mod admin;
mod contract;
mod health;
mod session;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the `/api` sub-router with all API routes.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(session::router())
        .merge(contract::router())
        .nest("/admin", admin::router(state.clone()))
        .with_state(state)
}

/// Full application router: `/api/*` plus the `/ws` event stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_router(state.clone()))
        .merge(ws::router().with_state(state))
        // CORS for local development
        .layer(CorsLayer::very_permissive())
}
