use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::rest::{ok, Envelope};
use crate::auth::Caller;
use crate::engine::accounts::{register_rider, RegisterRequest};
use crate::error::AppError;
use crate::models::account::Account;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(register))
        .route("/accounts/me", get(me))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<Account>>), AppError> {
    let account = register_rider(&state, payload)?;
    Ok((StatusCode::CREATED, ok("Account created", account)))
}

async fn me(caller: Caller) -> Json<Envelope<Account>> {
    ok("Account retrieved", caller.account().clone())
}
