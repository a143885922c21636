use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{ok, Envelope};
use crate::auth::Caller;
use crate::engine::accounts::{self, CreateDriverRequest};
use crate::engine::admin::{self, Analytics, RideOverview};
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::account::{Account, DriverStatus, Role};
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/accounts", get(list_accounts))
        .route("/admin/accounts/:id", delete(delete_account))
        .route("/admin/drivers", post(create_driver))
        .route("/admin/drivers/:id/status", put(update_driver_status))
        .route("/admin/rides", get(list_rides))
        .route("/admin/rides/expire-stale", post(expire_stale_rides))
        .route("/admin/rides/:id", delete(delete_ride))
        .route("/admin/rides/:id/expire", post(expire_ride))
        .route("/admin/analytics", get(analytics))
}

#[derive(Deserialize)]
pub struct RoleQuery {
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct DriverStatusRequest {
    pub driver_status: Option<DriverStatus>,
}

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Envelope<Vec<Account>>>, AppError> {
    let accounts = accounts::list_accounts(&state, &caller, query.role)?;
    Ok(ok("Accounts retrieved", accounts))
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<(StatusCode, Json<Envelope<Account>>), AppError> {
    let driver = accounts::create_driver(&state, &caller, payload)?;
    Ok((StatusCode::CREATED, ok("Driver created", driver)))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverStatusRequest>,
) -> Result<Json<Envelope<Account>>, AppError> {
    let status = payload.driver_status.ok_or_else(|| {
        AppError::invalid_field("driver_status", "the driver_status field is required")
    })?;
    let driver = accounts::update_driver_status(&state, &caller, id, status)?;
    Ok(ok("Driver status updated", driver))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Account>>, AppError> {
    let account = accounts::delete_account(&state, &caller, id)?;
    Ok(ok("Account deleted", account))
}

async fn list_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Envelope<RideOverview>>, AppError> {
    let overview = admin::list_rides(&state, &caller)?;
    Ok(ok("Rides retrieved", overview))
}

async fn analytics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Envelope<Analytics>>, AppError> {
    let report = admin::analytics(&state, &caller, Utc::now())?;
    Ok(ok("Analytics retrieved", report))
}

async fn expire_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let ride = lifecycle::expire_ride(&state, &caller, id, Utc::now())?;
    Ok(ok("Ride expired", ride))
}

async fn expire_stale_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Envelope<Vec<Ride>>>, AppError> {
    let expired = lifecycle::expire_stale_rides(&state, &caller, Utc::now())?;
    Ok(ok(format!("{} stale rides expired", expired.len()), expired))
}

async fn delete_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let ride = admin::delete_ride(&state, &caller, id)?;
    Ok(ok("Ride deleted", ride))
}
