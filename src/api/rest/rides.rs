use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{ok, Envelope, PageQuery};
use crate::auth::Caller;
use crate::engine::lifecycle::{self, BookRideRequest, DriverRideView, RidePage};
use crate::engine::payments::settle_ride;
use crate::error::AppError;
use crate::models::ride::{PaymentMethod, Ride, RideStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides/book", post(book_ride))
        .route("/rides/mine", get(my_rides))
        .route("/rides/driving", get(my_driver_rides))
        .route("/rides/available", get(available_rides))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/status", put(update_status))
        .route("/rides/:id/cancel", delete(cancel_ride))
        .route("/rides/:id/payment", post(settle))
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub payment_method: Option<String>,
}

fn parse_status(raw: Option<&str>) -> Result<RideStatus, AppError> {
    let raw = raw
        .map(str::trim)
        .ok_or_else(|| AppError::invalid_field("status", "the status field is required"))?;

    RideStatus::ALL
        .into_iter()
        .find(|status| status.as_str() == raw)
        .ok_or_else(|| AppError::invalid_field("status", "the selected status is invalid"))
}

fn parse_method(raw: Option<&str>) -> Result<PaymentMethod, AppError> {
    match raw.map(str::trim) {
        Some("cash") => Ok(PaymentMethod::Cash),
        Some("card") => Ok(PaymentMethod::Card),
        Some(_) => Err(AppError::invalid_field(
            "payment_method",
            "the payment_method must be cash or card",
        )),
        None => Err(AppError::invalid_field(
            "payment_method",
            "the payment_method field is required",
        )),
    }
}

async fn book_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<BookRideRequest>,
) -> Result<(StatusCode, Json<Envelope<Ride>>), AppError> {
    let ride = lifecycle::book_ride(&state, &caller, payload, Utc::now())?;
    Ok((StatusCode::CREATED, ok("Ride booked successfully", ride)))
}

async fn my_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Json<Envelope<RidePage>> {
    ok(
        "Rides retrieved",
        lifecycle::rides_for_rider(&state, &caller, query.page()),
    )
}

async fn my_driver_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Envelope<RidePage>>, AppError> {
    let page = lifecycle::rides_for_driver(&state, &caller, query.page())?;
    Ok(ok("Rides retrieved", page))
}

async fn available_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Envelope<Vec<DriverRideView>>>, AppError> {
    let rides = lifecycle::available_rides(&state, &caller, Utc::now())?;
    Ok(ok("Available rides retrieved", rides))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let ride = lifecycle::get_ride(&state, &caller, id)?;
    Ok(ok("Ride retrieved", ride))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<DriverRideView>>, AppError> {
    let ride = lifecycle::accept_ride(&state, &caller, id, Utc::now())?;
    Ok(ok(
        "Ride accepted successfully",
        DriverRideView::build(&state, ride),
    ))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let target = parse_status(payload.status.as_deref())?;
    let ride = lifecycle::update_ride_status(&state, &caller, id, target, Utc::now())?;
    Ok(ok(format!("Ride status updated to {}", ride.status.as_str()), ride))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let ride = lifecycle::cancel_ride(&state, &caller, id, Utc::now())?;
    Ok(ok("Ride cancelled successfully", ride))
}

async fn settle(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> Result<Json<Envelope<Ride>>, AppError> {
    let method = parse_method(payload.payment_method.as_deref())?;
    let ride = settle_ride(&state, &caller, id, method, Utc::now())?;
    Ok(ok("Ride completed", ride))
}

#[cfg(test)]
mod tests {
    use super::{parse_method, parse_status};
    use crate::error::AppError;
    use crate::models::ride::{PaymentMethod, RideStatus};

    #[test]
    fn status_names_match_the_wire_format() {
        assert_eq!(parse_status(Some("driver_arrived")).unwrap(), RideStatus::DriverArrived);
        assert_eq!(parse_status(Some(" completed ")).unwrap(), RideStatus::Completed);
        assert!(matches!(parse_status(Some("arrived")), Err(AppError::Validation(_))));
        assert!(matches!(parse_status(None), Err(AppError::Validation(_))));
    }

    #[test]
    fn only_cash_and_card_settle() {
        assert_eq!(parse_method(Some("cash")).unwrap(), PaymentMethod::Cash);
        assert!(parse_method(Some("cheque")).is_err());
    }
}
