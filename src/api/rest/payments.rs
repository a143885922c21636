use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::api::rest::{ok, Envelope};
use crate::auth::Caller;
use crate::engine::payments::{
    self, CashPaymentRequest, GatewayCheckout, InitializePaymentRequest, PaymentView,
};
use crate::engine::reconciliation::{
    reconcile_payment, record_direct_outcome, GatewayCallback, GatewayOutcome, Reconciliation,
};
use crate::error::AppError;
use crate::models::payment::{Payment, PaymentStatus};
use crate::models::ride::RidePaymentStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/initialize", post(initialize))
        .route("/payments/cash", post(cash))
        .route("/payments/status/:transaction_id", get(status))
        .route("/payments/success", post(success))
        .route("/payments/ipn", post(ipn))
        .route("/payments/fail", post(fail))
        .route("/payments/cancel", post(cancel))
}

/// What the gateway (or the browser it redirected) gets back from a callback.
#[derive(Debug, Serialize)]
pub struct CallbackReceipt {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub applied: bool,
    pub ride_payment_status: Option<RidePaymentStatus>,
}

impl From<Reconciliation> for CallbackReceipt {
    fn from(outcome: Reconciliation) -> Self {
        Self {
            transaction_id: outcome.payment.transaction_id,
            status: outcome.payment.status,
            applied: outcome.applied,
            ride_payment_status: outcome.ride.map(|ride| ride.payment_status),
        }
    }
}

async fn initialize(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<InitializePaymentRequest>,
) -> Result<Json<Envelope<GatewayCheckout>>, AppError> {
    let checkout =
        payments::initialize_gateway_payment(&state, &caller, payload, Utc::now()).await?;
    Ok(ok("Payment initialized successfully", checkout))
}

async fn cash(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CashPaymentRequest>,
) -> Result<(StatusCode, Json<Envelope<Payment>>), AppError> {
    let payment = payments::process_cash_payment(&state, &caller, payload, Utc::now())?;
    Ok((
        StatusCode::CREATED,
        ok("Cash payment processed successfully", payment),
    ))
}

async fn status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(transaction_id): Path<String>,
) -> Result<Json<Envelope<PaymentView>>, AppError> {
    let view = payments::payment_status(&state, &caller, &transaction_id)?;
    Ok(ok("Payment status retrieved", view))
}

/// The browser lands here after checkout; a payment that did not validate is
/// reported as a failed request.
async fn success(
    State(state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Envelope<CallbackReceipt>>), AppError> {
    let outcome = reconcile_payment(&state, &GatewayCallback::from(fields), Utc::now()).await?;
    if outcome.payment.status == PaymentStatus::Completed {
        return Ok((
            StatusCode::OK,
            ok("Payment completed successfully", CallbackReceipt::from(outcome)),
        ));
    }

    Ok((
        StatusCode::BAD_REQUEST,
        Json(Envelope {
            success: false,
            message: "Payment validation failed".to_string(),
            data: CallbackReceipt::from(outcome),
        }),
    ))
}

async fn ipn(
    State(state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Envelope<CallbackReceipt>>, AppError> {
    let outcome = reconcile_payment(&state, &GatewayCallback::from(fields), Utc::now()).await?;
    Ok(ok("IPN processed", CallbackReceipt::from(outcome)))
}

async fn fail(
    State(state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Envelope<CallbackReceipt>>, AppError> {
    let outcome =
        record_direct_outcome(&state, &GatewayCallback::from(fields), GatewayOutcome::Failed)?;
    Ok(ok("Payment failed", CallbackReceipt::from(outcome)))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Envelope<CallbackReceipt>>, AppError> {
    let outcome = record_direct_outcome(
        &state,
        &GatewayCallback::from(fields),
        GatewayOutcome::Cancelled,
    )?;
    Ok(ok("Payment cancelled", CallbackReceipt::from(outcome)))
}
