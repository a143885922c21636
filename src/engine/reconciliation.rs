//! Applying gateway outcomes to payments, exactly once in effect.
//!
//! The provider may report the same transaction through the browser redirect and
//! the IPN, in any order and more than once. The only decision is
//! [`apply_outcome`]; the payment row lock makes it a compare-and-swap, and only
//! the caller that actually moved the payment touches the ride.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::payment::{Payment, PaymentStatus};
use crate::models::ride::{PaymentMethod, Ride, RidePaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The validation API confirmed the transaction.
    Validated,
    /// The validation API (or a missing `val_id`) did not.
    ValidationFailed,
    Failed,
    Cancelled,
}

/// Next payment status for `outcome`, or `None` if the payment already settled.
pub fn apply_outcome(current: PaymentStatus, outcome: GatewayOutcome) -> Option<PaymentStatus> {
    if current.is_terminal() {
        return None;
    }

    Some(match outcome {
        GatewayOutcome::Validated => PaymentStatus::Completed,
        GatewayOutcome::ValidationFailed | GatewayOutcome::Failed => PaymentStatus::Failed,
        GatewayOutcome::Cancelled => PaymentStatus::Cancelled,
    })
}

/// A form-encoded callback from the gateway, kept whole for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct GatewayCallback {
    fields: HashMap<String, String>,
}

impl From<HashMap<String, String>> for GatewayCallback {
    fn from(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }
}

impl GatewayCallback {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn transaction_id(&self) -> Result<&str, AppError> {
        self.get("tran_id")
            .ok_or_else(|| AppError::invalid_field("tran_id", "the tran_id field is required"))
    }

    /// Falls back to `stored` when the gateway did not report an amount.
    pub fn amount_or(&self, stored: Decimal) -> Result<Decimal, AppError> {
        match self.get("amount") {
            None => Ok(stored),
            Some(raw) => Decimal::from_str(raw)
                .map(|amount| amount.round_dp(2))
                .map_err(|_| AppError::invalid_field("amount", "the amount must be a number")),
        }
    }

    pub fn raw(&self) -> Value {
        serde_json::to_value(&self.fields).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: Payment,
    /// False when the payment had already settled and nothing changed.
    pub applied: bool,
    pub ride: Option<Ride>,
}

/// Handles `success` and `ipn` deliveries: validates with the gateway and settles
/// the payment, then marks the ride paid if this call completed it.
pub async fn reconcile_payment(
    state: &AppState,
    callback: &GatewayCallback,
    now: DateTime<Utc>,
) -> Result<Reconciliation, AppError> {
    let transaction_id = callback.transaction_id()?;
    let payment = state
        .payments
        .get(transaction_id)
        .ok_or_else(|| AppError::NotFound("payment not found".to_string()))?;

    if payment.status.is_terminal() {
        info!(
            transaction_id,
            status = payment.status.as_str(),
            "duplicate gateway delivery ignored"
        );
        return Ok(Reconciliation {
            payment,
            applied: false,
            ride: None,
        });
    }

    let reported_amount = callback.amount_or(payment.amount)?;

    let (outcome, raw) = match callback.get("val_id") {
        Some(val_id) => {
            let started = Instant::now();
            let result = state.gateway.validate(val_id).await;
            state
                .metrics
                .gateway_latency_seconds
                .with_label_values(&["validate", if result.is_ok() { "ok" } else { "error" }])
                .observe(started.elapsed().as_secs_f64());

            // Left pending; the gateway retries its notification.
            let report = result.inspect_err(|err| {
                warn!(transaction_id, error = %err, "gateway validation failed");
            })?;

            let outcome = if report.confirms(transaction_id) {
                GatewayOutcome::Validated
            } else {
                GatewayOutcome::ValidationFailed
            };
            let raw = json!({
                "callback": callback.raw(),
                "validation": report.raw,
            });
            (outcome, raw)
        }
        None => (GatewayOutcome::ValidationFailed, callback.raw()),
    };

    let correlation = callback.get("val_id").map(str::to_string);

    let (payment, applied) = state.payments.update(transaction_id, |payment| {
        let Some(next) = apply_outcome(payment.status, outcome) else {
            return false;
        };

        payment.status = next;
        payment.gateway_response = Some(raw);
        if next == PaymentStatus::Completed {
            payment.gateway_transaction_id = correlation;
            payment.completed_at = Some(now);
        }
        true
    })?;

    if !applied {
        return Ok(Reconciliation {
            payment,
            applied,
            ride: None,
        });
    }

    state
        .metrics
        .record_payment(payment.payment_method.as_str(), payment.status.as_str());
    info!(
        transaction_id,
        status = payment.status.as_str(),
        "gateway payment reconciled"
    );

    if payment.status != PaymentStatus::Completed {
        return Ok(Reconciliation {
            payment,
            applied,
            ride: None,
        });
    }

    // The payment row is released before the ride row is taken.
    let ride = match state.rides.update(&payment.ride_id, |ride| {
        if ride.is_paid() {
            return Err(AppError::Conflict(
                "this ride has already been paid".to_string(),
            ));
        }
        ride.payment_status = RidePaymentStatus::Paid;
        ride.payment_method = Some(PaymentMethod::Card);
        ride.final_price = Some(reported_amount);
        ride.updated_at = now;
        Ok(())
    }) {
        Ok(ride) => {
            state.publish(&ride);
            Some(ride)
        }
        Err(AppError::Conflict(_)) => {
            warn!(
                transaction_id,
                ride_id = %payment.ride_id,
                amount = %reported_amount,
                "card payment completed for a ride that was already paid; refund required"
            );
            None
        }
        Err(err) => {
            warn!(transaction_id, error = %err, "paid ride could not be updated");
            None
        }
    };

    Ok(Reconciliation {
        payment,
        applied,
        ride,
    })
}

/// Handles `fail` and `cancel` deliveries. No validation and no ride change.
pub fn record_direct_outcome(
    state: &AppState,
    callback: &GatewayCallback,
    outcome: GatewayOutcome,
) -> Result<Reconciliation, AppError> {
    let transaction_id = callback.transaction_id()?;
    let raw = callback.raw();

    let (payment, applied) = state.payments.update(transaction_id, |payment| {
        match apply_outcome(payment.status, outcome) {
            Some(next) => {
                payment.status = next;
                payment.gateway_response = Some(raw);
                true
            }
            None => false,
        }
    })?;

    if applied {
        state
            .metrics
            .record_payment(payment.payment_method.as_str(), payment.status.as_str());
        info!(transaction_id, status = payment.status.as_str(), "gateway payment closed");
    } else {
        info!(transaction_id, "duplicate gateway delivery ignored");
    }

    Ok(Reconciliation {
        payment,
        applied,
        ride: None,
    })
}
