use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::engine::lifecycle::{advance, committed};
use crate::error::{AppError, ValidationErrors};
use crate::gateway::CheckoutRequest;
use crate::models::payment::{transaction_id, CustomerSnapshot, Payment, PaymentStatus};
use crate::models::ride::{PaymentMethod, Ride, RidePaymentStatus, RideStatus};
use crate::state::AppState;

const CASH_MARKER: &str = "CASH_PAYMENT";

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CashPaymentRequest {
    pub ride_id: Option<Uuid>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct InitializePaymentRequest {
    pub ride_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayCheckout {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub gateway_url: String,
    pub session_key: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideSummary {
    pub id: Uuid,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub status: RideStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub payment: Payment,
    pub ride: Option<RideSummary>,
}

fn require_amount(errors: &mut ValidationErrors, amount: Option<Decimal>) -> Decimal {
    match amount {
        Some(amount) if amount >= Decimal::ONE => amount.round_dp(2),
        Some(_) => {
            errors.add("amount", "the amount must be at least 1");
            Decimal::ZERO
        }
        None => {
            errors.add("amount", "the amount field is required");
            Decimal::ZERO
        }
    }
}

fn require_ride_id(errors: &mut ValidationErrors, ride_id: Option<Uuid>) -> Uuid {
    ride_id.unwrap_or_else(|| {
        errors.add("ride_id", "the ride_id field is required");
        Uuid::nil()
    })
}

fn cash_payment(ride: &Ride, caller: &Caller, amount: Decimal, now: DateTime<Utc>) -> Payment {
    let payer = caller.account();

    Payment {
        id: Uuid::new_v4(),
        transaction_id: transaction_id(PaymentMethod::Cash, now, ride.id),
        ride_id: ride.id,
        user_id: payer.id,
        amount,
        currency: String::new(),
        status: PaymentStatus::Completed,
        payment_method: PaymentMethod::Cash,
        gateway_session_key: Some(CASH_MARKER.to_string()),
        gateway_transaction_id: Some(CASH_MARKER.to_string()),
        gateway_response: Some(json!({
            "payment_type": "cash",
            "processed_at": now,
            "confirmed_by": caller.role(),
        })),
        customer: CustomerSnapshot {
            name: payer.name.clone(),
            email: payer.email.clone(),
            phone: payer.phone.clone().unwrap_or_default(),
        },
        created_at: now,
        completed_at: Some(now),
    }
}

fn record_cash(
    state: &AppState,
    ride: &Ride,
    caller: &Caller,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Payment, AppError> {
    let mut payment = cash_payment(ride, caller, amount, now);
    payment.currency = state.payment_settings.currency.clone();

    let payment = state.payments.insert_new(payment)?;
    state.metrics.record_payment(PaymentMethod::Cash.as_str(), PaymentStatus::Completed.as_str());
    info!(
        transaction_id = %payment.transaction_id,
        ride_id = %ride.id,
        amount = %amount,
        "cash payment recorded"
    );
    Ok(payment)
}

/// Cash is collected after the ride, so only completed rides can be paid this way.
pub fn process_cash_payment(
    state: &AppState,
    caller: &Caller,
    request: CashPaymentRequest,
    now: DateTime<Utc>,
) -> Result<Payment, AppError> {
    let mut errors = ValidationErrors::default();
    let ride_id = require_ride_id(&mut errors, request.ride_id);
    let amount = require_amount(&mut errors, request.amount);
    errors.into_result()?;

    let ride = state.rides.update(&ride_id, |ride| {
        caller.require_party(ride)?;
        if ride.status != RideStatus::Completed {
            return Err(AppError::InvalidState(
                "cash payment can only be processed for completed rides".to_string(),
            ));
        }
        if ride.is_paid() {
            return Err(AppError::Conflict(
                "this ride has already been paid".to_string(),
            ));
        }

        ride.payment_method = Some(PaymentMethod::Cash);
        ride.payment_status = RidePaymentStatus::Paid;
        ride.final_price = Some(amount);
        ride.updated_at = now;
        Ok(())
    })?;

    let payment = record_cash(state, &ride, caller, amount, now)?;
    state.publish(&ride);
    Ok(payment)
}

/// The "payment completion" trigger: completes a ride that is underway and
/// records how it is being paid. Cash settles on the spot; card waits for the
/// gateway.
pub fn settle_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let mut from = None;
    let ride = state.rides.update(&ride_id, |ride| {
        caller.require_party(ride)?;
        let previous = ride.status;
        advance(ride, RideStatus::Completed, now)?;

        ride.payment_method = Some(method);
        if method == PaymentMethod::Cash {
            ride.payment_status = RidePaymentStatus::Paid;
        }
        from = Some(previous);
        Ok(())
    })?;

    if method == PaymentMethod::Cash {
        let amount = ride.final_price.unwrap_or(ride.estimated_price);
        record_cash(state, &ride, caller, amount, now)?;
    }

    committed(state, from, &ride);
    Ok(ride)
}

pub async fn initialize_gateway_payment(
    state: &AppState,
    caller: &Caller,
    request: InitializePaymentRequest,
    now: DateTime<Utc>,
) -> Result<GatewayCheckout, AppError> {
    let mut errors = ValidationErrors::default();
    let ride_id = require_ride_id(&mut errors, request.ride_id);
    let amount = require_amount(&mut errors, request.amount);

    let mut text = |field: &str, value: Option<String>| {
        let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
        if value.is_empty() {
            errors.add(field, format!("the {field} field is required"));
        }
        value
    };
    let name = text("customer_name", request.customer_name);
    let email = text("customer_email", request.customer_email);
    let phone = text("customer_phone", request.customer_phone);
    if !email.is_empty() && !email.contains('@') {
        errors.add("customer_email", "the customer_email must be a valid email address");
    }
    errors.into_result()?;

    let ride = state
        .rides
        .get(&ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
    if ride.user_id != caller.id() {
        return Err(AppError::Unauthorized(
            "only the rider can pay for this ride".to_string(),
        ));
    }
    if ride.is_paid() {
        return Err(AppError::Conflict(
            "this ride has already been paid".to_string(),
        ));
    }

    let currency = state.payment_settings.currency.clone();
    let customer = CustomerSnapshot { name, email, phone };
    let payment = state.payments.insert_new(Payment {
        id: Uuid::new_v4(),
        transaction_id: transaction_id(PaymentMethod::Card, now, ride.id),
        ride_id: ride.id,
        user_id: caller.id(),
        amount,
        currency: currency.clone(),
        status: PaymentStatus::Pending,
        payment_method: PaymentMethod::Card,
        gateway_session_key: None,
        gateway_transaction_id: None,
        gateway_response: None,
        customer: customer.clone(),
        created_at: now,
        completed_at: None,
    })?;

    let checkout = CheckoutRequest {
        transaction_id: payment.transaction_id.clone(),
        amount,
        currency: currency.clone(),
        ride_id: ride.id,
        user_id: caller.id(),
        customer,
        pickup_location: ride.pickup_location.clone(),
        dropoff_location: ride.dropoff_location.clone(),
        callbacks: state.payment_settings.callbacks.clone(),
    };

    let started = Instant::now();
    let outcome = state.gateway.initialize(&checkout).await;
    state
        .metrics
        .gateway_latency_seconds
        .with_label_values(&["initialize", if outcome.is_ok() { "ok" } else { "error" }])
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(session) => {
            state.payments.update(&payment.transaction_id, |payment| {
                payment.gateway_session_key = Some(session.session_key.clone());
                payment.gateway_response = Some(session.raw.clone());
            })?;
            info!(
                transaction_id = %payment.transaction_id,
                ride_id = %ride.id,
                "gateway checkout opened"
            );

            Ok(GatewayCheckout {
                payment_id: payment.id,
                transaction_id: payment.transaction_id,
                gateway_url: session.gateway_url,
                session_key: session.session_key,
                amount,
                currency,
            })
        }
        Err(err) => {
            state.payments.update(&payment.transaction_id, |payment| {
                if payment.status == PaymentStatus::Pending {
                    payment.status = PaymentStatus::Failed;
                }
                payment.gateway_response = Some(err.raw_response());
            })?;
            state.metrics.record_payment(PaymentMethod::Card.as_str(), PaymentStatus::Failed.as_str());
            warn!(
                transaction_id = %payment.transaction_id,
                error = %err,
                "gateway checkout failed"
            );

            Err(err.into())
        }
    }
}

pub fn payment_status(
    state: &AppState,
    caller: &Caller,
    transaction_id: &str,
) -> Result<PaymentView, AppError> {
    let payment = state
        .payments
        .get(transaction_id)
        .ok_or_else(|| AppError::NotFound("payment not found".to_string()))?;
    let ride = state.rides.get(&payment.ride_id);

    let allowed = caller.is_admin()
        || payment.user_id == caller.id()
        || ride.as_ref().is_some_and(|ride| ride.is_party(caller.id()));
    if !allowed {
        return Err(AppError::Unauthorized(
            "you cannot view this payment".to_string(),
        ));
    }

    Ok(PaymentView {
        payment,
        ride: ride.map(|ride| RideSummary {
            id: ride.id,
            pickup_location: ride.pickup_location,
            dropoff_location: ride.dropoff_location,
            status: ride.status,
        }),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::engine::lifecycle::{accept_ride, update_ride_status};
    use crate::engine::test_support::{
        approved_driver, book_tomorrow, completed_ride, rider, started_ride, state, state_with,
    };
    use crate::gateway::testing::ScriptedGateway;

    #[test]
    fn cash_before_completion_is_refused_then_accepted_after() {
        let state = state();
        let rider = rider(&state, "rider@example.com");
        let driver = approved_driver(&state, "driver@example.com");
        let ride = book_tomorrow(&state, &rider);
        accept_ride(&state, &driver, ride.id, Utc::now()).unwrap();
        update_ride_status(&state, &driver, ride.id, RideStatus::DriverArrived, Utc::now()).unwrap();
        update_ride_status(&state, &driver, ride.id, RideStatus::InProgress, Utc::now()).unwrap();

        let request = CashPaymentRequest {
            ride_id: Some(ride.id),
            amount: Some(dec!(420.00)),
        };
        let err = process_cash_payment(&state, &rider, request.clone(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(state.payments.is_empty());

        update_ride_status(&state, &driver, ride.id, RideStatus::Completed, Utc::now()).unwrap();
        let payment = process_cash_payment(&state, &rider, request.clone(), Utc::now()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.transaction_id.starts_with("CASH_"));
        assert_eq!(payment.gateway_session_key.as_deref(), Some(CASH_MARKER));
        assert_eq!(payment.currency, "BDT");
        let stored = state.rides.get(&ride.id).unwrap();
        assert_eq!(stored.final_price, Some(dec!(420.00)));
        assert_eq!(stored.payment_status, RidePaymentStatus::Paid);
        assert_eq!(stored.payment_method, Some(PaymentMethod::Cash));

        let again = process_cash_payment(&state, &driver, request, Utc::now()).unwrap_err();
        assert!(matches!(again, AppError::Conflict(_)));
        assert_eq!(state.payments.len(), 1);
    }

    #[test]
    fn cash_amount_must_be_positive() {
        let state = state();
        let (rider, _, ride) = completed_ride(&state);

        let err = process_cash_payment(
            &state,
            &rider,
            CashPaymentRequest {
                ride_id: Some(ride.id),
                amount: Some(dec!(0.5)),
            },
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(errors) if errors.contains("amount")));
    }

    #[test]
    fn settling_with_cash_completes_and_pays_the_ride() {
        let state = state();
        let (_, driver, ride) = started_ride(&state);

        let settled = settle_ride(&state, &driver, ride.id, PaymentMethod::Cash, Utc::now()).unwrap();

        assert_eq!(settled.status, RideStatus::Completed);
        assert_eq!(settled.final_price, Some(settled.estimated_price));
        assert_eq!(settled.payment_status, RidePaymentStatus::Paid);
        let payments = state.payments.for_ride(&ride.id);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, settled.estimated_price);
        assert!(state.rides.active_ride_for_driver(&driver.id()).is_none());
    }

    #[test]
    fn settling_with_card_leaves_the_ride_unpaid() {
        let state = state();
        let (rider, _, ride) = started_ride(&state);

        let settled = settle_ride(&state, &rider, ride.id, PaymentMethod::Card, Utc::now()).unwrap();

        assert_eq!(settled.status, RideStatus::Completed);
        assert_eq!(settled.payment_method, Some(PaymentMethod::Card));
        assert_eq!(settled.payment_status, RidePaymentStatus::Unpaid);
        assert!(state.payments.is_empty());
    }

    #[test]
    fn settling_an_unstarted_ride_is_invalid() {
        let state = state();
        let rider = rider(&state, "rider@example.com");
        let ride = book_tomorrow(&state, &rider);

        let err = settle_ride(&state, &rider, ride.id, PaymentMethod::Cash, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(state.rides.get(&ride.id).unwrap().status, RideStatus::Pending);
    }

    fn checkout_request(ride_id: Uuid) -> InitializePaymentRequest {
        InitializePaymentRequest {
            ride_id: Some(ride_id),
            amount: Some(dec!(350)),
            customer_name: Some("Rahim".to_string()),
            customer_email: Some("rahim@example.com".to_string()),
            customer_phone: Some("01700000000".to_string()),
        }
    }

    #[tokio::test]
    async fn opened_checkout_keeps_payment_pending_with_session() {
        let state = state();
        let (rider, _, ride) = completed_ride(&state);

        let checkout = initialize_gateway_payment(&state, &rider, checkout_request(ride.id), Utc::now())
            .await
            .unwrap();

        assert!(checkout.transaction_id.starts_with("CHOLEN_"));
        assert_eq!(checkout.amount, dec!(350));
        let stored = state.payments.get(&checkout.transaction_id).unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.gateway_session_key.as_deref(), Some(checkout.session_key.as_str()));
        assert!(stored.gateway_response.is_some());
    }

    #[tokio::test]
    async fn refused_checkout_marks_the_payment_failed() {
        let state = state_with(Arc::new(ScriptedGateway::declining()));
        let (rider, _, ride) = completed_ride(&state);

        let err = initialize_gateway_payment(&state, &rider, checkout_request(ride.id), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Gateway(_)));
        let payments = state.payments.for_ride(&ride.id);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(payments[0].gateway_response.as_ref().unwrap()["status"], "FAILED");
    }

    #[tokio::test]
    async fn only_the_rider_may_open_a_checkout() {
        let state = state();
        let (_, driver, ride) = completed_ride(&state);

        let err = initialize_gateway_payment(&state, &driver, checkout_request(ride.id), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(state.payments.is_empty());
    }

    #[tokio::test]
    async fn checkout_fields_are_validated_together() {
        let state = state();
        let rider = rider(&state, "rider@example.com");

        let err = initialize_gateway_payment(
            &state,
            &rider,
            InitializePaymentRequest {
                customer_email: Some("not-an-email".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["ride_id", "amount", "customer_name", "customer_email", "customer_phone"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
    }

    #[test]
    fn payment_status_is_visible_to_parties_only() {
        let state = state();
        let (rider, driver, ride) = completed_ride(&state);
        let payment = process_cash_payment(
            &state,
            &rider,
            CashPaymentRequest {
                ride_id: Some(ride.id),
                amount: Some(dec!(300)),
            },
            Utc::now(),
        )
        .unwrap();
        let stranger = crate::engine::test_support::rider(&state, "stranger@example.com");

        let view = payment_status(&state, &driver, &payment.transaction_id).unwrap();
        assert_eq!(view.ride.unwrap().id, ride.id);
        assert!(matches!(
            payment_status(&state, &stranger, &payment.transaction_id),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            payment_status(&state, &rider, "CHOLEN_0_missing"),
            Err(AppError::NotFound(_))
        ));
    }
}
