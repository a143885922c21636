pub mod accounts;
pub mod admin;
pub mod lifecycle;
pub mod payments;
pub mod pricing;
pub mod reconciliation;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crate::auth::Caller;
    use crate::engine::lifecycle::{accept_ride, book_ride, update_ride_status, BookRideRequest};
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::PaymentGateway;
    use crate::models::account::{Account, DriverStatus, Role};
    use crate::models::ride::{Ride, RideStatus};
    use crate::state::{AppState, PaymentSettings};

    pub fn state() -> AppState {
        state_with(Arc::new(ScriptedGateway::approving()))
    }

    pub fn state_with(gateway: Arc<dyn PaymentGateway>) -> AppState {
        AppState::new(
            gateway,
            PaymentSettings::new("BDT", "http://localhost:3000"),
            64,
        )
    }

    fn register(state: &AppState, account: Account) -> Caller {
        Caller::new(state.accounts.insert(account).unwrap())
    }

    pub fn rider(state: &AppState, email: &str) -> Caller {
        register(
            state,
            Account::new(
                "Rider".to_string(),
                email.to_string(),
                Some("01700000000".to_string()),
                Role::Rider,
            ),
        )
    }

    pub fn driver(state: &AppState, email: &str, status: DriverStatus) -> Caller {
        register(
            state,
            Account::driver(
                "Driver".to_string(),
                email.to_string(),
                Some("01800000000".to_string()),
                "DL-1".to_string(),
                status,
            ),
        )
    }

    pub fn approved_driver(state: &AppState, email: &str) -> Caller {
        driver(state, email, DriverStatus::Approved)
    }

    pub fn admin(state: &AppState) -> Caller {
        register(
            state,
            Account::new(
                "Admin".to_string(),
                "admin@example.com".to_string(),
                None,
                Role::Admin,
            ),
        )
    }

    pub fn tomorrow_request() -> BookRideRequest {
        let tomorrow = Utc::now() + Duration::days(1);
        BookRideRequest {
            pickup_location: Some("Gulshan 1".to_string()),
            dropoff_location: Some("Dhanmondi 27".to_string()),
            ride_date: Some(tomorrow.format("%Y-%m-%d").to_string()),
            ride_time: Some("10:30".to_string()),
            ..Default::default()
        }
    }

    pub fn book_tomorrow(state: &AppState, rider: &Caller) -> Ride {
        book_ride(state, rider, tomorrow_request(), Utc::now()).unwrap()
    }

    /// A rider, an approved driver and their ride, already in progress.
    pub fn started_ride(state: &AppState) -> (Caller, Caller, Ride) {
        let rider = rider(state, "trip-rider@example.com");
        let driver = approved_driver(state, "trip-driver@example.com");
        let ride = book_tomorrow(state, &rider);

        accept_ride(state, &driver, ride.id, Utc::now()).unwrap();
        update_ride_status(state, &driver, ride.id, RideStatus::DriverArrived, Utc::now()).unwrap();
        let ride =
            update_ride_status(state, &driver, ride.id, RideStatus::InProgress, Utc::now()).unwrap();
        (rider, driver, ride)
    }

    pub fn completed_ride(state: &AppState) -> (Caller, Caller, Ride) {
        let (rider, driver, ride) = started_ride(state);
        let ride =
            update_ride_status(state, &driver, ride.id, RideStatus::Completed, Utc::now()).unwrap();
        (rider, driver, ride)
    }
}
