use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{Caller, Capability};
use crate::error::AppError;
use crate::models::account::{DriverStatus, Role};
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RideOverview {
    pub rides: Vec<Ride>,
    pub total: usize,
    pub pending: usize,
    pub in_service: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Analytics {
    pub total_riders: usize,
    pub total_drivers: usize,
    pub approved_drivers: usize,
    pub pending_drivers: usize,
    pub total_rides: usize,
    pub active_rides: usize,
    pub completed_rides: usize,
    pub cancelled_rides: usize,
    pub rides_today: usize,
    pub total_revenue: Decimal,
    pub revenue_today: Decimal,
}

/// Every ride, newest first, with a count per status bucket.
pub fn list_rides(state: &AppState, caller: &Caller) -> Result<RideOverview, AppError> {
    caller.require(Capability::Administer)?;

    let mut rides = state.rides.filter(|_| true);
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let count = |pred: fn(&Ride) -> bool| rides.iter().filter(|ride| pred(ride)).count();
    let pending = count(|ride| ride.status == RideStatus::Pending);
    let in_service = count(|ride| ride.status.is_driver_active());
    let completed = count(|ride| ride.status == RideStatus::Completed);
    let cancelled = count(|ride| ride.status == RideStatus::Cancelled);
    let expired = count(|ride| ride.status == RideStatus::Expired);

    Ok(RideOverview {
        total: rides.len(),
        rides,
        pending,
        in_service,
        completed,
        cancelled,
        expired,
    })
}

pub fn analytics(
    state: &AppState,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Analytics, AppError> {
    caller.require(Capability::Administer)?;

    let today = now.date_naive();
    let mut report = Analytics::default();

    for account in state.accounts.list(None) {
        match account.role {
            Role::Rider => report.total_riders += 1,
            Role::Driver => {
                report.total_drivers += 1;
                match account.driver_status {
                    Some(DriverStatus::Approved) => report.approved_drivers += 1,
                    Some(DriverStatus::Pending) => report.pending_drivers += 1,
                    _ => {}
                }
            }
            Role::Admin => {}
        }
    }

    for ride in state.rides.filter(|_| true) {
        report.total_rides += 1;
        if ride.created_at.date_naive() == today {
            report.rides_today += 1;
        }

        match ride.status {
            status if status.is_active() => report.active_rides += 1,
            RideStatus::Completed => {
                report.completed_rides += 1;
                let fare = ride.final_price.unwrap_or(ride.estimated_price);
                report.total_revenue += fare;
                if ride.completed_at.is_some_and(|at| at.date_naive() == today) {
                    report.revenue_today += fare;
                }
            }
            RideStatus::Cancelled => report.cancelled_rides += 1,
            _ => {}
        }
    }

    Ok(report)
}

pub fn delete_ride(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    caller.require(Capability::Administer)?;

    let ride = state.rides.remove_inactive(&ride_id)?;
    info!(ride_id = %ride.id, status = ride.status.as_str(), "ride deleted");
    Ok(ride)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::engine::lifecycle::cancel_ride;
    use crate::engine::test_support::{admin, book_tomorrow, completed_ride, rider, state};

    #[test]
    fn overview_counts_each_bucket() {
        let state = state();
        let admin = admin(&state);
        completed_ride(&state);
        let waiting = rider(&state, "waiting@example.com");
        book_tomorrow(&state, &waiting);
        let quitter = rider(&state, "quitter@example.com");
        let dropped = book_tomorrow(&state, &quitter);
        cancel_ride(&state, &quitter, dropped.id, Utc::now()).unwrap();

        let overview = list_rides(&state, &admin).unwrap();

        assert_eq!(overview.total, 3);
        assert_eq!(overview.pending, 1);
        assert_eq!(overview.completed, 1);
        assert_eq!(overview.cancelled, 1);
        assert_eq!(overview.in_service, 0);
    }

    #[test]
    fn analytics_sums_completed_fares() {
        let state = state();
        let admin = admin(&state);
        let (_, _, ride) = completed_ride(&state);
        state
            .rides
            .update(&ride.id, |r| {
                r.final_price = Some(dec!(275.50));
                Ok(())
            })
            .unwrap();

        let report = analytics(&state, &admin, Utc::now()).unwrap();

        assert_eq!(report.total_riders, 1);
        assert_eq!(report.total_drivers, 1);
        assert_eq!(report.approved_drivers, 1);
        assert_eq!(report.completed_rides, 1);
        assert_eq!(report.total_revenue, dec!(275.50));
        assert_eq!(report.revenue_today, dec!(275.50));
    }

    #[test]
    fn deleting_requires_an_inactive_ride() {
        let state = state();
        let admin = admin(&state);
        let rider = rider(&state, "rider@example.com");
        let ride = book_tomorrow(&state, &rider);

        assert!(matches!(
            delete_ride(&state, &rider, ride.id),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            delete_ride(&state, &admin, ride.id),
            Err(AppError::InvalidState(_))
        ));

        cancel_ride(&state, &rider, ride.id, Utc::now()).unwrap();
        delete_ride(&state, &admin, ride.id).unwrap();
        assert!(state.rides.get(&ride.id).is_none());
    }
}
