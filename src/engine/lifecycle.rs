use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Caller, Capability};
use crate::engine::pricing::{calculate_price, estimate_duration_minutes};
use crate::error::{AppError, ValidationErrors};
use crate::geo::estimate_distance_km;
use crate::models::ride::{GeoPoint, Ride, RidePaymentStatus, RideStatus, VehicleType};
use crate::state::AppState;

const AVAILABLE_RIDES_LIMIT: usize = 20;
const MAX_LOCATION_LEN: usize = 255;
const MAX_INSTRUCTIONS_LEN: usize = 500;
const MAX_PASSENGERS: i64 = 8;
pub const RIDES_PER_PAGE: usize = 10;

/// Pending rides scheduled further back than this are no longer offered to drivers.
pub fn stale_after() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BookRideRequest {
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub ride_date: Option<String>,
    pub ride_time: Option<String>,
    pub vehicle_type: Option<String>,
    pub passenger_count: Option<i64>,
    pub special_instructions: Option<String>,
}

struct Booking {
    pickup_location: String,
    dropoff_location: String,
    pickup: Option<GeoPoint>,
    dropoff: Option<GeoPoint>,
    ride_date: NaiveDate,
    ride_time: NaiveTime,
    scheduled_at: DateTime<Utc>,
    vehicle_type: VehicleType,
    passenger_count: u8,
    special_instructions: Option<String>,
}

fn required_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Option<String> {
    match value.map(str::trim) {
        None | Some("") => {
            errors.add(field, format!("the {field} field is required"));
            None
        }
        Some(text) if text.chars().count() > max_len => {
            errors.add(field, format!("the {field} may not be greater than {max_len} characters"));
            None
        }
        Some(text) => Some(text.to_string()),
    }
}

fn check_point(errors: &mut ValidationErrors, field: &str, point: Option<&GeoPoint>) {
    if let Some(point) = point {
        if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
            errors.add(field, "coordinates are out of range");
        }
    }
}

impl BookRideRequest {
    fn validate(self, now: DateTime<Utc>) -> Result<Booking, AppError> {
        let mut errors = ValidationErrors::default();
        let today = now.date_naive();

        let pickup_location = required_text(
            &mut errors,
            "pickup_location",
            self.pickup_location.as_deref(),
            MAX_LOCATION_LEN,
        );
        let dropoff_location = required_text(
            &mut errors,
            "dropoff_location",
            self.dropoff_location.as_deref(),
            MAX_LOCATION_LEN,
        );

        let ride_date = match self.ride_date.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("ride_date", "the ride_date field is required");
                None
            }
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) if date < today => {
                    errors.add("ride_date", "the ride_date must be today or later");
                    None
                }
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add("ride_date", "the ride_date must be a date in YYYY-MM-DD format");
                    None
                }
            },
        };

        let ride_time = match self.ride_time.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("ride_time", "the ride_time field is required");
                None
            }
            Some(raw) => match NaiveTime::parse_from_str(raw, "%H:%M") {
                Ok(time) => Some(time),
                Err(_) => {
                    errors.add("ride_time", "the ride_time must match the format HH:MM");
                    None
                }
            },
        };

        let vehicle_type = match self.vehicle_type.as_deref().map(str::trim) {
            None | Some("") | Some("standard") => VehicleType::Standard,
            Some("premium") => VehicleType::Premium,
            Some("xl") => VehicleType::Xl,
            Some(_) => {
                errors.add("vehicle_type", "the selected vehicle_type is invalid");
                VehicleType::Standard
            }
        };

        let passenger_count = match self.passenger_count {
            None => 1,
            Some(count) if (1..=MAX_PASSENGERS).contains(&count) => count as u8,
            Some(_) => {
                errors.add("passenger_count", "the passenger_count must be between 1 and 8");
                1
            }
        };

        let special_instructions = self
            .special_instructions
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if special_instructions
            .as_ref()
            .is_some_and(|text| text.chars().count() > MAX_INSTRUCTIONS_LEN)
        {
            errors.add(
                "special_instructions",
                "the special_instructions may not be greater than 500 characters",
            );
        }

        check_point(&mut errors, "pickup", self.pickup.as_ref());
        check_point(&mut errors, "dropoff", self.dropoff.as_ref());

        let scheduled_at = match (ride_date, ride_time) {
            (Some(date), Some(time)) => {
                let scheduled_at = date.and_time(time).and_utc();
                if date == today && scheduled_at < now {
                    errors.add("ride_time", "cannot book rides in the past");
                }
                Some(scheduled_at)
            }
            _ => None,
        };

        errors.into_result()?;

        match (
            pickup_location,
            dropoff_location,
            ride_date,
            ride_time,
            scheduled_at,
        ) {
            (Some(pickup_location), Some(dropoff_location), Some(ride_date), Some(ride_time), Some(scheduled_at)) => {
                Ok(Booking {
                    pickup_location,
                    dropoff_location,
                    pickup: self.pickup,
                    dropoff: self.dropoff,
                    ride_date,
                    ride_time,
                    scheduled_at,
                    vehicle_type,
                    passenger_count,
                    special_instructions,
                })
            }
            _ => Err(AppError::Internal(
                "booking validation passed with missing fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiderContact {
    pub name: String,
    pub phone: String,
}

/// A ride as shown to drivers: the ride plus who to pick up.
#[derive(Debug, Clone, Serialize)]
pub struct DriverRideView {
    #[serde(flatten)]
    pub ride: Ride,
    pub status_text: &'static str,
    pub rider: Option<RiderContact>,
}

impl DriverRideView {
    pub fn build(state: &AppState, ride: Ride) -> Self {
        let rider = state.accounts.get(&ride.user_id).map(|account| RiderContact {
            name: account.name,
            phone: account.phone.unwrap_or_else(|| "Not provided".to_string()),
        });

        Self {
            status_text: ride.status.status_text(),
            ride,
            rider,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub last_page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RidePage {
    pub rides: Vec<Ride>,
    pub pagination: Pagination,
}

fn paginate(mut rides: Vec<Ride>, page: usize) -> RidePage {
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = rides.len();
    let last_page = total.div_ceil(RIDES_PER_PAGE).max(1);
    let current_page = page.max(1);
    let rides = rides
        .into_iter()
        .skip((current_page - 1) * RIDES_PER_PAGE)
        .take(RIDES_PER_PAGE)
        .collect();

    RidePage {
        rides,
        pagination: Pagination {
            current_page,
            last_page,
            per_page: RIDES_PER_PAGE,
            total,
        },
    }
}

/// Moves `ride` to `target`, stamping the matching timestamp. Checks before it
/// writes, so an `Err` leaves the ride untouched. Acceptance binds a driver and
/// goes through [`accept_ride`] instead.
pub fn advance(ride: &mut Ride, target: RideStatus, now: DateTime<Utc>) -> Result<(), AppError> {
    let allowed = match target {
        RideStatus::DriverArrived => ride.status == RideStatus::Accepted,
        RideStatus::InProgress => ride.status == RideStatus::DriverArrived,
        RideStatus::Completed => matches!(
            ride.status,
            RideStatus::DriverArrived | RideStatus::InProgress
        ),
        RideStatus::Cancelled => ride.status.can_be_cancelled(),
        RideStatus::Expired => ride.status.is_active(),
        RideStatus::Pending | RideStatus::Accepted => false,
    };

    if !allowed {
        return Err(AppError::InvalidState(format!(
            "cannot move a ride from {} to {}",
            ride.status.as_str(),
            target.as_str()
        )));
    }

    ride.status = target;
    match target {
        RideStatus::DriverArrived => ride.driver_arrived_at = ride.driver_arrived_at.or(Some(now)),
        RideStatus::InProgress => ride.started_at = ride.started_at.or(Some(now)),
        RideStatus::Completed => {
            ride.completed_at = ride.completed_at.or(Some(now));
            ride.final_price = ride.final_price.or(Some(ride.estimated_price));
        }
        RideStatus::Cancelled => ride.cancelled_at = ride.cancelled_at.or(Some(now)),
        RideStatus::Expired | RideStatus::Pending | RideStatus::Accepted => {}
    }
    ride.updated_at = now;

    Ok(())
}

/// Metrics, event and log line for a committed change.
pub(crate) fn committed(state: &AppState, from: Option<RideStatus>, ride: &Ride) {
    state.metrics.record_transition(from, ride.status);
    state.publish(ride);
    info!(
        ride_id = %ride.id,
        from = from.map(|status| status.as_str()).unwrap_or("none"),
        to = ride.status.as_str(),
        "ride status changed"
    );
}

pub fn book_ride(
    state: &AppState,
    caller: &Caller,
    request: BookRideRequest,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    caller.require(Capability::BookRides)?;
    let booking = request.validate(now)?;

    let distance_km = estimate_distance_km(
        &booking.pickup_location,
        &booking.dropoff_location,
        booking.pickup.as_ref(),
        booking.dropoff.as_ref(),
    );

    let ride = Ride {
        id: Uuid::new_v4(),
        user_id: caller.id(),
        driver_id: None,
        pickup_location: booking.pickup_location,
        dropoff_location: booking.dropoff_location,
        pickup: booking.pickup,
        dropoff: booking.dropoff,
        ride_date: booking.ride_date,
        ride_time: booking.ride_time,
        scheduled_at: booking.scheduled_at,
        distance_km,
        estimated_price: calculate_price(distance_km, booking.vehicle_type),
        final_price: None,
        estimated_duration_minutes: estimate_duration_minutes(distance_km),
        vehicle_type: booking.vehicle_type,
        passenger_count: booking.passenger_count,
        special_instructions: booking.special_instructions,
        status: RideStatus::Pending,
        accepted_at: None,
        driver_arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        payment_method: None,
        payment_status: RidePaymentStatus::Unpaid,
        created_at: now,
        updated_at: now,
    };

    let ride = state.rides.insert_active(ride).inspect_err(|_| {
        warn!(user_id = %caller.id(), "booking refused: rider already has an active ride");
    })?;

    committed(state, None, &ride);
    Ok(ride)
}

/// Pending rides a driver may pick up, soonest first.
pub fn available_rides(
    state: &AppState,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Vec<DriverRideView>, AppError> {
    caller.require(Capability::DriveRides)?;

    if let Some(active) = state.rides.active_ride_for_driver(&caller.id()) {
        return Err(AppError::Conflict(format!(
            "you already have an active ride ({})",
            active.id
        )));
    }

    let cutoff = now - stale_after();
    let mut rides = state
        .rides
        .filter(|ride| ride.status == RideStatus::Pending && ride.scheduled_at >= cutoff);
    rides.sort_by_key(|ride| ride.scheduled_at);
    rides.truncate(AVAILABLE_RIDES_LIMIT);

    Ok(rides
        .into_iter()
        .map(|ride| DriverRideView::build(state, ride))
        .collect())
}

pub fn accept_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    caller.require(Capability::DriveRides)?;

    let current = state
        .rides
        .get(&ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
    if current.status != RideStatus::Pending {
        return Err(AppError::InvalidState(
            "this ride is no longer available".to_string(),
        ));
    }

    let driver_id = caller.id();
    let ride = state
        .rides
        .update_claiming_driver(&ride_id, driver_id, |ride| {
            if ride.status != RideStatus::Pending {
                return Err(AppError::InvalidState(
                    "this ride is no longer available".to_string(),
                ));
            }
            ride.driver_id = Some(driver_id);
            ride.status = RideStatus::Accepted;
            ride.accepted_at = Some(now);
            ride.updated_at = now;
            Ok(())
        })
        .inspect_err(|err| {
            warn!(ride_id = %ride_id, driver_id = %driver_id, error = %err, "accept refused");
        })?;

    committed(state, Some(RideStatus::Pending), &ride);
    Ok(ride)
}

/// Applies a party-requested status change. `cancelled` follows the cancel rules.
pub fn update_ride_status(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    target: RideStatus,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    match target {
        RideStatus::Cancelled => return cancel_ride(state, caller, ride_id, now),
        RideStatus::DriverArrived | RideStatus::InProgress | RideStatus::Completed => {}
        _ => {
            return Err(AppError::invalid_field(
                "status",
                "the status must be one of driver_arrived, in_progress, completed, cancelled",
            ));
        }
    }

    transition_as_party(state, caller, ride_id, target, now)
}

pub fn cancel_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    transition_as_party(state, caller, ride_id, RideStatus::Cancelled, now)
}

fn transition_as_party(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    target: RideStatus,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let mut from = None;
    let ride = state.rides.update(&ride_id, |ride| {
        caller.require_party(ride)?;
        let previous = ride.status;
        advance(ride, target, now)?;
        from = Some(previous);
        Ok(())
    })?;

    committed(state, from, &ride);
    Ok(ride)
}

/// Administrative: retires any active ride.
pub fn expire_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    caller.require(Capability::Administer)?;

    let mut from = None;
    let ride = state.rides.update(&ride_id, |ride| {
        let previous = ride.status;
        advance(ride, RideStatus::Expired, now)?;
        from = Some(previous);
        Ok(())
    })?;

    committed(state, from, &ride);
    Ok(ride)
}

/// Administrative: expires pending rides nobody accepted before they went stale.
pub fn expire_stale_rides(
    state: &AppState,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Vec<Ride>, AppError> {
    caller.require(Capability::Administer)?;

    let cutoff = now - stale_after();
    let is_stale = |ride: &Ride| ride.status == RideStatus::Pending && ride.scheduled_at < cutoff;

    let mut expired = Vec::new();
    for candidate in state.rides.filter(is_stale) {
        let result = state.rides.update(&candidate.id, |ride| {
            // Re-checked under the row lock; a driver may have accepted meanwhile.
            if !is_stale(ride) {
                return Err(AppError::InvalidState("no longer stale".to_string()));
            }
            advance(ride, RideStatus::Expired, now)
        });

        if let Ok(ride) = result {
            committed(state, Some(RideStatus::Pending), &ride);
            expired.push(ride);
        }
    }

    info!(count = expired.len(), "stale rides expired");
    Ok(expired)
}

pub fn get_ride(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    let ride = state
        .rides
        .get(&ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

    if !caller.can_view(&ride) {
        return Err(AppError::Unauthorized(
            "you are not a party to this ride".to_string(),
        ));
    }
    Ok(ride)
}

pub fn rides_for_rider(state: &AppState, caller: &Caller, page: usize) -> RidePage {
    let user_id = caller.id();
    paginate(state.rides.filter(|ride| ride.user_id == user_id), page)
}

pub fn rides_for_driver(
    state: &AppState,
    caller: &Caller,
    page: usize,
) -> Result<RidePage, AppError> {
    caller.require(Capability::DriverHistory)?;

    let driver_id = caller.id();
    Ok(paginate(
        state.rides.filter(|ride| ride.driver_id == Some(driver_id)),
        page,
    ))
}
