use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    #[default]
    Standard,
    Premium,
    Xl,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Standard => "standard",
            VehicleType::Premium => "premium",
            VehicleType::Xl => "xl",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    DriverArrived,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl RideStatus {
    pub const ALL: [RideStatus; 7] = [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::DriverArrived,
        RideStatus::InProgress,
        RideStatus::Completed,
        RideStatus::Cancelled,
        RideStatus::Expired,
    ];

    /// Statuses that count against the rider's single-active-ride limit.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RideStatus::Pending
                | RideStatus::Accepted
                | RideStatus::DriverArrived
                | RideStatus::InProgress
        )
    }

    /// Statuses that count against the driver's limit. A driver is bound only after acceptance.
    pub fn is_driver_active(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted | RideStatus::DriverArrived | RideStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, RideStatus::Pending | RideStatus::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::DriverArrived => "driver_arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Expired => "expired",
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            RideStatus::Pending => "Looking for driver",
            RideStatus::Accepted => "Driver assigned",
            RideStatus::DriverArrived => "Driver arrived",
            RideStatus::InProgress => "Ride in progress",
            RideStatus::Completed => "Completed",
            RideStatus::Cancelled => "Cancelled",
            RideStatus::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    /// Source prefix of transaction ids created through this method.
    pub fn transaction_source(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CHOLEN",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RidePaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub ride_date: NaiveDate,
    pub ride_time: NaiveTime,
    pub scheduled_at: DateTime<Utc>,
    pub distance_km: Decimal,
    pub estimated_price: Decimal,
    pub final_price: Option<Decimal>,
    pub estimated_duration_minutes: u32,
    pub vehicle_type: VehicleType,
    pub passenger_count: u8,
    pub special_instructions: Option<String>,
    pub status: RideStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub driver_arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: RidePaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn is_party(&self, account_id: Uuid) -> bool {
        self.user_id == account_id || self.driver_id == Some(account_id)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == RidePaymentStatus::Paid
    }
}

/// Published on every ride state change; consumed by websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    pub ride_id: Uuid,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: RideStatus,
    pub payment_status: RidePaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Ride> for RideEvent {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            user_id: ride.user_id,
            driver_id: ride.driver_id,
            status: ride.status,
            payment_status: ride.payment_status,
            occurred_at: ride.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RideStatus;

    #[test]
    fn active_sets_differ_only_by_pending() {
        for status in RideStatus::ALL {
            let rider_only = status.is_active() && !status.is_driver_active();
            assert_eq!(rider_only, status == RideStatus::Pending, "{status:?}");
        }
    }

    #[test]
    fn only_pending_and_accepted_are_cancellable() {
        let cancellable: Vec<RideStatus> = RideStatus::ALL
            .into_iter()
            .filter(RideStatus::can_be_cancelled)
            .collect();
        assert_eq!(cancellable, vec![RideStatus::Pending, RideStatus::Accepted]);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RideStatus::DriverArrived).unwrap();
        assert_eq!(json, "\"driver_arrived\"");
        assert_eq!(RideStatus::InProgress.as_str(), "in_progress");
    }
}
