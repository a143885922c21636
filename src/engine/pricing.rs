use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::ride::VehicleType;

const MINUTES_PER_KM: Decimal = dec!(2.5);

pub fn base_fare(vehicle: VehicleType) -> Decimal {
    match vehicle {
        VehicleType::Standard => dec!(50),
        VehicleType::Premium => dec!(80),
        VehicleType::Xl => dec!(100),
    }
}

pub fn per_km_rate(vehicle: VehicleType) -> Decimal {
    match vehicle {
        VehicleType::Standard => dec!(25),
        VehicleType::Premium => dec!(35),
        VehicleType::Xl => dec!(45),
    }
}

pub fn calculate_price(distance_km: Decimal, vehicle: VehicleType) -> Decimal {
    (base_fare(vehicle) + distance_km * per_km_rate(vehicle)).round_dp(2)
}

pub fn estimate_duration_minutes(distance_km: Decimal) -> u32 {
    (distance_km * MINUTES_PER_KM)
        .ceil()
        .to_u32()
        .unwrap_or_default()
}
