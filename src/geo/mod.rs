use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::models::ride::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

// Address-only routes fall inside this band, in hundredths of a km.
const FALLBACK_MIN_CENTI_KM: u64 = 500;
const FALLBACK_SPAN_CENTI_KM: u64 = 4_600;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Trip distance used for pricing, rounded to 2dp.
///
/// Uses the great-circle distance when both coordinates are known. Otherwise the
/// normalised address pair is digested onto 5.00..=50.99 km, so the same route
/// always quotes the same price.
pub fn estimate_distance_km(
    pickup_location: &str,
    dropoff_location: &str,
    pickup: Option<&GeoPoint>,
    dropoff: Option<&GeoPoint>,
) -> Decimal {
    if let (Some(from), Some(to)) = (pickup, dropoff) {
        if let Some(km) = Decimal::from_f64(haversine_km(from, to)) {
            return km.round_dp(2);
        }
    }

    let mut hasher = DefaultHasher::new();
    pickup_location.trim().to_lowercase().hash(&mut hasher);
    dropoff_location.trim().to_lowercase().hash(&mut hasher);
    let centi_km = FALLBACK_MIN_CENTI_KM + hasher.finish() % FALLBACK_SPAN_CENTI_KM;

    Decimal::new(centi_km as i64, 2)
}
