use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ride::Ride;

/// Ride rows plus the two single-active-ride claim maps.
///
/// A claim maps a rider (or driver) to the ride that currently holds their active
/// slot. Claims are taken through the vacant-entry API, so checking and claiming
/// is one step. A claim entry is never held while a ride row is locked.
#[derive(Default)]
pub struct RideStore {
    rides: DashMap<Uuid, Ride>,
    active_by_rider: DashMap<Uuid, Uuid>,
    active_by_driver: DashMap<Uuid, Uuid>,
}

impl RideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<Ride> {
        self.rides.get(id).map(|entry| entry.value().clone())
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<Ride>
    where
        P: Fn(&Ride) -> bool,
    {
        self.rides
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn active_ride_for_rider(&self, user_id: &Uuid) -> Option<Ride> {
        let ride_id = self.active_by_rider.get(user_id).map(|claim| *claim.value())?;
        self.get(&ride_id)
    }

    pub fn active_ride_for_driver(&self, driver_id: &Uuid) -> Option<Ride> {
        let ride_id = self
            .active_by_driver
            .get(driver_id)
            .map(|claim| *claim.value())?;
        self.get(&ride_id)
    }

    pub fn has_active_claim(&self, account_id: &Uuid) -> bool {
        self.active_by_rider.contains_key(account_id)
            || self.active_by_driver.contains_key(account_id)
    }

    /// Stores a freshly booked ride, taking its rider's active slot.
    pub fn insert_active(&self, ride: Ride) -> Result<Ride, AppError> {
        match self.active_by_rider.entry(ride.user_id) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(
                    "you already have an active ride booking".to_string(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(ride.id);
            }
        }

        self.rides.insert(ride.id, ride.clone());
        Ok(ride)
    }

    /// Runs `apply` against the locked row. `apply` must leave the row untouched
    /// when it returns an error. Claims are released once the ride leaves the
    /// matching active set.
    pub fn update<F>(&self, id: &Uuid, apply: F) -> Result<Ride, AppError>
    where
        F: FnOnce(&mut Ride) -> Result<(), AppError>,
    {
        let mut row = self
            .rides
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

        apply(row.value_mut())?;
        let ride = row.value().clone();

        if !ride.status.is_active() {
            self.active_by_rider
                .remove_if(&ride.user_id, |_, claimed| *claimed == ride.id);
        }
        if let Some(driver_id) = ride.driver_id {
            if !ride.status.is_driver_active() {
                self.active_by_driver
                    .remove_if(&driver_id, |_, claimed| *claimed == ride.id);
            }
        }

        Ok(ride)
    }

    /// Like [`RideStore::update`], but first takes `driver_id`'s active slot. The slot
    /// is given back if the row update fails.
    pub fn update_claiming_driver<F>(
        &self,
        id: &Uuid,
        driver_id: Uuid,
        apply: F,
    ) -> Result<Ride, AppError>
    where
        F: FnOnce(&mut Ride) -> Result<(), AppError>,
    {
        match self.active_by_driver.entry(driver_id) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(
                    "you already have an active ride".to_string(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(*id);
            }
        }

        self.update(id, apply).inspect_err(|_| {
            self.active_by_driver
                .remove_if(&driver_id, |_, claimed| claimed == id);
        })
    }

    /// Administrative hard delete; refused while the ride is active.
    pub fn remove_inactive(&self, id: &Uuid) -> Result<Ride, AppError> {
        let removed = self.rides.remove_if(id, |_, ride| !ride.status.is_active());
        match removed {
            Some((_, ride)) => Ok(ride),
            None if self.rides.contains_key(id) => Err(AppError::InvalidState(
                "cannot delete a ride while it is active".to_string(),
            )),
            None => Err(AppError::NotFound(format!("ride {id} not found"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::RideStore;
    use crate::error::AppError;
    use crate::models::ride::{Ride, RidePaymentStatus, RideStatus, VehicleType};

    fn ride(user_id: Uuid) -> Ride {
        let now = Utc::now();
        Ride {
            id: Uuid::new_v4(),
            user_id,
            driver_id: None,
            pickup_location: "Gulshan".to_string(),
            dropoff_location: "Banani".to_string(),
            pickup: None,
            dropoff: None,
            ride_date: now.date_naive(),
            ride_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            scheduled_at: now,
            distance_km: dec!(10),
            estimated_price: dec!(300),
            final_price: None,
            estimated_duration_minutes: 25,
            vehicle_type: VehicleType::Standard,
            passenger_count: 1,
            special_instructions: None,
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
        }
    }

    #[test]
    fn second_active_ride_for_same_rider_conflicts() {
        let store = RideStore::new();
        let user = Uuid::new_v4();

        store.insert_active(ride(user)).unwrap();
        let err = store.insert_active(ride(user)).unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn leaving_the_active_set_releases_the_rider_claim() {
        let store = RideStore::new();
        let user = Uuid::new_v4();
        let first = store.insert_active(ride(user)).unwrap();

        store
            .update(&first.id, |r| {
                r.status = RideStatus::Cancelled;
                Ok(())
            })
            .unwrap();

        assert!(store.active_ride_for_rider(&user).is_none());
        assert!(store.insert_active(ride(user)).is_ok());
    }

    #[test]
    fn failed_update_leaves_row_and_driver_slot_untouched() {
        let store = RideStore::new();
        let booked = store.insert_active(ride(Uuid::new_v4())).unwrap();
        let driver = Uuid::new_v4();

        let err = store
            .update_claiming_driver(&booked.id, driver, |_| {
                Err(AppError::InvalidState("nope".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(!store.has_active_claim(&driver));
        assert_eq!(store.get(&booked.id).unwrap().status, RideStatus::Pending);
    }

    #[test]
    fn active_rides_cannot_be_deleted() {
        let store = RideStore::new();
        let booked = store.insert_active(ride(Uuid::new_v4())).unwrap();

        assert!(matches!(
            store.remove_inactive(&booked.id),
            Err(AppError::InvalidState(_))
        ));

        store
            .update(&booked.id, |r| {
                r.status = RideStatus::Expired;
                Ok(())
            })
            .unwrap();
        assert!(store.remove_inactive(&booked.id).is_ok());
        assert!(matches!(
            store.remove_inactive(&booked.id),
            Err(AppError::NotFound(_))
        ));
    }
}
