use std::sync::Arc;

use tokio::sync::broadcast;

use crate::gateway::{CallbackUrls, PaymentGateway};
use crate::models::ride::{Ride, RideEvent};
use crate::observability::metrics::Metrics;
use crate::store::{AccountStore, PaymentStore, RideStore};

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub callbacks: CallbackUrls,
}

impl PaymentSettings {
    pub fn new(currency: impl Into<String>, public_base_url: &str) -> Self {
        Self {
            currency: currency.into(),
            callbacks: CallbackUrls::under(public_base_url),
        }
    }
}

pub struct AppState {
    pub accounts: AccountStore,
    pub rides: RideStore,
    pub payments: PaymentStore,
    pub gateway: Arc<dyn PaymentGateway>,
    pub payment_settings: PaymentSettings,
    pub ride_events_tx: broadcast::Sender<RideEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payment_settings: PaymentSettings,
        event_buffer_size: usize,
    ) -> Self {
        let (ride_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            accounts: AccountStore::new(),
            rides: RideStore::new(),
            payments: PaymentStore::new(),
            gateway,
            payment_settings,
            ride_events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Fire-and-forget notification of a ride's new state.
    pub fn publish(&self, ride: &Ride) {
        let _ = self.ride_events_tx.send(RideEvent::from(ride));
    }
}
