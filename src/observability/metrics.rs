use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::models::ride::RideStatus;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_transitions_total: IntCounterVec,
    pub active_rides: IntGauge,
    pub payments_total: IntCounterVec,
    pub gateway_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_transitions_total = IntCounterVec::new(
            Opts::new("ride_transitions_total", "Ride status transitions by target status"),
            &["status"],
        )
        .expect("valid ride_transitions_total metric");

        let active_rides = IntGauge::new("active_rides", "Rides currently in an active status")
            .expect("valid active_rides metric");

        let payments_total = IntCounterVec::new(
            Opts::new("payments_total", "Payment outcomes by method"),
            &["method", "outcome"],
        )
        .expect("valid payments_total metric");

        let gateway_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_latency_seconds",
                "Latency of payment gateway calls in seconds",
            ),
            &["operation", "outcome"],
        )
        .expect("valid gateway_latency_seconds metric");

        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(active_rides.clone()))
            .expect("register active_rides");
        registry
            .register(Box::new(payments_total.clone()))
            .expect("register payments_total");
        registry
            .register(Box::new(gateway_latency_seconds.clone()))
            .expect("register gateway_latency_seconds");

        Self {
            registry,
            ride_transitions_total,
            active_rides,
            payments_total,
            gateway_latency_seconds,
        }
    }

    /// Records `from -> to`; `from` is `None` for a new booking.
    pub fn record_transition(&self, from: Option<RideStatus>, to: RideStatus) {
        self.ride_transitions_total
            .with_label_values(&[to.as_str()])
            .inc();

        let was_active = from.is_some_and(|status| status.is_active());
        match (was_active, to.is_active()) {
            (false, true) => self.active_rides.inc(),
            (true, false) => self.active_rides.dec(),
            _ => {}
        }
    }

    pub fn record_payment(&self, method: &str, outcome: &str) {
        self.payments_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
