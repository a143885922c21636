//! Concurrent in-process tables. Each table hands out row-scoped write guards,
//! which is what the engine relies on for its read-modify-write steps.

pub mod accounts;
pub mod payments;
pub mod rides;

pub use accounts::AccountStore;
pub use payments::PaymentStore;
pub use rides::RideStore;
