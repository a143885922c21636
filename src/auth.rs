//! Caller identity and the capability checks every operation goes through.
//!
//! Identity is issued elsewhere; requests carry the authenticated account id in
//! the `X-Account-Id` header and it is trusted as-is once it resolves to an
//! active account.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, Role};
use crate::models::ride::Ride;
use crate::state::AppState;

pub const ACCOUNT_HEADER: &str = "x-account-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    BookRides,
    DriveRides,
    /// Reading one's own driving history; suspended drivers keep it.
    DriverHistory,
    Administer,
}

#[derive(Debug, Clone)]
pub struct Caller {
    account: Account,
}

impl Caller {
    pub fn new(account: Account) -> Self {
        Self { account }
    }

    pub fn id(&self) -> Uuid {
        self.account.id
    }

    pub fn role(&self) -> Role {
        self.account.role
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn is_admin(&self) -> bool {
        self.account.role == Role::Admin
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        let denied = |msg: &str| Err(AppError::Unauthorized(msg.to_string()));

        match (capability, self.account.role) {
            (Capability::BookRides, Role::Rider) => Ok(()),
            (Capability::BookRides, _) => denied("only riders can book rides"),
            (Capability::DriveRides, Role::Driver) if self.account.is_approved_driver() => Ok(()),
            (Capability::DriveRides, Role::Driver) => {
                denied("your driver account is not approved yet")
            }
            (Capability::DriveRides, _) => denied("only drivers can serve rides"),
            (Capability::DriverHistory, Role::Driver) => Ok(()),
            (Capability::DriverHistory, _) => denied("only drivers have driving history"),
            (Capability::Administer, Role::Admin) => Ok(()),
            (Capability::Administer, _) => denied("admin access required"),
        }
    }

    /// The rider or the bound driver.
    pub fn require_party(&self, ride: &Ride) -> Result<(), AppError> {
        if ride.is_party(self.account.id) {
            Ok(())
        } else {
            Err(AppError::Unauthorized(
                "you are not a party to this ride".to_string(),
            ))
        }
    }

    pub fn can_view(&self, ride: &Ride) -> bool {
        self.is_admin() || ride.is_party(self.account.id)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACCOUNT_HEADER)
            .ok_or_else(|| AppError::Unauthenticated("missing X-Account-Id header".to_string()))?;

        let id = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Unauthenticated("malformed account id".to_string()))?;

        let account = state
            .accounts
            .get(&id)
            .ok_or_else(|| AppError::Unauthenticated("unknown account".to_string()))?;

        if !account.is_active {
            return Err(AppError::Unauthorized("account is deactivated".to_string()));
        }

        Ok(Caller::new(account))
    }
}
