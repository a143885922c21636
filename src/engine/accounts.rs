use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{Caller, Capability};
use crate::error::{AppError, ValidationErrors};
use crate::models::account::{Account, DriverStatus, Role};
use crate::state::AppState;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CreateDriverRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub driver_license: Option<String>,
    pub driver_status: Option<DriverStatus>,
}

struct Identity {
    name: String,
    email: String,
    phone: Option<String>,
}

fn validate_identity(
    errors: &mut ValidationErrors,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
) -> Identity {
    let name = name.map(|v| v.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        errors.add("name", "the name field is required");
    } else if name.chars().count() > 255 {
        errors.add("name", "the name may not be greater than 255 characters");
    }

    let email = email.map(|v| v.trim().to_lowercase()).unwrap_or_default();
    if email.is_empty() {
        errors.add("email", "the email field is required");
    } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.add("email", "the email must be a valid email address");
    }

    let phone = phone.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if phone.as_ref().is_some_and(|p| p.chars().count() > 20) {
        errors.add("phone", "the phone may not be greater than 20 characters");
    }

    Identity { name, email, phone }
}

/// Public sign-up. Only riders register themselves.
pub fn register_rider(state: &AppState, request: RegisterRequest) -> Result<Account, AppError> {
    let mut errors = ValidationErrors::default();
    let identity = validate_identity(&mut errors, request.name, request.email, request.phone);
    errors.into_result()?;

    let account = state.accounts.insert(Account::new(
        identity.name,
        identity.email,
        identity.phone,
        Role::Rider,
    ))?;
    info!(account_id = %account.id, "rider registered");
    Ok(account)
}

pub fn create_driver(
    state: &AppState,
    caller: &Caller,
    request: CreateDriverRequest,
) -> Result<Account, AppError> {
    caller.require(Capability::Administer)?;

    let mut errors = ValidationErrors::default();
    let identity = validate_identity(&mut errors, request.name, request.email, request.phone);
    let license = request
        .driver_license
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    if license.is_empty() {
        errors.add("driver_license", "the driver_license field is required");
    }
    errors.into_result()?;

    let account = state.accounts.insert(Account::driver(
        identity.name,
        identity.email,
        identity.phone,
        license,
        request.driver_status.unwrap_or(DriverStatus::Approved),
    ))?;
    info!(account_id = %account.id, "driver account created");
    Ok(account)
}

pub fn update_driver_status(
    state: &AppState,
    caller: &Caller,
    account_id: Uuid,
    status: DriverStatus,
) -> Result<Account, AppError> {
    caller.require(Capability::Administer)?;

    let account = state.accounts.update(&account_id, |account| {
        if account.role != Role::Driver {
            return Err(AppError::InvalidState(
                "account is not a driver".to_string(),
            ));
        }
        account.driver_status = Some(status);
        Ok(())
    })?;

    info!(account_id = %account.id, status = ?status, "driver status updated");
    Ok(account)
}

pub fn list_accounts(
    state: &AppState,
    caller: &Caller,
    role: Option<Role>,
) -> Result<Vec<Account>, AppError> {
    caller.require(Capability::Administer)?;
    Ok(state.accounts.list(role))
}

pub fn delete_account(
    state: &AppState,
    caller: &Caller,
    account_id: Uuid,
) -> Result<Account, AppError> {
    caller.require(Capability::Administer)?;

    let account = state
        .accounts
        .get(&account_id)
        .ok_or_else(|| AppError::NotFound(format!("account {account_id} not found")))?;
    if account.role == Role::Admin {
        return Err(AppError::InvalidState(
            "admin accounts cannot be deleted".to_string(),
        ));
    }
    if state.rides.has_active_claim(&account_id) {
        return Err(AppError::Conflict(
            "account is party to an active ride".to_string(),
        ));
    }

    let removed = state
        .accounts
        .remove(&account_id)
        .ok_or_else(|| AppError::NotFound(format!("account {account_id} not found")))?;
    info!(account_id = %removed.id, "account deleted");
    Ok(removed)
}
