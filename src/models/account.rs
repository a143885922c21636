use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Pending,
    Approved,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub driver_license: Option<String>,
    pub driver_status: Option<DriverStatus>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, email: String, phone: Option<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            role,
            driver_license: None,
            driver_status: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn driver(
        name: String,
        email: String,
        phone: Option<String>,
        license: String,
        status: DriverStatus,
    ) -> Self {
        Self {
            driver_license: Some(license),
            driver_status: Some(status),
            ..Self::new(name, email, phone, Role::Driver)
        }
    }

    pub fn is_approved_driver(&self) -> bool {
        self.role == Role::Driver && self.driver_status == Some(DriverStatus::Approved)
    }
}
