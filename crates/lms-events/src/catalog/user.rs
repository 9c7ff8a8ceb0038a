//! User domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::UserRole;

/// A new account was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub timestamp: DateTime<Utc>,
}

/// Profile fields changed. `updated_fields` lists the changed field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdated {
    pub user_id: String,
    pub updated_fields: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeleted {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEmailVerified {
    pub user_id: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

/// An administrator changed a user's role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleChanged {
    pub user_id: String,
    pub previous_role: UserRole,
    pub new_role: UserRole,
    /// Id of the user who made the change.
    pub changed_by: String,
    pub timestamp: DateTime<Utc>,
}

domain_event!(UserRegistered => super::event_types::USER_REGISTERED);
domain_event!(UserUpdated => super::event_types::USER_UPDATED);
domain_event!(UserDeleted => super::event_types::USER_DELETED);
domain_event!(UserEmailVerified => super::event_types::USER_EMAIL_VERIFIED);
domain_event!(UserRoleChanged => super::event_types::USER_ROLE_CHANGED);
