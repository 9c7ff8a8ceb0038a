//! Notification domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::NotificationChannel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSent {
    pub notification_id: String,
    pub user_id: String,
    pub channel: NotificationChannel,
    pub template: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFailed {
    pub notification_id: String,
    pub user_id: String,
    pub channel: NotificationChannel,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Ask the notification service to render and send an email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequested {
    pub user_id: String,
    pub to: String,
    pub subject: String,
    pub template: String,
    /// Template variables.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

domain_event!(NotificationSent => super::event_types::NOTIFICATION_SENT);
domain_event!(NotificationFailed => super::event_types::NOTIFICATION_FAILED);
domain_event!(EmailRequested => super::event_types::EMAIL_REQUESTED);
