//! Enrollment domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCreated {
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Every lesson of the course has been completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCompleted {
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCancelled {
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentProgressUpdated {
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    /// 0.0 to 100.0.
    pub progress_percent: f64,
    pub completed_lessons: u32,
    pub total_lessons: u32,
    pub timestamp: DateTime<Utc>,
}

domain_event!(EnrollmentCreated => super::event_types::ENROLLMENT_CREATED);
domain_event!(EnrollmentCompleted => super::event_types::ENROLLMENT_COMPLETED);
domain_event!(EnrollmentCancelled => super::event_types::ENROLLMENT_CANCELLED);
domain_event!(EnrollmentProgressUpdated => super::event_types::ENROLLMENT_PROGRESS_UPDATED);
