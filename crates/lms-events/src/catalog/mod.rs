//! # Event Catalog
//!
//! The fixed vocabulary of event types and the payload shape of each.
//!
//! ## Naming
//!
//! Type strings follow `<domain>.<subentity>.<pastTenseAction>`, except for
//! top-level domain actions which omit the subentity (`course.created`).
//! Consumers match on the literal strings, so the asymmetry is kept as-is and
//! published strings are never renamed.
//!
//! ## Domains
//!
//! | Domain | Module |
//! |--------|--------|
//! | user | [`user`] |
//! | course | [`course`] |
//! | enrollment | [`enrollment`] |
//! | assessment | [`assessment`] |
//! | payment | [`payment`] |
//! | certificate | [`certificate`] |
//! | notification | [`notification`] |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binds a payload struct to its catalog type string.
macro_rules! domain_event {
    ($payload:ty => $event_type:expr) => {
        impl $crate::catalog::DomainEvent for $payload {
            const EVENT_TYPE: &'static str = $event_type;
        }
    };
}

pub mod assessment;
pub mod certificate;
pub mod course;
pub mod enrollment;
pub mod notification;
pub mod payment;
pub mod user;

pub use assessment::*;
pub use certificate::*;
pub use course::*;
pub use enrollment::*;
pub use notification::*;
pub use payment::*;
pub use user::*;

/// A payload with a fixed place in the catalog.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The literal type string this payload is published under.
    const EVENT_TYPE: &'static str;

    /// Domain this payload belongs to.
    fn domain() -> Option<Domain> {
        Domain::of(Self::EVENT_TYPE)
    }
}

/// Every event type string, grouped by domain.
pub mod event_types {
    // user
    pub const USER_REGISTERED: &str = "user.registered";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const USER_EMAIL_VERIFIED: &str = "user.email.verified";
    pub const USER_ROLE_CHANGED: &str = "user.role.changed";

    // course
    pub const COURSE_CREATED: &str = "course.created";
    pub const COURSE_UPDATED: &str = "course.updated";
    pub const COURSE_PUBLISHED: &str = "course.published";
    pub const COURSE_ARCHIVED: &str = "course.archived";
    pub const COURSE_DELETED: &str = "course.deleted";
    pub const SECTION_CREATED: &str = "course.section.created";
    pub const LESSON_CREATED: &str = "course.lesson.created";
    pub const LESSON_COMPLETED: &str = "course.lesson.completed";

    // enrollment
    pub const ENROLLMENT_CREATED: &str = "enrollment.created";
    pub const ENROLLMENT_COMPLETED: &str = "enrollment.completed";
    pub const ENROLLMENT_CANCELLED: &str = "enrollment.cancelled";
    pub const ENROLLMENT_PROGRESS_UPDATED: &str = "enrollment.progress.updated";

    // assessment
    pub const QUIZ_SUBMITTED: &str = "assessment.quiz.submitted";
    pub const QUIZ_GRADED: &str = "assessment.quiz.graded";
    pub const ASSIGNMENT_SUBMITTED: &str = "assessment.assignment.submitted";
    pub const ASSIGNMENT_GRADED: &str = "assessment.assignment.graded";

    // payment
    pub const PAYMENT_INITIATED: &str = "payment.initiated";
    pub const PAYMENT_COMPLETED: &str = "payment.completed";
    pub const PAYMENT_FAILED: &str = "payment.failed";
    pub const PAYMENT_REFUNDED: &str = "payment.refunded";

    // certificate
    pub const CERTIFICATE_ISSUED: &str = "certificate.issued";
    pub const CERTIFICATE_REVOKED: &str = "certificate.revoked";

    // notification
    pub const NOTIFICATION_SENT: &str = "notification.sent";
    pub const NOTIFICATION_FAILED: &str = "notification.failed";
    pub const EMAIL_REQUESTED: &str = "notification.email.requested";

    /// All catalog entries. Append only.
    pub const ALL: &[&str] = &[
        USER_REGISTERED,
        USER_UPDATED,
        USER_DELETED,
        USER_EMAIL_VERIFIED,
        USER_ROLE_CHANGED,
        COURSE_CREATED,
        COURSE_UPDATED,
        COURSE_PUBLISHED,
        COURSE_ARCHIVED,
        COURSE_DELETED,
        SECTION_CREATED,
        LESSON_CREATED,
        LESSON_COMPLETED,
        ENROLLMENT_CREATED,
        ENROLLMENT_COMPLETED,
        ENROLLMENT_CANCELLED,
        ENROLLMENT_PROGRESS_UPDATED,
        QUIZ_SUBMITTED,
        QUIZ_GRADED,
        ASSIGNMENT_SUBMITTED,
        ASSIGNMENT_GRADED,
        PAYMENT_INITIATED,
        PAYMENT_COMPLETED,
        PAYMENT_FAILED,
        PAYMENT_REFUNDED,
        CERTIFICATE_ISSUED,
        CERTIFICATE_REVOKED,
        NOTIFICATION_SENT,
        NOTIFICATION_FAILED,
        EMAIL_REQUESTED,
    ];
}

/// Whether a type string is part of the catalog.
///
/// Informational only: the bus accepts unknown types.
#[must_use]
pub fn is_known(event_type: &str) -> bool {
    event_types::ALL.contains(&event_type)
}

/// Top-level domain of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    User,
    Course,
    Enrollment,
    Assessment,
    Payment,
    Certificate,
    Notification,
}

impl Domain {
    /// All domains in catalog order.
    #[must_use]
    pub fn all() -> &'static [Domain] {
        &[
            Self::User,
            Self::Course,
            Self::Enrollment,
            Self::Assessment,
            Self::Payment,
            Self::Certificate,
            Self::Notification,
        ]
    }

    /// First segment of every type string in this domain.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Course => "course",
            Self::Enrollment => "enrollment",
            Self::Assessment => "assessment",
            Self::Payment => "payment",
            Self::Certificate => "certificate",
            Self::Notification => "notification",
        }
    }

    /// Domain an event type belongs to, judged by its first segment.
    #[must_use]
    pub fn of(event_type: &str) -> Option<Domain> {
        let head = event_type.split('.').next()?;
        Self::all().iter().copied().find(|d| d.prefix() == head)
    }

    /// Catalog entries of this domain.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        event_types::ALL
            .iter()
            .copied()
            .filter(|t| Domain::of(t) == Some(*self))
            .collect()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
