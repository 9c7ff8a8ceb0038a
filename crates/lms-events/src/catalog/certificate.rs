//! Certificate domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateIssued {
    pub certificate_id: String,
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    /// Human-readable serial printed on the certificate.
    pub certificate_number: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRevoked {
    pub certificate_id: String,
    pub course_id: String,
    pub student_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

domain_event!(CertificateIssued => super::event_types::CERTIFICATE_ISSUED);
domain_event!(CertificateRevoked => super::event_types::CERTIFICATE_REVOKED);
