//! # Platform Fixtures
//!
//! Just enough of each platform service to drive a learner from payment to
//! certificate email:
//!
//! ```text
//! payment.completed ──▶ [enrollment] ──▶ enrollment.created
//!                                              │
//! course.lesson.created ──▶ [progress] ◀───────┘
//! course.lesson.completed ──▶ [progress] ──▶ enrollment.progress.updated
//!                                       └──▶ enrollment.completed
//!                                                   │
//!                         [certificate] ◀───────────┘ ──▶ certificate.issued
//!                                                                │
//!                         [notification] ◀───────────────────────┘ ──▶ notification.email.requested
//! ```
//!
//! Services only ever talk through the bus they are given.

use anyhow::Context;
use chrono::Utc;
use lms_bus::{BrokerEventBus, BusConfig, BusError, EventBus, EventBusExt, MemoryBroker};
use lms_events::catalog::{
    CertificateIssued, EmailRequested, EnrollmentCompleted, EnrollmentCreated,
    EnrollmentProgressUpdated, LessonCompleted, LessonCreated, PaymentCompleted,
};
use lms_events::{DomainEvent, EventEnvelope, EventMetadata, LessonType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type Bus = Arc<dyn EventBus>;

pub const COURSE_ID: &str = "course-rust-101";
pub const SECTION_ID: &str = "section-1";
pub const LESSONS: [&str; 2] = ["lesson-ownership", "lesson-borrowing"];

/// The bus each service uses.
pub struct Platform {
    pub course: Bus,
    pub payment: Bus,
    pub enrollment: Bus,
    pub progress: Bus,
    pub certificate: Bus,
    pub notification: Bus,
    /// Bus the test observes outcomes on.
    pub observer: Bus,
}

impl Platform {
    /// Every service on one bus, as in a single process.
    pub fn single(bus: Bus) -> Self {
        Self {
            course: bus.clone(),
            payment: bus.clone(),
            enrollment: bus.clone(),
            progress: bus.clone(),
            certificate: bus.clone(),
            notification: bus.clone(),
            observer: bus,
        }
    }

    /// One broker-backed bus per service, all on the same broker.
    pub fn on_broker(broker: &MemoryBroker) -> Self {
        Self {
            course: service_bus(broker, "course-service"),
            payment: service_bus(broker, "payment-service"),
            enrollment: service_bus(broker, "enrollment-service"),
            progress: service_bus(broker, "progress-service"),
            certificate: service_bus(broker, "certificate-service"),
            notification: service_bus(broker, "notification-service"),
            observer: service_bus(broker, "test-observer"),
        }
    }

    fn all(&self) -> [&Bus; 7] {
        [
            &self.course,
            &self.payment,
            &self.enrollment,
            &self.progress,
            &self.certificate,
            &self.notification,
            &self.observer,
        ]
    }

    pub async fn connect(&self) -> Result<(), BusError> {
        for bus in self.all() {
            bus.connect().await?;
        }
        Ok(())
    }

    /// Register every service's subscriptions.
    pub async fn start_services(&self) -> Result<(), BusError> {
        start_enrollment_service(&self.enrollment).await?;
        start_progress_service(&self.progress).await?;
        start_certificate_service(&self.certificate).await?;
        start_notification_service(&self.notification).await?;
        Ok(())
    }

    /// Announce the course's lessons.
    pub async fn publish_course(&self) -> Result<(), BusError> {
        for (order, lesson_id) in (1u32..).zip(LESSONS) {
            let lesson = LessonCreated {
                lesson_id: lesson_id.to_string(),
                section_id: SECTION_ID.to_string(),
                course_id: COURSE_ID.to_string(),
                title: format!("Lesson {order}"),
                lesson_type: LessonType::Video,
                order,
                timestamp: Utc::now(),
            };
            self.course.publish_event(&lesson, None).await?;
        }
        Ok(())
    }
}

/// A broker-backed bus whose queues are prefixed with `service`.
pub fn service_bus(broker: &MemoryBroker, service: &str) -> Bus {
    let config = BusConfig {
        service_name: Some(service.to_string()),
        ..BusConfig::default()
    };
    Arc::new(BrokerEventBus::new(broker.clone(), config))
}

pub fn payment_completed(student_id: &str) -> PaymentCompleted {
    PaymentCompleted {
        payment_id: format!("pay-{student_id}"),
        user_id: student_id.to_string(),
        course_id: COURSE_ID.to_string(),
        amount: 49.0,
        currency: "USD".to_string(),
        transaction_id: format!("txn-{student_id}"),
        timestamp: Utc::now(),
    }
}

pub fn lesson_completed(student_id: &str, lesson_id: &str) -> LessonCompleted {
    LessonCompleted {
        lesson_id: lesson_id.to_string(),
        section_id: SECTION_ID.to_string(),
        course_id: COURSE_ID.to_string(),
        student_id: student_id.to_string(),
        timestamp: Utc::now(),
    }
}

pub fn trace_metadata(trace_id: &str) -> EventMetadata {
    let mut metadata = EventMetadata::new();
    metadata.insert("traceId".into(), serde_json::json!(trace_id));
    metadata
}

/// Forward every `E` the bus delivers into a channel.
pub async fn observe<E: DomainEvent>(
    bus: &Bus,
) -> Result<mpsc::UnboundedReceiver<EventEnvelope<E>>, BusError> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe_event(move |envelope: EventEnvelope<E>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(envelope);
            Ok(())
        }
    })
    .await?;
    Ok(rx)
}

/// Paid learners become enrolled.
pub async fn start_enrollment_service(bus: &Bus) -> Result<(), BusError> {
    let publisher = bus.clone();
    bus.subscribe_event(move |envelope: EventEnvelope<PaymentCompleted>| {
        let bus = publisher.clone();
        async move {
            let payment = envelope.payload;
            let enrolled = EnrollmentCreated {
                enrollment_id: format!("enr-{}", payment.user_id),
                course_id: payment.course_id,
                student_id: payment.user_id,
                timestamp: Utc::now(),
            };
            bus.publish_event(&enrolled, envelope.metadata).await?;
            Ok(())
        }
    })
    .await
}

#[derive(Default)]
struct ProgressState {
    /// Lesson ids by course.
    lessons: HashMap<String, HashSet<String>>,
    /// (course, student) → (enrollment id, completed lesson ids)
    enrollments: HashMap<(String, String), (String, HashSet<String>)>,
}

/// Tracks lesson completion per enrollment.
///
/// A completion for an unknown course or enrollment is an error, so the
/// broker backend redelivers it until the missing fact has arrived.
pub async fn start_progress_service(bus: &Bus) -> Result<(), BusError> {
    let state = Arc::new(Mutex::new(ProgressState::default()));

    let lessons = state.clone();
    bus.subscribe_event(move |envelope: EventEnvelope<LessonCreated>| {
        let state = lessons.clone();
        async move {
            let lesson = envelope.payload;
            state
                .lock()
                .lessons
                .entry(lesson.course_id)
                .or_default()
                .insert(lesson.lesson_id);
            Ok(())
        }
    })
    .await?;

    let enrollments = state.clone();
    bus.subscribe_event(move |envelope: EventEnvelope<EnrollmentCreated>| {
        let state = enrollments.clone();
        async move {
            let enrollment = envelope.payload;
            state.lock().enrollments.insert(
                (enrollment.course_id, enrollment.student_id),
                (enrollment.enrollment_id, HashSet::new()),
            );
            Ok(())
        }
    })
    .await?;

    let publisher = bus.clone();
    bus.subscribe_event(move |envelope: EventEnvelope<LessonCompleted>| {
        let state = state.clone();
        let bus = publisher.clone();
        async move {
            let lesson = envelope.payload;
            let (progress, completed) = {
                let mut guard = state.lock();
                let state = &mut *guard;
                let total = state
                    .lessons
                    .get(&lesson.course_id)
                    .map_or(0, HashSet::len);
                anyhow::ensure!(total > 0, "course {} has no known lessons", lesson.course_id);

                let key = (lesson.course_id.clone(), lesson.student_id.clone());
                let (enrollment_id, done) = state.enrollments.get_mut(&key).with_context(|| {
                    format!(
                        "no enrollment for {} in {}",
                        lesson.student_id, lesson.course_id
                    )
                })?;
                let newly_done = done.insert(lesson.lesson_id.clone());

                let completed_lessons = u32::try_from(done.len())?;
                let total_lessons = u32::try_from(total)?;
                let progress = EnrollmentProgressUpdated {
                    enrollment_id: enrollment_id.clone(),
                    course_id: lesson.course_id.clone(),
                    student_id: lesson.student_id.clone(),
                    progress_percent: f64::from(completed_lessons) * 100.0
                        / f64::from(total_lessons),
                    completed_lessons,
                    total_lessons,
                    timestamp: Utc::now(),
                };
                let completed = (newly_done && done.len() == total).then(|| EnrollmentCompleted {
                    enrollment_id: enrollment_id.clone(),
                    course_id: lesson.course_id.clone(),
                    student_id: lesson.student_id.clone(),
                    timestamp: Utc::now(),
                });
                (progress, completed)
            };

            bus.publish_event(&progress, envelope.metadata.clone())
                .await?;
            if let Some(completed) = completed {
                bus.publish_event(&completed, envelope.metadata).await?;
            }
            Ok(())
        }
    })
    .await
}

/// Completed enrollments earn a certificate.
pub async fn start_certificate_service(bus: &Bus) -> Result<(), BusError> {
    let publisher = bus.clone();
    let serial = Arc::new(AtomicU32::new(0));
    bus.subscribe_event(move |envelope: EventEnvelope<EnrollmentCompleted>| {
        let bus = publisher.clone();
        let serial = serial.clone();
        async move {
            let enrollment = envelope.payload;
            let number = serial.fetch_add(1, Ordering::SeqCst) + 1;
            let certificate = CertificateIssued {
                certificate_id: format!("cert-{}", enrollment.enrollment_id),
                enrollment_id: enrollment.enrollment_id,
                course_id: enrollment.course_id,
                student_id: enrollment.student_id,
                certificate_number: format!("LMS-{number:06}"),
                timestamp: Utc::now(),
            };
            bus.publish_event(&certificate, envelope.metadata).await?;
            Ok(())
        }
    })
    .await
}

/// Issued certificates are announced by email.
pub async fn start_notification_service(bus: &Bus) -> Result<(), BusError> {
    let publisher = bus.clone();
    bus.subscribe_event(move |envelope: EventEnvelope<CertificateIssued>| {
        let bus = publisher.clone();
        async move {
            let certificate = envelope.payload;
            let mut variables = serde_json::Map::new();
            variables.insert(
                "certificateNumber".into(),
                certificate.certificate_number.clone().into(),
            );
            variables.insert("courseId".into(), certificate.course_id.clone().into());

            let email = EmailRequested {
                user_id: certificate.student_id.clone(),
                to: format!("{}@learners.test", certificate.student_id),
                subject: "Your certificate is ready".to_string(),
                template: "certificate-issued".to_string(),
                variables,
                timestamp: Utc::now(),
            };
            bus.publish_event(&email, envelope.metadata).await?;
            Ok(())
        }
    })
    .await
}
