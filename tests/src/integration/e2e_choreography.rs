//! # End-to-End Choreography Tests
//!
//! The learner journey with each service on its own broker-backed bus:
//!
//! ```text
//! [payment-service] ──payment.completed──▶ [lms.events] ──▶ enrollment-service.payment_completed
//!                                               │
//!                                               ├──▶ progress-service.course_lesson_completed
//!                                               ├──▶ certificate-service.enrollment_completed
//!                                               └──▶ notification-service.certificate_issued
//! ```
//!
//! ## Test Categories
//!
//! 1. **Happy Path**: payment to certificate email across six services
//! 2. **Out-of-Order Facts**: failures requeue until the missing fact arrives
//! 3. **Fan-Out and Competing Consumers**: per-service queues vs shared queues
//! 4. **Restart Recovery**: a stopped service catches up from its queue

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use lms_bus::{handler_fn, routing_key, EventBus, EventBusExt, MemoryBroker};
    use lms_events::catalog::{CertificateIssued, EmailRequested, EnrollmentCreated};
    use lms_events::{event_types, EventEnvelope};
    use lms_telemetry::metrics;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::integration::fixtures::{
        lesson_completed, observe, payment_completed, service_bus, trace_metadata, Platform,
        COURSE_ID, LESSONS,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const WAIT: Duration = Duration::from_secs(5);

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(WAIT, rx.recv())
            .await
            .expect("timeout waiting for event")
            .expect("channel closed")
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    async fn platform(broker: &MemoryBroker) -> Platform {
        let platform = Platform::on_broker(broker);
        platform.connect().await.unwrap();
        platform.start_services().await.unwrap();
        platform
    }

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_learning_journey_across_services() {
        let broker = MemoryBroker::new();
        let platform = platform(&broker).await;
        let mut emails = observe::<EmailRequested>(&platform.observer).await.unwrap();

        platform.publish_course().await.unwrap();
        platform
            .payment
            .publish_event(&payment_completed("alice"), Some(trace_metadata("t-1")))
            .await
            .unwrap();
        for lesson in LESSONS {
            platform
                .course
                .publish_event(&lesson_completed("alice", lesson), None)
                .await
                .unwrap();
        }

        let email = recv(&mut emails).await;
        assert_eq!(email.payload.user_id, "alice");
        assert_eq!(email.payload.template, "certificate-issued");
        assert_eq!(email.payload.variables["courseId"], COURSE_ID);

        // Each service bound its own durable queue with the dotless routing key.
        let bindings = broker.bindings();
        assert!(bindings.iter().any(|b| {
            b.queue == "progress-service.course_lesson_completed"
                && b.routing_key == routing_key(event_types::LESSON_COMPLETED)
        }));
        assert!(bindings
            .iter()
            .any(|b| b.queue == "enrollment-service.payment_completed"));
    }

    // =============================================================================
    // OUT-OF-ORDER FACTS
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lesson_before_enrollment_is_redelivered() {
        let broker = MemoryBroker::new();
        let platform = platform(&broker).await;
        let mut certificates = observe::<CertificateIssued>(&platform.observer)
            .await
            .unwrap();
        let failures = metrics::HANDLER_FAILURES
            .with_label_values(&["broker", event_types::LESSON_COMPLETED]);
        let failures_before = failures.get();

        // Lessons first: progress-service knows neither course nor enrollment yet.
        for lesson in LESSONS {
            platform
                .course
                .publish_event(&lesson_completed("bob", lesson), None)
                .await
                .unwrap();
        }
        let queue = "progress-service.course_lesson_completed";
        eventually(|| broker.queue_stats(queue).unwrap().requeued > 0).await;

        platform.publish_course().await.unwrap();
        platform
            .payment
            .publish_event(&payment_completed("bob"), None)
            .await
            .unwrap();

        let certificate = recv(&mut certificates).await;
        assert_eq!(certificate.payload.student_id, "bob");
        assert_eq!(certificate.payload.enrollment_id, "enr-bob");

        eventually(|| broker.queue_stats(queue).unwrap().acked == 2).await;
        let stats = broker.queue_stats(queue).unwrap();
        assert_eq!(stats.rejected, 0);
        assert!(failures.get() > failures_before);
    }

    #[tokio::test]
    async fn test_garbage_on_the_exchange_is_dropped() {
        let broker = MemoryBroker::new();
        let platform = platform(&broker).await;
        let mut enrollments = observe::<EnrollmentCreated>(&platform.observer)
            .await
            .unwrap();

        broker
            .route(
                "lms.events",
                &routing_key(event_types::PAYMENT_COMPLETED),
                b"\x00\x01 not json",
                Default::default(),
            )
            .unwrap();
        platform
            .payment
            .publish_event(&payment_completed("carol"), None)
            .await
            .unwrap();

        let enrollment = recv(&mut enrollments).await;
        assert_eq!(enrollment.payload.student_id, "carol");

        let queue = "enrollment-service.payment_completed";
        eventually(|| broker.queue_stats(queue).unwrap().rejected == 1).await;
        assert_eq!(broker.queue_stats(queue).unwrap().ready, 0);
    }

    // =============================================================================
    // FAN-OUT AND COMPETING CONSUMERS
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_services_get_copies_instances_share_work() {
        let broker = MemoryBroker::new();
        let publisher = service_bus(&broker, "user-service");
        let analytics = service_bus(&broker, "analytics-service");
        let mailer_a = service_bus(&broker, "notification-service");
        let mailer_b = service_bus(&broker, "notification-service");
        for bus in [&publisher, &analytics, &mailer_a, &mailer_b] {
            bus.connect().await.unwrap();
        }

        let analytics_seen = Arc::new(AtomicUsize::new(0));
        let mailer_seen = Arc::new(AtomicUsize::new(0));
        let count = |counter: &Arc<AtomicUsize>| {
            let counter = counter.clone();
            handler_fn(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        analytics
            .subscribe(event_types::USER_REGISTERED, count(&analytics_seen))
            .await
            .unwrap();
        mailer_a
            .subscribe(event_types::USER_REGISTERED, count(&mailer_seen))
            .await
            .unwrap();
        mailer_b
            .subscribe(event_types::USER_REGISTERED, count(&mailer_seen))
            .await
            .unwrap();
        assert_eq!(
            broker.consumer_count("notification-service.user_registered"),
            2
        );

        for i in 0..20 {
            publisher
                .publish(
                    event_types::USER_REGISTERED,
                    serde_json::json!({"userId": format!("u{i}")}),
                    None,
                )
                .await
                .unwrap();
        }

        eventually(|| {
            analytics_seen.load(Ordering::SeqCst) == 20 && mailer_seen.load(Ordering::SeqCst) == 20
        })
        .await;
        // Each message went to exactly one notification-service instance.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mailer_seen.load(Ordering::SeqCst), 20);
    }

    // =============================================================================
    // RESTART RECOVERY
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stopped_service_catches_up_after_reconnect() {
        let broker = MemoryBroker::new();
        let platform = platform(&broker).await;
        let mut emails = observe::<EmailRequested>(&platform.observer).await.unwrap();

        platform.notification.disconnect().await.unwrap();

        let publisher = service_bus(&broker, "certificate-admin");
        publisher.connect().await.unwrap();
        let certificate = CertificateIssued {
            certificate_id: "cert-manual".into(),
            enrollment_id: "enr-dave".into(),
            course_id: COURSE_ID.into(),
            student_id: "dave".into(),
            certificate_number: "LMS-900001".into(),
            timestamp: chrono::Utc::now(),
        };
        publisher.publish_event(&certificate, None).await.unwrap();

        let queue = "notification-service.certificate_issued";
        eventually(|| broker.queue_stats(queue).unwrap().ready == 1).await;
        assert!(
            timeout(Duration::from_millis(100), emails.recv())
                .await
                .is_err(),
            "no email while the service is down"
        );

        platform.notification.connect().await.unwrap();
        let email: EventEnvelope<EmailRequested> = recv(&mut emails).await;
        assert_eq!(email.payload.user_id, "dave");
        assert_eq!(
            email.payload.variables["certificateNumber"],
            serde_json::json!("LMS-900001")
        );
    }
}
