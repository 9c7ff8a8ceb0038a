//! # In-Process Choreography Flows
//!
//! The learner journey with every service sharing one in-process bus.
//!
//! ## Properties Tested
//!
//! 1. **Synchronous cascade**: by the time the first `publish` returns, every
//!    downstream reaction has already run.
//! 2. **Failure propagation**: a failing downstream handler surfaces to the
//!    original publisher.
//! 3. **Metadata propagation**: correlation metadata follows the chain.
//! 4. **Shutdown**: disconnect drops every subscription.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lms_bus::{BusError, EventBus, EventBusExt, InMemoryEventBus};
    use lms_events::catalog::{
        CertificateIssued, EmailRequested, EnrollmentCompleted, EnrollmentProgressUpdated,
    };
    use lms_events::event_types;

    use crate::integration::fixtures::{
        lesson_completed, observe, payment_completed, trace_metadata, Platform, LESSONS,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn platform() -> (Arc<InMemoryEventBus>, Platform) {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.connect().await.unwrap();
        let platform = Platform::single(bus.clone());
        platform.start_services().await.unwrap();
        platform.publish_course().await.unwrap();
        (bus, platform)
    }

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_learning_journey_completes_synchronously() {
        let (_, platform) = platform().await;
        let mut progress = observe::<EnrollmentProgressUpdated>(&platform.observer)
            .await
            .unwrap();
        let mut emails = observe::<EmailRequested>(&platform.observer).await.unwrap();

        platform
            .payment
            .publish_event(&payment_completed("alice"), None)
            .await
            .unwrap();
        for lesson in LESSONS {
            platform
                .course
                .publish_event(&lesson_completed("alice", lesson), None)
                .await
                .unwrap();
        }

        // No waiting: dispatch finished inside publish.
        let first = progress.try_recv().unwrap();
        let second = progress.try_recv().unwrap();
        assert_eq!(first.payload.completed_lessons, 1);
        assert!((first.payload.progress_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(second.payload.completed_lessons, 2);
        assert_eq!(second.payload.total_lessons, 2);

        let email = emails.try_recv().unwrap();
        assert_eq!(email.event_type, event_types::EMAIL_REQUESTED);
        assert_eq!(email.payload.user_id, "alice");
        assert_eq!(email.payload.to, "alice@learners.test");
        assert_eq!(
            email.payload.variables["certificateNumber"],
            serde_json::json!("LMS-000001")
        );
        assert!(emails.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeated_lesson_does_not_reissue_certificate() {
        let (_, platform) = platform().await;
        let mut certificates = observe::<CertificateIssued>(&platform.observer)
            .await
            .unwrap();

        platform
            .payment
            .publish_event(&payment_completed("bob"), None)
            .await
            .unwrap();
        for lesson in LESSONS.iter().chain(LESSONS.iter()) {
            platform
                .course
                .publish_event(&lesson_completed("bob", lesson), None)
                .await
                .unwrap();
        }

        assert_eq!(
            certificates.try_recv().unwrap().payload.enrollment_id,
            "enr-bob"
        );
        assert!(certificates.try_recv().is_err());
    }

    // =============================================================================
    // FAILURE PROPAGATION
    // =============================================================================

    #[tokio::test]
    async fn test_downstream_failure_reaches_publisher() {
        let (_, platform) = platform().await;
        let mut completions = observe::<EnrollmentCompleted>(&platform.observer)
            .await
            .unwrap();

        // No payment, so no enrollment: the progress service rejects the lesson.
        let err = platform
            .course
            .publish_event(&lesson_completed("mallory", LESSONS[0]), None)
            .await
            .unwrap_err();

        match err {
            BusError::Handler { event_type, source } => {
                assert_eq!(event_type, event_types::LESSON_COMPLETED);
                assert!(source.to_string().contains("no enrollment for mallory"));
            }
            other => panic!("expected handler error, got {other:?}"),
        }
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_nested_failure_is_wrapped_per_hop() {
        let (bus, platform) = platform().await;
        bus.subscribe(
            event_types::ENROLLMENT_CREATED,
            lms_bus::handler_fn(|_| async { anyhow::bail!("seat limit reached") }),
        )
        .await
        .unwrap();

        let err = platform
            .payment
            .publish_event(&payment_completed("carol"), None)
            .await
            .unwrap_err();

        // payment.completed failed because its handler's publish of
        // enrollment.created failed.
        let BusError::Handler { event_type, source } = err else {
            panic!("expected handler error");
        };
        assert_eq!(event_type, event_types::PAYMENT_COMPLETED);
        let inner = source.downcast_ref::<BusError>().unwrap();
        assert!(matches!(
            inner,
            BusError::Handler { event_type, .. } if event_type == event_types::ENROLLMENT_CREATED
        ));
    }

    // =============================================================================
    // METADATA AND SHUTDOWN
    // =============================================================================

    #[tokio::test]
    async fn test_metadata_follows_the_chain() {
        let (_, platform) = platform().await;
        let mut emails = observe::<EmailRequested>(&platform.observer).await.unwrap();

        platform
            .payment
            .publish_event(&payment_completed("dana"), Some(trace_metadata("trace-7")))
            .await
            .unwrap();
        for lesson in LESSONS {
            platform
                .course
                .publish_event(
                    &lesson_completed("dana", lesson),
                    Some(trace_metadata("trace-7")),
                )
                .await
                .unwrap();
        }

        let email = emails.try_recv().unwrap();
        assert_eq!(
            email.metadata_value("traceId"),
            Some(&serde_json::json!("trace-7"))
        );
    }

    #[tokio::test]
    async fn test_disconnect_silences_every_service() {
        let (bus, platform) = platform().await;
        let mut emails = observe::<EmailRequested>(&platform.observer).await.unwrap();

        bus.disconnect().await.unwrap();
        assert_eq!(bus.handler_count(event_types::PAYMENT_COMPLETED), 0);

        // Publishing still works; nobody is listening.
        let envelope = platform
            .payment
            .publish_event(&payment_completed("erin"), None)
            .await
            .unwrap();
        assert_eq!(envelope.event_type, event_types::PAYMENT_COMPLETED);
        assert!(emails.try_recv().is_err());
    }
}
