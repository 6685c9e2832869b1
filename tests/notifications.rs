mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Harness;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use travel_booking::models::{BookingStatus, Occupancy, RequestContext};
use travel_booking::services::notification::{
    CircuitBreaker, CircuitState, HttpNotificationGateway, NotificationError, NotificationEvent,
    NotificationGateway, NotificationKind,
};

fn gateway(server: &MockServer, threshold: u32) -> HttpNotificationGateway {
    HttpNotificationGateway::new(
        format!("{}/hooks/booking", server.uri()),
        Duration::from_secs(2),
        CircuitBreaker::new(threshold, 60),
    )
    .unwrap()
}

async fn sample_event(kind: NotificationKind) -> NotificationEvent {
    let h = Harness::new().await;
    let booking = h
        .state
        .bookings
        .create_soft_booking(h.booking_request(Occupancy::adults(2)), &RequestContext::default())
        .await
        .unwrap();
    NotificationEvent::new(kind, booking)
}

#[tokio::test]
async fn webhook_receives_the_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/booking"))
        .and(body_partial_json(serde_json::json!({
            "type": "CONFIRMATION",
            "booking": { "status": "SOFT", "display_price": 529 }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, 3);
    let event = sample_event(NotificationKind::Confirmation).await;

    gateway.notify(&event).await.unwrap();
    assert_eq!(gateway.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway(&server, 2);
    let event = sample_event(NotificationKind::Cancellation).await;

    for _ in 0..2 {
        let err = gateway.notify(&event).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected(503)));
    }
    assert_eq!(gateway.circuit_state(), CircuitState::Open);

    // Refused locally; the mock's expect(2) fails the test if this reaches it.
    let err = gateway.notify(&event).await.unwrap_err();
    assert!(matches!(err, NotificationError::CircuitOpen));
}

#[tokio::test]
async fn failing_webhook_never_fails_the_booking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier: Arc<dyn NotificationGateway> = Arc::new(gateway(&server, 1));
    let h = Harness::with_notifier(notifier).await;
    let ctx = RequestContext::user("agent-1");
    let booking = h
        .state
        .bookings
        .create_soft_booking(h.booking_request(Occupancy::adults(2)), &ctx)
        .await
        .unwrap();

    let confirmed = h.state.bookings.confirm(booking.id, &ctx).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    let cancelled = h.state.bookings.cancel(booking.id, &ctx, None).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
}
