//! HTTP-level tests of the checkout gateway client against a mock provider.

use wiremock::matchers::{bearer_token, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cinebook::config::CheckoutConfig;
use cinebook::services::payment::{
    CheckoutClient, CheckoutGateway, GatewayError, OpenSessionRequest, SessionMetadata,
};

fn config(base_url: &str) -> CheckoutConfig {
    CheckoutConfig {
        base_url: base_url.to_string(),
        api_key: "sk_test_123".to_string(),
        currency: "usd".to_string(),
        success_url: "http://localhost/success".to_string(),
        cancel_url: "http://localhost/cancel".to_string(),
        webhook_secret: "whsec_test".to_string(),
        breaker_failure_threshold: 2,
        breaker_cooldown_secs: 60,
    }
}

fn request(booking_id: Option<i64>) -> OpenSessionRequest {
    OpenSessionRequest {
        amount_cents: 2300,
        product_name: "Screening 42 at Grand".to_string(),
        description: "Seats: A1, A2".to_string(),
        customer_email: "b@example.com".to_string(),
        metadata: SessionMetadata {
            booking_id,
            buyer_id: 9,
            show_id: 1,
        },
    }
}

#[tokio::test]
async fn open_session_posts_amount_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(bearer_token("sk_test_123"))
        .and(body_partial_json(serde_json::json!({
            "amountCents": 2300,
            "currency": "usd",
            "metadata": { "bookingId": 7, "buyerId": 9, "showId": 1 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "id": "cs_abc",
            "url": "https://pay.example/cs_abc",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CheckoutClient::from_config(&config(&server.uri()));
    let session = client.open_session(request(Some(7))).await.unwrap();
    assert_eq!(session.id, "cs_abc");
    assert_eq!(session.url, "https://pay.example/cs_abc");
}

#[tokio::test]
async fn provider_decline_surfaces_as_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "message": "amount below minimum",
        })))
        .mount(&server)
        .await;

    let client = CheckoutClient::from_config(&config(&server.uri()));
    let err = client.open_session(request(None)).await.unwrap_err();
    match err {
        GatewayError::Rejected(message) => assert!(message.contains("amount below minimum")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn session_state_reports_payment_status_and_booking_hint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_abc"))
        .and(bearer_token("sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_abc",
            "paymentStatus": "paid",
            "metadata": { "bookingId": 7, "buyerId": 9, "showId": 1 },
        })))
        .mount(&server)
        .await;

    let client = CheckoutClient::from_config(&config(&server.uri()));
    let state = client.session_state("cs_abc").await.unwrap();
    assert_eq!(state.payment_status, "paid");
    assert_eq!(state.metadata.unwrap().booking_id, Some(7));
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures_and_stops_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(500))
        // Threshold is 2; the third attempt must not reach the wire.
        .expect(2)
        .mount(&server)
        .await;

    let client = CheckoutClient::from_config(&config(&server.uri()));
    assert!(matches!(
        client.open_session(request(None)).await.unwrap_err(),
        GatewayError::Http(_)
    ));
    assert!(matches!(
        client.open_session(request(None)).await.unwrap_err(),
        GatewayError::Http(_)
    ));
    assert!(matches!(
        client.open_session(request(None)).await.unwrap_err(),
        GatewayError::CircuitOpen
    ));
}
