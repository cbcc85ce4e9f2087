mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use vpos_payments::crypto::envelope::SecretCipher;
use vpos_payments::error::PaymentError;
use vpos_payments::gateways::ameria::AmeriaGatewayFactory;
use vpos_payments::gateways::{InitPaymentRequest, PaymentLanguage, VposGateway};
use vpos_payments::repo::memory_store::MemoryStore;
use vpos_payments::service::config_service::PaymentConfigService;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer, timeout_ms: u64) -> Arc<dyn VposGateway> {
    let store = MemoryStore::new();
    let service = PaymentConfigService::new(
        Arc::new(store),
        SecretCipher::from_secret(common::TEST_SECRET).unwrap(),
        Arc::new(AmeriaGatewayFactory::new(Some(server.uri()), timeout_ms)),
    );
    let config = service.save(common::config_patch(true, &["1234"])).await.unwrap();
    service.gateway_for(&config).unwrap()
}

fn init_request() -> InitPaymentRequest {
    InitPaymentRequest {
        order_id: 3_584_344,
        amount: Decimal::from(5000),
        currency: "AMD".into(),
        description: Some("Order 241225-00042".into()),
        opaque: Some("order-uuid".into()),
    }
}

#[tokio::test]
async fn init_payment_sends_credentials_and_numeric_currency() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/InitPayment"))
        .and(body_partial_json(json!({
            "ClientID": "client-1",
            "Username": "merchant",
            "Password": "s3cret",
            "OrderID": 3584344,
            "Amount": 5000,
            "Currency": "051",
            "Opaque": "order-uuid",
            "Timeout": 1200,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PaymentID": "A1B2-C3",
            "ResponseCode": 1,
            "ResponseMessage": "OK",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2_000).await;
    let response = client.init_payment(init_request()).await.unwrap();

    assert_eq!(response.payment_id.as_deref(), Some("A1B2-C3"));
    let url = client.payment_url("A1B2-C3", PaymentLanguage::Ru).unwrap();
    assert_eq!(url, format!("{}/Payments/Pay?id=A1B2-C3&lang=ru", server.uri()));
}

#[tokio::test]
async fn init_rejection_carries_bank_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/InitPayment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PaymentID": null,
            "ResponseCode": "01",
            "ResponseMessage": "Order with this ID already exists",
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, 2_000)
        .await
        .init_payment(init_request())
        .await
        .unwrap_err();

    match err {
        PaymentError::GatewayApplication { kind, code, message } => {
            assert_eq!(kind, "payment_init_failed");
            assert_eq!(code.as_deref(), Some("01"));
            assert_eq!(message, "Order with this ID already exists");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn payment_details_are_read_leniently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/GetPaymentDetails"))
        .and(body_partial_json(json!({"PaymentID": "A1B2-C3", "Username": "merchant"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ResponseCode": "00",
            "PaymentState": "Successful",
            "OrderStatus": "2",
            "Amount": 5000.0,
            "CardNumber": "****1234",
            "ClientName": "TEST CARDHOLDER",
        })))
        .mount(&server)
        .await;

    let details = client_for(&server, 2_000)
        .await
        .get_payment_details("A1B2-C3")
        .await
        .unwrap();

    assert!(details.is_successful());
    assert_eq!(details.amount, Some(Decimal::from(5000)));
    assert_eq!(details.to_json()["ClientName"], "TEST CARDHOLDER");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["Password"], "s3cret");
    assert!(body.get("ClientID").is_none(), "details request carried ClientID: {body}");
}

#[tokio::test]
async fn refund_failure_uses_code_table_when_message_missing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/RefundPayment"))
        .and(body_partial_json(json!({"PaymentID": "A1B2-C3", "Amount": 2000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ResponseCode": "0116"})))
        .mount(&server)
        .await;

    let err = client_for(&server, 2_000)
        .await
        .refund_payment("A1B2-C3", Some(Decimal::from(2000)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "refund_failed");
    assert!(!err.detail().is_empty());
}

#[tokio::test]
async fn http_error_and_timeout_are_transport_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/GetPaymentDetails"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/CancelPayment"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ResponseCode": "00"}))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 100).await;

    let err = client.get_payment_details("A1B2-C3").await.unwrap_err();
    assert!(matches!(err, PaymentError::GatewayTransport(_)));
    assert!(err.detail().contains("503"));

    let err = client.cancel_payment("A1B2-C3").await.unwrap_err();
    assert!(matches!(err, PaymentError::GatewayTransport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn connection_test_reports_bank_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VPOS/InitPayment"))
        .and(body_partial_json(json!({"Amount": 10, "Description": "Connection test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PaymentID": "T-1",
            "ResponseCode": "1",
            "ResponseMessage": "OK",
        })))
        .mount(&server)
        .await;

    let check = client_for(&server, 2_000).await.test_connection().await;
    assert!(check.success, "{}", check.message);
}
