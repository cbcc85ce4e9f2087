mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::Harness;
use rust_decimal::Decimal;
use uuid::Uuid;
use vpos_payments::domain::callback::CallbackParams;
use vpos_payments::domain::payment::{
    OrderEvent, OrderRef, Payment, PaymentInitiation, PaymentOutcome, PaymentStatus,
};
use vpos_payments::error::PaymentError;
use vpos_payments::gateways::mock::{approved_details, declined_details};
use vpos_payments::repo::memory_store::{pending_payment, MemoryStore};
use vpos_payments::repo::PaymentStore;
use vpos_payments::service::payment_service::PaymentService;

fn callback(payment_id: &str, order_id: Uuid) -> CallbackParams {
    CallbackParams {
        payment_id: Some(payment_id.to_string()),
        opaque: Some(order_id.to_string()),
        ..Default::default()
    }
}

async fn event_types(h: &Harness, order_id: Uuid) -> Vec<String> {
    h.store
        .order_events(order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn checkout_initializes_a_processing_payment() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("241225-00042").await;

    let init = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(5000), None)
        .await
        .unwrap();

    assert_eq!(init.payment_id, "P-1");
    assert_eq!(init.order_id, "241225-00042");
    assert!(init.payment_url.starts_with("https://servicestest.ameriabank.am/VPOS/Payments/Pay?id=P-1"));

    let sent = h.gateway.init_requests().await;
    assert_eq!(sent[0].order_id, 3_584_344);
    assert_eq!(sent[0].opaque.as_deref(), Some(order_id.to_string().as_str()));
    assert_eq!(sent[0].description.as_deref(), Some("Order 241225-00042"));

    let payments = h.store.payments_for_order(order_id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Processing);
    assert_eq!(payments[0].provider_order_id, Some(3_584_344));
    assert_eq!(h.store.order(order_id).await.unwrap().payment_status, "processing");
    assert_eq!(event_types(&h, order_id).await, vec!["payment_initiated"]);
}

#[tokio::test]
async fn allowed_test_card_completes_payment() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("241225-00042").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(5000), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(5000), "****1234"))
        .await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.message, "Payment completed successfully");
    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.card_last4.as_deref(), Some("1234"));
    assert!(payment.completed_at.is_some());

    let order = h.store.order(order_id).await.unwrap();
    assert_eq!(order.payment_status, "paid");
    assert_eq!(order.status, "confirmed");
    assert!(order.paid_at.is_some());

    let events = h.store.order_events(order_id).await.unwrap();
    let completed = events.iter().find(|e| e.event_type == "payment_completed").unwrap();
    assert_eq!(completed.data["testMode"], true);
    assert_eq!(completed.data["cardValidation"]["cardLast4"], "1234");
}

#[tokio::test]
async fn unlisted_test_card_fails_despite_bank_approval() {
    let h = Harness::active(true, &["9999"]).await;
    let order_id = h.order("241225-00042").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(5000), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(5000), "****1234"))
        .await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(!result.success);
    assert!(result.message.contains("1234"), "message was {}", result.message);
    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.error_code.as_deref(), Some("TEST_CARD_REJECTED"));

    let order = h.store.order(order_id).await.unwrap();
    assert_eq!(order.payment_status, "failed");
    assert_eq!(order.status, "pending");
}

#[tokio::test]
async fn empty_allow_list_rejects_every_sandbox_card() {
    let h = Harness::active(true, &[]).await;
    let order_id = h.order("A-100").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(100), "****4242"))
        .await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();
    assert!(!result.success);
    assert!(result.message.contains("No allowed test cards configured"));
}

#[tokio::test]
async fn production_skips_the_card_gate() {
    let h = Harness::active(false, &[]).await;
    let order_id = h.order("A-101").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(100), "4083******4242"))
        .await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();
    assert!(result.success);

    let events = h.store.order_events(order_id).await.unwrap();
    let completed = events.iter().find(|e| e.event_type == "payment_completed").unwrap();
    assert!(completed.data.get("testMode").is_none());
}

#[tokio::test]
async fn forged_success_code_is_ignored() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-102").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();

    // The bank still reports an unfinished session.
    let params = CallbackParams {
        response_code: Some("00".into()),
        message: Some("Approved".into()),
        ..callback("P-1", order_id)
    };
    let result = h.payment_service.handle_callback(params).await.unwrap();

    assert!(!result.success);
    assert_eq!(h.gateway.details_calls(), 1);
    assert_eq!(h.store.payments_for_order(order_id).await[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn declined_payment_records_bank_reason() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-103").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", declined_details("P-1", Decimal::from(100), "0116", "Insufficient funds"))
        .await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.message, "Insufficient funds");
    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.error_code.as_deref(), Some("0116"));
    assert!(payment.failed_at.is_some());

    let events = h.store.order_events(order_id).await.unwrap();
    let failed = events.iter().find(|e| e.event_type == "payment_failed").unwrap();
    assert_eq!(failed.data["errorMessage"], "Insufficient funds");
}

#[tokio::test]
async fn silent_decline_is_explained_in_order_language() {
    let h = Harness::active(true, &["1234"]).await;
    let mut order = OrderRef::new("A-113");
    order.language = Some("ru".into());
    let order_id = order.id;
    h.store.insert_order(order).await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    let mut details = declined_details("P-1", Decimal::from(100), "20", "");
    details.resp_message = None;
    h.gateway.script_details("P-1", details).await;

    let result = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.message, "Неверное имя пользователя или пароль");
    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.error_message.as_deref(), Some(result.message.as_str()));
}

/// Lets a second writer land the same outcome first, the way a webhook can beat the
/// shopper's redirect.
struct RacingStore {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait::async_trait]
impl PaymentStore for RacingStore {
    async fn find_order(&self, order_id: Uuid) -> anyhow::Result<Option<OrderRef>> {
        self.inner.find_order(order_id).await
    }

    async fn find_open_payment(&self, order_id: Uuid, provider: &str) -> anyhow::Result<Option<Payment>> {
        self.inner.find_open_payment(order_id, provider).await
    }

    async fn find_payment_by_transaction(&self, provider: &str, transaction_id: &str) -> anyhow::Result<Option<Payment>> {
        self.inner.find_payment_by_transaction(provider, transaction_id).await
    }

    async fn find_order_payment(
        &self,
        order_id: Uuid,
        provider: &str,
        transaction_id: &str,
    ) -> anyhow::Result<Option<Payment>> {
        self.inner.find_order_payment(order_id, provider, transaction_id).await
    }

    async fn record_initiation(&self, initiation: PaymentInitiation) -> anyhow::Result<Payment> {
        self.inner.record_initiation(initiation).await
    }

    async fn apply_outcome(&self, outcome: PaymentOutcome) -> anyhow::Result<Payment> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.apply_outcome(outcome.clone()).await?;
        }
        self.inner.apply_outcome(outcome).await
    }

    async fn order_events(&self, order_id: Uuid) -> anyhow::Result<Vec<OrderEvent>> {
        self.inner.order_events(order_id).await
    }
}

#[tokio::test]
async fn callback_losing_a_race_reports_the_winner() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-114").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(5000), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(5000), "****1234"))
        .await;

    let racing: Arc<dyn PaymentStore> = Arc::new(RacingStore {
        inner: h.store.clone(),
        raced: AtomicBool::new(false),
    });
    let service = PaymentService::new(racing, h.config_service.clone());

    let result = service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.order_id, "A-114");
    assert_eq!(h.store.payments_for_order(order_id).await[0].status, PaymentStatus::Completed);
    let completed = event_types(&h, order_id)
        .await
        .into_iter()
        .filter(|t| t == "payment_completed")
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn second_initialize_reuses_the_session() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-104").await;

    let first = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    let second = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();

    assert_eq!(first.payment_id, second.payment_id);
    assert_eq!(first.payment_url, second.payment_url);
    assert_eq!(h.gateway.init_calls(), 1);
    assert_eq!(h.store.payments_for_order(order_id).await.len(), 1);
}

#[tokio::test]
async fn pending_row_is_promoted_not_duplicated() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-105").await;
    let pending = pending_payment(order_id, Decimal::from(100), "AMD");
    let pending_id = pending.id;
    h.store.insert_payment(pending).await;

    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();

    let payments = h.store.payments_for_order(order_id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, pending_id);
    assert_eq!(payments[0].provider_transaction_id.as_deref(), Some("P-1"));
}

#[tokio::test]
async fn rejected_init_keeps_bank_message_and_writes_nothing() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-106").await;
    h.gateway.reject_init("01", "Order already exists").await;

    let err = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "payment_init_failed");
    assert_eq!(err.detail(), "Order already exists");
    assert!(h.store.payments_for_order(order_id).await.is_empty());
    assert!(event_types(&h, order_id).await.is_empty());
}

#[tokio::test]
async fn unreachable_bank_is_retryable() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-107").await;
    h.gateway.set_unreachable(true);

    let err = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::GatewayTransport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn initialize_rejects_unknown_order_and_bad_amount() {
    let h = Harness::active(true, &["1234"]).await;

    let err = h
        .payment_service
        .initialize_payment(Uuid::new_v4(), Decimal::from(100), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::OrderNotFound(_)));

    let order_id = h.order("A-108").await;
    let err = h
        .payment_service
        .initialize_payment(order_id, Decimal::ZERO, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(h.gateway.init_calls(), 0);
}

#[tokio::test]
async fn inactive_or_missing_config_blocks_payments() {
    let h = Harness::unconfigured();
    let order_id = h.order("A-109").await;
    let err = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ConfigMissing));

    let h = Harness::active(true, &["1234"]).await;
    h.config_service.deactivate().await.unwrap();
    let order_id = h.order("A-110").await;
    let err = h
        .payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ConfigInactive));
    assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn callback_without_payment_id_is_invalid() {
    let h = Harness::active(true, &["1234"]).await;
    let err = h
        .payment_service
        .handle_callback(CallbackParams {
            opaque: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InvalidCallback(_)));
    assert_eq!(err.detail(), "PaymentID is required in callback parameters");
    assert_eq!(h.gateway.details_calls(), 0);
}

#[tokio::test]
async fn callback_for_unknown_payment_is_not_found() {
    let h = Harness::active(true, &["1234"]).await;
    let err = h
        .payment_service
        .handle_callback(callback("P-404", Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::PaymentNotFound(_)));
}

#[tokio::test]
async fn duplicate_callback_does_not_rewrite() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-111").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(100), "****1234"))
        .await;

    let first = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();
    let version_after_first = h.store.payments_for_order(order_id).await[0].version;
    let second = h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    assert!(first.success && second.success);
    assert_eq!(h.gateway.details_calls(), 2);
    assert_eq!(h.store.payments_for_order(order_id).await[0].version, version_after_first);
    assert_eq!(
        event_types(&h, order_id).await,
        vec!["payment_initiated", "payment_completed"]
    );
}

#[tokio::test]
async fn callback_falls_back_to_transaction_lookup() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-112").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(100), "****1234"))
        .await;

    let params = CallbackParams {
        payment_id: Some("P-1".into()),
        opaque: Some("not-a-uuid".into()),
        ..Default::default()
    };
    let result = h.payment_service.handle_callback(params).await.unwrap();
    assert!(result.success);
    assert_eq!(result.order_id, "A-112");
}

#[tokio::test]
async fn verify_completes_payment_but_leaves_order_alone() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-113").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(2500), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(2500), "****1234"))
        .await;

    let verified = h.payment_service.verify_payment("P-1").await.unwrap();

    assert_eq!(verified.status, PaymentStatus::Completed);
    assert_eq!(verified.order_id, "A-113");
    assert_eq!(verified.amount, Decimal::from(2500));
    assert_eq!(verified.currency, "AMD");
    assert_eq!(h.store.order(order_id).await.unwrap().payment_status, "processing");
    assert_eq!(event_types(&h, order_id).await, vec!["payment_initiated"]);
}

#[tokio::test]
async fn verify_of_unfinished_session_only_stores_response() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-114").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(100), None)
        .await
        .unwrap();

    let verified = h.payment_service.verify_payment("P-1").await.unwrap();

    assert_eq!(verified.status, PaymentStatus::Processing);
    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.provider_response.as_ref().unwrap()["PaymentState"], "Created");
}

#[tokio::test]
async fn refund_requires_completed_payment() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-115").await;
    let mut pending = pending_payment(order_id, Decimal::from(100), "AMD");
    pending.provider_transaction_id = Some("P-77".into());
    h.store.insert_payment(pending).await;

    let err = h.payment_service.refund_payment("P-77", None).await.unwrap_err();

    assert!(matches!(err, PaymentError::InvalidRefund(_)));
    assert_eq!(err.detail(), "Can only refund completed payments");
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn partial_then_full_refund_amounts() {
    let h = Harness::active(true, &["1234"]).await;
    let order_id = h.order("A-116").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(5000), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(5000), "****1234"))
        .await;
    h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    let err = h
        .payment_service
        .refund_payment("P-1", Some(Decimal::from(6000)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRefund(_)));

    let refund = h
        .payment_service
        .refund_payment("P-1", Some(Decimal::from(2000)))
        .await
        .unwrap();
    assert!(refund.success);
    assert_eq!(h.gateway.refund_requests().await, vec![("P-1".to_string(), Some(Decimal::from(2000)))]);

    let payment = &h.store.payments_for_order(order_id).await[0];
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert!(payment.provider_response.as_ref().unwrap().get("refund").is_some());

    let events = h.store.order_events(order_id).await.unwrap();
    let refunded = events.iter().find(|e| e.event_type == "payment_refunded").unwrap();
    assert_eq!(refunded.data["refundAmount"], 2000);
}

#[tokio::test]
async fn full_refund_marks_refunded() {
    let h = Harness::active(false, &[]).await;
    let order_id = h.order("A-117").await;
    h.payment_service
        .initialize_payment(order_id, Decimal::from(300), None)
        .await
        .unwrap();
    h.gateway
        .script_details("P-1", approved_details("P-1", Decimal::from(300), "****1111"))
        .await;
    h.payment_service.handle_callback(callback("P-1", order_id)).await.unwrap();

    let refund = h.payment_service.refund_payment("P-1", None).await.unwrap();

    assert_eq!(refund.message, "OK");
    assert_eq!(h.store.payments_for_order(order_id).await[0].status, PaymentStatus::Refunded);
}
