use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::callback::CallbackParams;
use crate::domain::gateway_config::GatewayConfig;
use crate::domain::order_id::map_order_id;
use crate::domain::payment::{
    amount_json, CallbackResult, NewOrderEvent, OrderEventType, OrderPaymentUpdate, OrderRef, Payment,
    PaymentInitResult, PaymentInitiation, PaymentOutcome, PaymentStatus, RefundResult, VerifyResult, PROVIDER,
};
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{InitPaymentRequest, PaymentDetails, PaymentLanguage};
use crate::repo::PaymentStore;
use crate::service::config_service::PaymentConfigService;
use crate::service::test_card_gate::{card_last4_for_record, validate_test_card, TestCardVerdict};

const COMPLETED_MESSAGE: &str = "Payment completed successfully";
const TEST_CARD_REJECTED: &str = "TEST_CARD_REJECTED";

/// Drives a payment through the bank: initiation, callback, reconciliation and refund.
///
/// Config is read on every call through [`PaymentConfigService`]. The bank is always
/// re-queried before any state change; values echoed on the redirect are only used to
/// find the payment.
#[derive(Clone)]
pub struct PaymentService {
    pub store: Arc<dyn PaymentStore>,
    pub config_service: PaymentConfigService,
}

/// What the bank's answer means for a payment once the sandbox gate has had its say.
struct Verdict {
    success: bool,
    message: String,
    error_code: Option<String>,
    card_check: Option<TestCardVerdict>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, config_service: PaymentConfigService) -> Self {
        Self { store, config_service }
    }

    pub async fn initialize_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> PaymentResult<PaymentInitResult> {
        const KIND: &str = "payment_init_error";
        tracing::info!(%order_id, %amount, "initializing payment");

        let order = self
            .store
            .find_order(order_id)
            .await
            .map_err(PaymentError::wrap(KIND))?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        if amount <= Decimal::ZERO {
            return Err(PaymentError::validation("Payment amount must be greater than zero"));
        }

        let lang = order_language(&order);

        let open = self
            .store
            .find_open_payment(order.id, PROVIDER)
            .await
            .map_err(PaymentError::wrap(KIND))?;

        let config = self.config_service.active_config().await?;
        let gateway = self.config_service.gateway_for(&config)?;

        if let Some(transaction_id) = open.as_ref().and_then(|p| p.provider_transaction_id.clone()) {
            tracing::info!(order_number = %order.number, payment_id = %transaction_id, "payment already initialized, reusing");
            return Ok(PaymentInitResult {
                payment_url: gateway.payment_url(&transaction_id, lang)?,
                payment_id: transaction_id,
                order_id: order.number,
            });
        }

        let provider_order_id = map_order_id(&order.number, config.order_id_range(), Utc::now());
        let response = gateway
            .init_payment(InitPaymentRequest {
                order_id: provider_order_id,
                amount,
                currency: config.currency.clone(),
                description: Some(description.unwrap_or_else(|| format!("Order {}", order.number))),
                opaque: Some(order.id.to_string()),
            })
            .await?;

        let transaction_id = response
            .payment_id
            .clone()
            .ok_or_else(|| PaymentError::internal(KIND, "gateway accepted the payment without a PaymentID"))?;

        let initiation = PaymentInitiation {
            existing: open.map(|p| (p.id, p.version)),
            order_id: order.id,
            amount,
            currency: config.currency.clone(),
            provider_order_id,
            transaction_id: transaction_id.clone(),
            provider_response: response.to_json(),
            event: NewOrderEvent {
                order_id: order.id,
                event_type: OrderEventType::PaymentInitiated,
                data: json!({
                    "provider": PROVIDER,
                    "paymentId": transaction_id,
                    "amount": amount_json(amount),
                    "currency": config.currency,
                }),
            },
        };
        self.store
            .record_initiation(initiation)
            .await
            .map_err(PaymentError::wrap(KIND))?;

        tracing::info!(
            order_number = %order.number,
            payment_id = %transaction_id,
            provider_order_id,
            "payment initialized"
        );

        Ok(PaymentInitResult {
            payment_url: gateway.payment_url(&transaction_id, lang)?,
            payment_id: transaction_id,
            order_id: order.number,
        })
    }

    pub async fn handle_callback(&self, params: CallbackParams) -> PaymentResult<CallbackResult> {
        const KIND: &str = "callback_processing_error";

        let payment_id = params
            .payment_id
            .clone()
            .ok_or_else(|| PaymentError::InvalidCallback("PaymentID is required in callback parameters".to_string()))?;
        tracing::info!(
            payment_id = %payment_id,
            opaque = params.opaque.as_deref().unwrap_or_default(),
            claimed_code = params.response_code.as_deref().unwrap_or_default(),
            "handling payment callback"
        );

        let config = self.config_service.active_config().await?;
        let gateway = self.config_service.gateway_for(&config)?;
        let details = gateway.get_payment_details(&payment_id).await?;

        let payment = self
            .locate_payment(&payment_id, params.opaque.as_deref())
            .await
            .map_err(PaymentError::wrap(KIND))?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.clone()))?;
        let order = self.order_of(&payment, KIND).await?;

        let verdict = judge(&details, &config, gateway.is_sandbox(), order_language(&order), &payment_id, &order.number);
        let next = if verdict.success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };

        if !payment.status.can_transition_to(next) {
            tracing::info!(
                payment_id = %payment_id,
                status = %payment.status,
                "payment already settled, callback ignored"
            );
            return Ok(settled_result(&payment, &order, &payment_id));
        }

        let now = Utc::now();
        let card_last4 = details.card_number.as_deref().and_then(card_last4_for_record);

        let mut event_data = json!({
            "provider": PROVIDER,
            "paymentId": payment_id,
            "responseCode": details.response_code,
            "respCode": details.resp_code,
            "respMessage": details.resp_message,
            "paymentState": details.payment_state,
            "orderStatus": details.order_status,
            "amount": amount_json(payment.amount),
        });
        if config.test_mode {
            event_data["testMode"] = Value::Bool(true);
            event_data["cardValidation"] = match &card_last4 {
                Some(last4) => json!({
                    "cardLast4": last4,
                    "allowedCards": config.allowed_test_cards,
                    "strictMode": config.test_card_strict_mode,
                    "verdict": verdict.card_check.as_ref().map(|c| c.message.clone()),
                }),
                None => Value::Null,
            };
        }
        if !verdict.success {
            event_data["errorCode"] = json!(verdict.error_code);
            event_data["errorMessage"] = json!(verdict.message);
        }

        let mut updated = payment.clone();
        updated.status = next;
        updated.provider_response = Some(details.to_json());
        updated.card_last4 = card_last4;
        if verdict.success {
            updated.completed_at = Some(now);
            updated.failed_at = None;
            updated.error_code = None;
            updated.error_message = None;
        } else {
            updated.completed_at = None;
            updated.failed_at = Some(now);
            updated.error_code = verdict.error_code.clone();
            updated.error_message = Some(verdict.message.clone());
        }

        let outcome = PaymentOutcome {
            payment: updated,
            order_update: Some(OrderPaymentUpdate {
                order_id: order.id,
                payment_status: if verdict.success { "paid" } else { "failed" }.to_string(),
                status: verdict.success.then(|| "confirmed".to_string()),
                paid_at: verdict.success.then_some(now),
            }),
            event: Some(NewOrderEvent {
                order_id: order.id,
                event_type: if verdict.success {
                    OrderEventType::PaymentCompleted
                } else {
                    OrderEventType::PaymentFailed
                },
                data: event_data,
            }),
        };
        if let Err(err) = self.store.apply_outcome(outcome).await {
            let err = PaymentError::wrap(KIND)(err);
            if !matches!(err, PaymentError::ConcurrentModification(_)) {
                return Err(err);
            }

            // The redirect and the webhook raced; report whatever the winner wrote.
            let current = self
                .locate_payment(&payment_id, params.opaque.as_deref())
                .await
                .map_err(PaymentError::wrap(KIND))?
                .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.clone()))?;
            if current.status.is_open() {
                return Err(err);
            }
            tracing::info!(
                payment_id = %payment_id,
                status = %current.status,
                "payment settled by a concurrent callback"
            );
            return Ok(settled_result(&current, &order, &payment_id));
        }

        tracing::info!(
            payment_id = %payment_id,
            order_number = %order.number,
            success = verdict.success,
            "payment callback processed"
        );

        Ok(CallbackResult {
            success: verdict.success,
            order_id: order.number,
            payment_id,
            message: verdict.message,
        })
    }

    /// Reconciliation check. May complete the payment, never touches the order or the
    /// event log.
    pub async fn verify_payment(&self, payment_id: &str) -> PaymentResult<VerifyResult> {
        const KIND: &str = "verification_error";
        tracing::info!(payment_id, "verifying payment");

        let config = self.config_service.active_config().await?;
        let gateway = self.config_service.gateway_for(&config)?;
        let details = gateway.get_payment_details(payment_id).await?;

        let payment = self
            .store
            .find_payment_by_transaction(PROVIDER, payment_id)
            .await
            .map_err(PaymentError::wrap(KIND))?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        let order = self.order_of(&payment, KIND).await?;

        let mut updated = payment.clone();
        updated.provider_response = Some(details.to_json());

        if details.is_successful() && payment.status.can_transition_to(PaymentStatus::Completed) {
            let verdict = judge(&details, &config, gateway.is_sandbox(), order_language(&order), payment_id, &order.number);
            if verdict.success {
                updated.status = PaymentStatus::Completed;
                updated.completed_at = Some(Utc::now());
                updated.card_last4 = details.card_number.as_deref().and_then(card_last4_for_record);
            }
        }

        let written = self
            .store
            .apply_outcome(PaymentOutcome {
                payment: updated,
                order_update: None,
                event: None,
            })
            .await
            .map_err(PaymentError::wrap(KIND))?;

        Ok(VerifyResult {
            status: written.status,
            order_id: order.number,
            amount: written.amount,
            currency: written.currency,
        })
    }

    /// Full refund when `amount` is `None`.
    pub async fn refund_payment(&self, payment_id: &str, amount: Option<Decimal>) -> PaymentResult<RefundResult> {
        const KIND: &str = "refund_error";
        tracing::info!(payment_id, amount = ?amount, "processing refund");

        let config = self.config_service.active_config().await?;
        let gateway = self.config_service.gateway_for(&config)?;

        let payment = self
            .store
            .find_payment_by_transaction(PROVIDER, payment_id)
            .await
            .map_err(PaymentError::wrap(KIND))?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::InvalidRefund("Can only refund completed payments".to_string()));
        }
        if let Some(requested) = amount {
            if requested <= Decimal::ZERO {
                return Err(PaymentError::InvalidRefund("Refund amount must be greater than zero".to_string()));
            }
            if requested > payment.amount {
                return Err(PaymentError::InvalidRefund(format!(
                    "Refund amount {requested} exceeds payment amount {}",
                    payment.amount
                )));
            }
        }

        let refund = gateway.refund_payment(payment_id, amount).await?;

        let next = match amount {
            Some(requested) if requested < payment.amount => PaymentStatus::PartiallyRefunded,
            _ => PaymentStatus::Refunded,
        };

        let mut provider_response = payment.provider_response.clone().unwrap_or_else(|| json!({}));
        match provider_response.as_object_mut() {
            Some(object) => {
                object.insert("refund".to_string(), refund.to_json());
            }
            None => provider_response = json!({ "refund": refund.to_json() }),
        }

        let mut updated = payment.clone();
        updated.status = next;
        updated.provider_response = Some(provider_response);

        self.store
            .apply_outcome(PaymentOutcome {
                payment: updated,
                order_update: None,
                event: Some(NewOrderEvent {
                    order_id: payment.order_id,
                    event_type: OrderEventType::PaymentRefunded,
                    data: json!({
                        "provider": PROVIDER,
                        "paymentId": payment_id,
                        "refundAmount": amount_json(amount.unwrap_or(payment.amount)),
                    }),
                }),
            })
            .await
            .map_err(PaymentError::wrap(KIND))?;

        tracing::info!(payment_id, status = %next, "refund processed");

        Ok(RefundResult {
            success: true,
            message: refund
                .response_message
                .or(refund.resp_message)
                .unwrap_or_else(|| "Refund processed successfully".to_string()),
        })
    }

    /// By the order echoed in `opaque` first, then by transaction id alone.
    pub async fn locate_payment(&self, payment_id: &str, opaque: Option<&str>) -> anyhow::Result<Option<Payment>> {
        if let Some(order_id) = opaque.and_then(|o| Uuid::parse_str(o).ok()) {
            if let Some(payment) = self.store.find_order_payment(order_id, PROVIDER, payment_id).await? {
                return Ok(Some(payment));
            }
        }
        self.store.find_payment_by_transaction(PROVIDER, payment_id).await
    }

    async fn order_of(&self, payment: &Payment, kind: &'static str) -> PaymentResult<OrderRef> {
        self.store
            .find_order(payment.order_id)
            .await
            .map_err(PaymentError::wrap(kind))?
            .ok_or_else(|| PaymentError::OrderNotFound(payment.order_id.to_string()))
    }
}

fn order_language(order: &OrderRef) -> PaymentLanguage {
    order.language.as_deref().map(PaymentLanguage::from_code).unwrap_or_default()
}

/// Applies the three-condition success rule, then the sandbox test-card gate.
fn judge(
    details: &PaymentDetails,
    config: &GatewayConfig,
    sandbox: bool,
    lang: PaymentLanguage,
    payment_id: &str,
    order_number: &str,
) -> Verdict {
    if !details.is_successful() {
        return Verdict {
            success: false,
            message: details.failure_message(lang),
            error_code: Some(details.failure_code()),
            card_check: None,
        };
    }

    if !sandbox {
        return Verdict {
            success: true,
            message: COMPLETED_MESSAGE.to_string(),
            error_code: None,
            card_check: None,
        };
    }

    let check = validate_test_card(details.card_number.as_deref(), &config.test_card_policy(), true);
    if check.valid {
        return Verdict {
            success: true,
            message: COMPLETED_MESSAGE.to_string(),
            error_code: None,
            card_check: Some(check),
        };
    }

    tracing::warn!(
        security_event = true,
        payment_id,
        order_number,
        card_last4 = check.card_last4.as_deref().unwrap_or_default(),
        reason = %check.message,
        "sandbox payment rejected by test card gate"
    );
    Verdict {
        success: false,
        message: check.message.clone(),
        error_code: Some(TEST_CARD_REJECTED.to_string()),
        card_check: Some(check),
    }
}

fn settled_result(payment: &Payment, order: &OrderRef, payment_id: &str) -> CallbackResult {
    let success = matches!(
        payment.status,
        PaymentStatus::Completed | PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded
    );
    CallbackResult {
        success,
        order_id: order.number.clone(),
        payment_id: payment_id.to_string(),
        message: if success {
            COMPLETED_MESSAGE.to_string()
        } else {
            payment
                .error_message
                .clone()
                .unwrap_or_else(|| "Payment failed".to_string())
        },
    }
}
