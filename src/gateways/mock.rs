use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::gateway_config::GatewayConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{
    check_init_response, default_base_url, GatewayFactory, InitPaymentRequest, InitPaymentResponse,
    OperationResponse, PaymentDetails, VposGateway,
};

/// Scripted stand-in for the bank. Payment ids are handed out as `P-1`, `P-2`, ...
/// and every call is counted so tests can assert on gateway traffic.
pub struct MockVposGateway {
    sandbox: AtomicBool,
    unreachable: AtomicBool,
    base_url: String,
    next_id: AtomicUsize,
    init_calls: AtomicUsize,
    details_calls: AtomicUsize,
    refund_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    init_answer: Mutex<Option<InitPaymentResponse>>,
    details: Mutex<HashMap<String, PaymentDetails>>,
    refund_answer: Mutex<Option<OperationResponse>>,
    init_requests: Mutex<Vec<InitPaymentRequest>>,
    refund_requests: Mutex<Vec<(String, Option<Decimal>)>>,
}

impl MockVposGateway {
    pub fn new(sandbox: bool) -> Self {
        Self {
            sandbox: AtomicBool::new(sandbox),
            unreachable: AtomicBool::new(false),
            base_url: default_base_url(sandbox).to_string(),
            next_id: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            details_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            init_answer: Mutex::new(None),
            details: Mutex::new(HashMap::new()),
            refund_answer: Mutex::new(None),
            init_requests: Mutex::new(Vec::new()),
            refund_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_sandbox(&self, sandbox: bool) {
        self.sandbox.store(sandbox, Ordering::SeqCst);
    }

    /// Every call fails as if the bank could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Next `InitPayment` answers with this instead of issuing an id.
    pub async fn reject_init(&self, code: &str, message: &str) {
        *self.init_answer.lock().await = Some(InitPaymentResponse {
            payment_id: None,
            response_code: Some(code.to_string()),
            response_message: Some(message.to_string()),
        });
    }

    pub async fn script_details(&self, payment_id: &str, details: PaymentDetails) {
        self.details.lock().await.insert(payment_id.to_string(), details);
    }

    pub async fn script_refund(&self, response: OperationResponse) {
        *self.refund_answer.lock().await = Some(response);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn details_calls(&self) -> usize {
        self.details_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub async fn init_requests(&self) -> Vec<InitPaymentRequest> {
        self.init_requests.lock().await.clone()
    }

    pub async fn refund_requests(&self) -> Vec<(String, Option<Decimal>)> {
        self.refund_requests.lock().await.clone()
    }

    fn ensure_reachable(&self, endpoint: &str) -> PaymentResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PaymentError::GatewayTransport(format!(
                "Ameria {endpoint} request failed: connection refused"
            )));
        }
        Ok(())
    }
}

/// What the bank reports for a deposited card payment.
pub fn approved_details(payment_id: &str, amount: Decimal, card_number: &str) -> PaymentDetails {
    PaymentDetails {
        response_code: Some("00".to_string()),
        payment_state: Some("Successful".to_string()),
        order_status: Some(2),
        amount: Some(amount),
        approved_amount: Some(amount),
        deposited_amount: Some(amount),
        currency: Some("051".to_string()),
        payment_id: Some(payment_id.to_string()),
        card_number: Some(card_number.to_string()),
        response_message: Some("Approved".to_string()),
        ..Default::default()
    }
}

/// What the bank reports for a declined card payment.
pub fn declined_details(payment_id: &str, amount: Decimal, code: &str, message: &str) -> PaymentDetails {
    PaymentDetails {
        response_code: Some(code.to_string()),
        payment_state: Some("Declined".to_string()),
        order_status: Some(6),
        amount: Some(amount),
        currency: Some("051".to_string()),
        payment_id: Some(payment_id.to_string()),
        resp_code: Some(code.to_string()),
        resp_message: Some(message.to_string()),
        ..Default::default()
    }
}

#[async_trait::async_trait]
impl VposGateway for MockVposGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_sandbox(&self) -> bool {
        self.sandbox.load(Ordering::SeqCst)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn init_payment(&self, request: InitPaymentRequest) -> PaymentResult<InitPaymentResponse> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable("InitPayment")?;
        self.init_requests.lock().await.push(request);

        if let Some(answer) = self.init_answer.lock().await.take() {
            return check_init_response(answer);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        check_init_response(InitPaymentResponse {
            payment_id: Some(format!("P-{id}")),
            response_code: Some("1".to_string()),
            response_message: Some("OK".to_string()),
        })
    }

    async fn get_payment_details(&self, payment_id: &str) -> PaymentResult<PaymentDetails> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable("GetPaymentDetails")?;

        let scripted = self.details.lock().await.get(payment_id).cloned();
        // Unscripted payments look like a session the customer never finished.
        Ok(scripted.unwrap_or_else(|| PaymentDetails {
            response_code: Some("00".to_string()),
            payment_state: Some("Created".to_string()),
            order_status: Some(0),
            payment_id: Some(payment_id.to_string()),
            ..Default::default()
        }))
    }

    async fn refund_payment(&self, payment_id: &str, amount: Option<Decimal>) -> PaymentResult<OperationResponse> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable("RefundPayment")?;
        self.refund_requests.lock().await.push((payment_id.to_string(), amount));

        let answer = self.refund_answer.lock().await.take().unwrap_or_else(|| OperationResponse {
            response_code: Some("00".to_string()),
            response_message: Some("OK".to_string()),
            payment_id: Some(payment_id.to_string()),
            ..Default::default()
        });
        answer.check("refund_failed", "Refund failed")
    }

    async fn cancel_payment(&self, payment_id: &str) -> PaymentResult<OperationResponse> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable("CancelPayment")?;
        OperationResponse {
            response_code: Some("00".to_string()),
            payment_id: Some(payment_id.to_string()),
            ..Default::default()
        }
        .check("cancel_failed", "Payment cancellation failed")
    }
}

/// Hands out the same scripted gateway for every config, following the config's
/// sandbox flag.
#[derive(Clone)]
pub struct MockGatewayFactory {
    pub gateway: Arc<MockVposGateway>,
}

impl MockGatewayFactory {
    pub fn new(gateway: Arc<MockVposGateway>) -> Self {
        Self { gateway }
    }
}

impl GatewayFactory for MockGatewayFactory {
    fn build(&self, config: &GatewayConfig) -> PaymentResult<Arc<dyn VposGateway>> {
        self.gateway.set_sandbox(config.test_mode);
        let gateway: Arc<dyn VposGateway> = self.gateway.clone();
        Ok(gateway)
    }
}
