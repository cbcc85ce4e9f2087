#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;
use vpos_payments::crypto::envelope::SecretCipher;
use vpos_payments::domain::gateway_config::GatewayConfigPatch;
use vpos_payments::domain::payment::OrderRef;
use vpos_payments::gateways::mock::{MockGatewayFactory, MockVposGateway};
use vpos_payments::repo::memory_store::MemoryStore;
use vpos_payments::service::config_service::PaymentConfigService;
use vpos_payments::service::payment_service::PaymentService;
use vpos_payments::AppState;

pub const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const STOREFRONT: &str = "https://shop.example";

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<MockVposGateway>,
    pub config_service: PaymentConfigService,
    pub payment_service: PaymentService,
}

impl Harness {
    /// No gateway configuration stored yet.
    pub fn unconfigured() -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(MockVposGateway::new(true));
        let config_service = PaymentConfigService::new(
            Arc::new(store.clone()),
            SecretCipher::from_secret(TEST_SECRET).unwrap(),
            Arc::new(MockGatewayFactory::new(gateway.clone())),
        );
        let payment_service = PaymentService::new(Arc::new(store.clone()), config_service.clone());
        Self {
            store,
            gateway,
            config_service,
            payment_service,
        }
    }

    /// Active config in the given mode with the order id range used by the checkout tests.
    pub async fn active(sandbox: bool, allowed_cards: &[&str]) -> Self {
        let harness = Self::unconfigured();
        harness
            .config_service
            .save(config_patch(sandbox, allowed_cards))
            .await
            .unwrap();
        harness
    }

    pub async fn order(&self, number: &str) -> Uuid {
        let order = OrderRef::new(number);
        let id = order.id;
        self.store.insert_order(order).await;
        id
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            payment_service: self.payment_service.clone(),
            config_service: self.config_service.clone(),
            storefront_url: STOREFRONT.to_string(),
        }
    }
}

pub fn config_patch(sandbox: bool, allowed_cards: &[&str]) -> GatewayConfigPatch {
    GatewayConfigPatch {
        client_id: Some("client-1".into()),
        username: Some("merchant".into()),
        password: Some("s3cret".into()),
        test_mode: Some(sandbox),
        return_url: Some("https://shop.example/api/payments/ameria/callback".into()),
        callback_url: Some("https://shop.example/api/payments/ameria/callback".into()),
        currency: Some("AMD".into()),
        is_active: Some(true),
        order_id_min: Some(Some(3_584_001)),
        order_id_max: Some(Some(3_585_000)),
        allowed_test_cards: Some(allowed_cards.iter().map(|c| c.to_string()).collect()),
        test_card_strict_mode: Some(true),
        ..Default::default()
    }
}
