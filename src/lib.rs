pub mod config;
pub mod crypto {
    pub mod envelope;
}
pub mod domain {
    pub mod callback;
    pub mod gateway_config;
    pub mod order_id;
    pub mod payment;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod admin_config;
        pub mod ops;
        pub mod payments;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
    pub mod problem;
    pub mod routes;
}
pub mod repo;
pub mod service {
    pub mod config_service;
    pub mod payment_service;
    pub mod test_card_gate;
}

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub config_service: service::config_service::PaymentConfigService,
    pub storefront_url: String,
}
