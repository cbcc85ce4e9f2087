use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use vpos_payments::config::AppConfig;
use vpos_payments::crypto::envelope::SecretCipher;
use vpos_payments::gateways::ameria::AmeriaGatewayFactory;
use vpos_payments::http::routes::router;
use vpos_payments::repo::memory_store::MemoryStore;
use vpos_payments::repo::pg_store::PgPaymentStore;
use vpos_payments::repo::settings_repo::SettingsRepo;
use vpos_payments::repo::{PaymentStore, SettingsStore};
use vpos_payments::service::config_service::PaymentConfigService;
use vpos_payments::service::payment_service::PaymentService;
use vpos_payments::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    tracing::info!(config = ?cfg, "starting");

    if cfg.encryption_key_is_default {
        tracing::warn!("PAYMENT_ENCRYPTION_KEY not set, using the development key; stored credentials are not protected");
    }
    let cipher = SecretCipher::from_secret(&cfg.encryption_key)?;

    let (settings_store, payment_store): (Arc<dyn SettingsStore>, Arc<dyn PaymentStore>) = if cfg.uses_memory_store() {
        tracing::warn!("DATABASE_URL=memory, state is lost on restart");
        let store = MemoryStore::new();
        let settings: Arc<dyn SettingsStore> = Arc::new(store.clone());
        let payments: Arc<dyn PaymentStore> = Arc::new(store);
        (settings, payments)
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&cfg.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let settings: Arc<dyn SettingsStore> = Arc::new(SettingsRepo { pool: pool.clone() });
        let payments: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(pool));
        (settings, payments)
    };

    let gateways = Arc::new(AmeriaGatewayFactory::new(
        cfg.ameria_base_url.clone(),
        cfg.gateway_timeout_ms,
    ));
    let config_service = PaymentConfigService::new(settings_store, cipher, gateways);
    let payment_service = PaymentService::new(payment_store, config_service.clone());

    let state = AppState {
        payment_service,
        config_service,
        storefront_url: cfg.storefront_url.clone(),
    };

    let app = router(state, cfg.internal_api_key.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
