use anyhow::Result;
use uuid::Uuid;

use crate::domain::payment::{OrderEvent, OrderRef, Payment, PaymentInitiation, PaymentOutcome};

pub mod memory_store;
pub mod order_events_repo;
pub mod orders_repo;
pub mod payments_repo;
pub mod pg_store;
pub mod settings_repo;

/// Key/value settings table holding JSON documents.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn upsert_setting(&self, key: &str, value: serde_json::Value, description: &str) -> Result<()>;
}

/// Payments plus the order columns and event log they drive.
///
/// Multi-row writes are atomic. Payment rewrites are guarded by `version`; a lost race
/// comes back as `PaymentError::ConcurrentModification` inside the `anyhow::Error`.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRef>>;

    /// The pending or processing payment of an order, if any.
    async fn find_open_payment(&self, order_id: Uuid, provider: &str) -> Result<Option<Payment>>;

    async fn find_payment_by_transaction(&self, provider: &str, transaction_id: &str) -> Result<Option<Payment>>;

    async fn find_order_payment(
        &self,
        order_id: Uuid,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<Payment>>;

    /// Promotes the pending row named in `existing`, or inserts a new processing payment,
    /// then flips the order to processing and appends the event.
    async fn record_initiation(&self, initiation: PaymentInitiation) -> Result<Payment>;

    async fn apply_outcome(&self, outcome: PaymentOutcome) -> Result<Payment>;

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
