use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::payment::{
    NewOrderEvent, OrderEvent, OrderRef, Payment, PaymentInitiation, PaymentOutcome, PaymentStatus,
    METHOD_CARD, PROVIDER,
};
use crate::error::PaymentError;
use crate::repo::{PaymentStore, SettingsStore};

#[derive(Default)]
struct MemoryState {
    settings: HashMap<String, serde_json::Value>,
    orders: HashMap<Uuid, OrderRef>,
    payments: Vec<Payment>,
    events: Vec<OrderEvent>,
}

impl MemoryState {
    fn push_event(&mut self, event: &NewOrderEvent) {
        self.events.push(OrderEvent {
            id: Uuid::new_v4(),
            order_id: event.order_id,
            event_type: event.event_type.as_str().to_string(),
            data: event.data.clone(),
            created_at: Utc::now(),
        });
    }
}

/// Process-local store for tests and database-less runs. Same guarantees as the
/// Postgres store: one lock covers each write, and versions are checked.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: OrderRef) {
        self.inner.write().await.orders.insert(order.id, order);
    }

    /// Seeds a payment row as-is, e.g. a pending row left by a checkout page.
    pub async fn insert_payment(&self, payment: Payment) {
        self.inner.write().await.payments.push(payment);
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderRef> {
        self.inner.read().await.orders.get(&order_id).cloned()
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
        self.inner
            .read()
            .await
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn setting(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().await.settings.get(key).cloned()
    }
}

/// A bare pending row for `order`, as a checkout page would leave it.
pub fn pending_payment(order_id: Uuid, amount: rust_decimal::Decimal, currency: &str) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id,
        provider: PROVIDER.to_string(),
        method: METHOD_CARD.to_string(),
        amount,
        currency: currency.to_string(),
        status: PaymentStatus::Pending,
        provider_transaction_id: None,
        provider_order_id: None,
        provider_response: None,
        card_last4: None,
        error_code: None,
        error_message: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        failed_at: None,
        version: 0,
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemoryStore {
    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.read().await.settings.get(key).cloned())
    }

    async fn upsert_setting(&self, key: &str, value: serde_json::Value, _description: &str) -> Result<()> {
        self.inner.write().await.settings.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentStore for MemoryStore {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRef>> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn find_open_payment(&self, order_id: Uuid, provider: &str) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .iter()
            .rev()
            .find(|p| p.order_id == order_id && p.provider == provider && p.status.is_open())
            .cloned())
    }

    async fn find_payment_by_transaction(&self, provider: &str, transaction_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .iter()
            .rev()
            .find(|p| p.provider == provider && p.provider_transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn find_order_payment(
        &self,
        order_id: Uuid,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .iter()
            .find(|p| {
                p.order_id == order_id
                    && p.provider == provider
                    && p.provider_transaction_id.as_deref() == Some(transaction_id)
            })
            .cloned())
    }

    async fn record_initiation(&self, initiation: PaymentInitiation) -> Result<Payment> {
        let mut state = self.inner.write().await;
        let now = Utc::now();

        let payment = match initiation.existing {
            Some((payment_id, version)) => {
                let row = state
                    .payments
                    .iter_mut()
                    .find(|p| p.id == payment_id && p.version == version && p.provider_transaction_id.is_none())
                    .ok_or_else(|| PaymentError::ConcurrentModification(payment_id.to_string()))?;

                row.status = PaymentStatus::Processing;
                row.provider_transaction_id = Some(initiation.transaction_id.clone());
                row.provider_order_id = Some(initiation.provider_order_id);
                row.provider_response = Some(initiation.provider_response.clone());
                row.updated_at = now;
                row.version += 1;
                row.clone()
            }
            None => {
                let taken = state
                    .payments
                    .iter()
                    .any(|p| p.order_id == initiation.order_id && p.provider == PROVIDER && p.status.is_open());
                if taken {
                    return Err(PaymentError::ConcurrentModification(initiation.order_id.to_string()).into());
                }

                let mut row = pending_payment(initiation.order_id, initiation.amount, &initiation.currency);
                row.status = PaymentStatus::Processing;
                row.provider_transaction_id = Some(initiation.transaction_id.clone());
                row.provider_order_id = Some(initiation.provider_order_id);
                row.provider_response = Some(initiation.provider_response.clone());
                state.payments.push(row.clone());
                row
            }
        };

        if let Some(order) = state.orders.get_mut(&initiation.order_id) {
            order.payment_status = "processing".to_string();
        }
        state.push_event(&initiation.event);

        Ok(payment)
    }

    async fn apply_outcome(&self, outcome: PaymentOutcome) -> Result<Payment> {
        let mut state = self.inner.write().await;
        let incoming = outcome.payment;

        let row = state
            .payments
            .iter_mut()
            .find(|p| p.id == incoming.id && p.version == incoming.version)
            .ok_or_else(|| PaymentError::ConcurrentModification(incoming.id.to_string()))?;

        row.status = incoming.status;
        row.provider_response = incoming.provider_response;
        row.card_last4 = incoming.card_last4;
        row.error_code = incoming.error_code;
        row.error_message = incoming.error_message;
        row.completed_at = incoming.completed_at;
        row.failed_at = incoming.failed_at;
        row.updated_at = Utc::now();
        row.version += 1;
        let written = row.clone();

        if let Some(update) = outcome.order_update {
            if let Some(order) = state.orders.get_mut(&update.order_id) {
                order.payment_status = update.payment_status;
                if let Some(status) = update.status {
                    order.status = status;
                }
                if update.paid_at.is_some() {
                    order.paid_at = update.paid_at;
                }
            }
        }
        if let Some(event) = &outcome.event {
            state.push_event(event);
        }

        Ok(written)
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}
