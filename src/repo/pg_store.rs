use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::payment::{OrderEvent, OrderRef, Payment, PaymentInitiation, PaymentOutcome};
use crate::error::PaymentError;
use crate::repo::order_events_repo::OrderEventsRepo;
use crate::repo::orders_repo::OrdersRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::PaymentStore;

/// Postgres-backed [`PaymentStore`]; each write runs in one transaction.
#[derive(Clone)]
pub struct PgPaymentStore {
    pub pool: PgPool,
    pub payments_repo: PaymentsRepo,
    pub orders_repo: OrdersRepo,
    pub order_events_repo: OrderEventsRepo,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            payments_repo: PaymentsRepo { pool: pool.clone() },
            orders_repo: OrdersRepo { pool: pool.clone() },
            order_events_repo: OrderEventsRepo { pool: pool.clone() },
            pool,
        }
    }
}

#[async_trait::async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRef>> {
        self.orders_repo.find_by_id(order_id).await
    }

    async fn find_open_payment(&self, order_id: Uuid, provider: &str) -> Result<Option<Payment>> {
        self.payments_repo.find_open_for_order(order_id, provider).await
    }

    async fn find_payment_by_transaction(&self, provider: &str, transaction_id: &str) -> Result<Option<Payment>> {
        self.payments_repo.find_by_transaction(provider, transaction_id).await
    }

    async fn find_order_payment(
        &self,
        order_id: Uuid,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        self.payments_repo
            .find_for_order_and_transaction(order_id, provider, transaction_id)
            .await
    }

    async fn record_initiation(&self, initiation: PaymentInitiation) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let written = match initiation.existing {
            Some((payment_id, version)) => {
                PaymentsRepo::promote_pending_tx(&mut tx, payment_id, version, &initiation).await?
            }
            None => PaymentsRepo::insert_processing_tx(&mut tx, &initiation).await?,
        };

        let Some(payment) = written else {
            tx.rollback().await?;
            return Err(PaymentError::ConcurrentModification(initiation.order_id.to_string()).into());
        };

        OrdersRepo::set_payment_processing_tx(&mut tx, initiation.order_id).await?;
        OrderEventsRepo::insert_tx(&mut tx, &initiation.event).await?;
        tx.commit().await?;

        Ok(payment)
    }

    async fn apply_outcome(&self, outcome: PaymentOutcome) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let Some(payment) = PaymentsRepo::update_versioned_tx(&mut tx, &outcome.payment).await? else {
            tx.rollback().await?;
            return Err(PaymentError::ConcurrentModification(outcome.payment.id.to_string()).into());
        };

        if let Some(update) = &outcome.order_update {
            OrdersRepo::apply_payment_update_tx(&mut tx, update).await?;
        }
        if let Some(event) = &outcome.event {
            OrderEventsRepo::insert_tx(&mut tx, event).await?;
        }
        tx.commit().await?;

        Ok(payment)
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> {
        self.order_events_repo.list_for_order(order_id).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
