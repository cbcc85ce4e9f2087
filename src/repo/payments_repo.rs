use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::payment::{Payment, PaymentInitiation, PaymentStatus, METHOD_CARD, PROVIDER};

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, provider, method, amount, currency, status, provider_transaction_id,
    provider_order_id, provider_response, card_last4, error_code, error_message,
    created_at, updated_at, completed_at, failed_at, version
"#;

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn payment_from_row(r: &PgRow) -> Result<Payment> {
    let status: String = r.get("status");
    Ok(Payment {
        id: r.get("id"),
        order_id: r.get("order_id"),
        provider: r.get("provider"),
        method: r.get("method"),
        amount: r.get("amount"),
        currency: r.get("currency"),
        status: PaymentStatus::parse(&status).ok_or_else(|| anyhow!("unknown payment status '{status}'"))?,
        provider_transaction_id: r.get("provider_transaction_id"),
        provider_order_id: r.get("provider_order_id"),
        provider_response: r.get("provider_response"),
        card_last4: r.get("card_last4"),
        error_code: r.get("error_code"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        completed_at: r.get("completed_at"),
        failed_at: r.get("failed_at"),
        version: r.get("version"),
    })
}

impl PaymentsRepo {
    pub async fn find_open_for_order(&self, order_id: Uuid, provider: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE order_id = $1 AND provider = $2 AND status IN ('pending', 'processing')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(order_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    pub async fn find_by_transaction(&self, provider: &str, transaction_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE provider = $1 AND provider_transaction_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(provider)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    pub async fn find_for_order_and_transaction(
        &self,
        order_id: Uuid,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE order_id = $1 AND provider = $2 AND provider_transaction_id = $3
            LIMIT 1
            "#
        ))
        .bind(order_id)
        .bind(provider)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    /// `None` when another open payment for the order won the race.
    pub async fn insert_processing_tx(
        tx: &mut Transaction<'_, Postgres>,
        init: &PaymentInitiation,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (
                id, order_id, provider, method, amount, currency, status,
                provider_transaction_id, provider_order_id, provider_response,
                created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, 'processing',
                $7, $8, $9,
                now(), now(), 0
            )
            ON CONFLICT (order_id, provider) WHERE status IN ('pending', 'processing') DO NOTHING
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(init.order_id)
        .bind(PROVIDER)
        .bind(METHOD_CARD)
        .bind(init.amount)
        .bind(&init.currency)
        .bind(&init.transaction_id)
        .bind(init.provider_order_id)
        .bind(&init.provider_response)
        .fetch_optional(tx.as_mut())
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    /// Promotes a pending row that has no transaction id yet. `None` on a version mismatch.
    pub async fn promote_pending_tx(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
        expected_version: i64,
        init: &PaymentInitiation,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = 'processing',
                provider_transaction_id = $3,
                provider_order_id = $4,
                provider_response = $5,
                updated_at = now(),
                version = version + 1
            WHERE id = $1 AND version = $2 AND provider_transaction_id IS NULL
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(expected_version)
        .bind(&init.transaction_id)
        .bind(init.provider_order_id)
        .bind(&init.provider_response)
        .fetch_optional(tx.as_mut())
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    /// Rewrites the mutable columns if `payment.version` is still current.
    pub async fn update_versioned_tx(
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = $3,
                provider_response = $4,
                card_last4 = $5,
                error_code = $6,
                error_message = $7,
                completed_at = $8,
                failed_at = $9,
                updated_at = now(),
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(payment.version)
        .bind(payment.status.as_str())
        .bind(&payment.provider_response)
        .bind(&payment.card_last4)
        .bind(&payment.error_code)
        .bind(&payment.error_message)
        .bind(payment.completed_at)
        .bind(payment.failed_at)
        .fetch_optional(tx.as_mut())
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }
}
