use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::payment::{OrderPaymentUpdate, OrderRef};

#[derive(Clone)]
pub struct OrdersRepo {
    pub pool: PgPool,
}

impl OrdersRepo {
    pub async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderRef>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, status, payment_status, paid_at,
                   COALESCE(metadata->>'language', metadata->>'lang') AS language
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| OrderRef {
            id: r.get("id"),
            number: r.get("number"),
            status: r.get("status"),
            payment_status: r.get("payment_status"),
            paid_at: r.get("paid_at"),
            language: r.get("language"),
        }))
    }

    pub async fn set_payment_processing_tx(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE orders SET payment_status = 'processing', updated_at = now() WHERE id = $1")
            .bind(order_id)
            .execute(tx.as_mut())
            .await?;

        Ok(())
    }

    /// `status` and `paid_at` are only overwritten when supplied.
    pub async fn apply_payment_update_tx(
        tx: &mut Transaction<'_, Postgres>,
        update: &OrderPaymentUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2,
                status = COALESCE($3, status),
                paid_at = COALESCE($4, paid_at),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(update.order_id)
        .bind(&update.payment_status)
        .bind(update.status.as_deref())
        .bind(update.paid_at)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }
}
