use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::payment::{NewOrderEvent, OrderEvent};

#[derive(Clone)]
pub struct OrderEventsRepo {
    pub pool: PgPool,
}

impl OrderEventsRepo {
    pub async fn insert_tx(tx: &mut Transaction<'_, Postgres>, event: &NewOrderEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_events (id, order_id, type, data, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.order_id)
        .bind(event.event_type.as_str())
        .bind(&event.data)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, type, data, created_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderEvent {
                id: r.get("id"),
                order_id: r.get("order_id"),
                event_type: r.get("type"),
                data: r.get("data"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
