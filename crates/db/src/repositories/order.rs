use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use parceldesk_core::domain::customer::CustomerId;
use parceldesk_core::domain::order::{OrderId, OrderRecord, OrderStatus};

use super::{decode_error, decode_timestamp, encode_timestamp, OrderRepository, RepositoryError};
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, customer_id, product_name, status, tracking_number,
                             estimated_delivery, ordered_at, total_amount";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<OrderRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let customer_id: String = row.try_get("customer_id").map_err(decode_error)?;
    let product_name: String = row.try_get("product_name").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let tracking_number: Option<String> = row.try_get("tracking_number").map_err(decode_error)?;
    let estimated_delivery: Option<String> =
        row.try_get("estimated_delivery").map_err(decode_error)?;
    let ordered_at: String = row.try_get("ordered_at").map_err(decode_error)?;
    let total_amount: String = row.try_get("total_amount").map_err(decode_error)?;

    let status = OrderStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("status: unknown value `{status}`")))?;
    let estimated_delivery = estimated_delivery
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|error| RepositoryError::Decode(format!("estimated_delivery: {error}")))
        })
        .transpose()?;
    let total_amount = Decimal::from_str(&total_amount)
        .map_err(|error| RepositoryError::Decode(format!("total_amount: {error}")))?;

    Ok(OrderRecord {
        id: OrderId(id),
        owner_id: CustomerId(customer_id),
        product_name,
        status,
        tracking_number,
        estimated_delivery,
        ordered_at: decode_timestamp("ordered_at", &ordered_at)?,
        total_amount,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn list_for_customer(
        &self,
        customer: &CustomerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order
             WHERE customer_id = ? AND ordered_at >= ?
             ORDER BY ordered_at DESC"
        ))
        .bind(&customer.0)
        .bind(encode_timestamp(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order ORDER BY ordered_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer_order (id, customer_id, product_name, status, tracking_number,
                                         estimated_delivery, ordered_at, total_amount)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 customer_id = excluded.customer_id,
                 product_name = excluded.product_name,
                 status = excluded.status,
                 tracking_number = excluded.tracking_number,
                 estimated_delivery = excluded.estimated_delivery,
                 ordered_at = excluded.ordered_at,
                 total_amount = excluded.total_amount",
        )
        .bind(&order.id.0)
        .bind(&order.owner_id.0)
        .bind(&order.product_name)
        .bind(order.status.as_str())
        .bind(&order.tracking_number)
        .bind(order.estimated_delivery.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(encode_timestamp(&order.ordered_at))
        .bind(order.total_amount.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
