use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use parceldesk_core::domain::customer::CustomerId;
use parceldesk_core::domain::order::OrderRecord;

use crate::repositories::{
    CustomerRepository, EscalationRepository, InMemoryCustomerRepository,
    InMemoryEscalationRepository, InMemoryOrderRepository, InMemorySentReplyRepository,
    OrderRepository, RepositoryError, SentReplyRepository, SqlCustomerRepository,
    SqlEscalationRepository, SqlOrderRepository, SqlSentReplyRepository,
};
use crate::DbPool;

/// The four collections a case reads from and appends to.
#[derive(Clone)]
pub struct RecordStore {
    pub customers: Arc<dyn CustomerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub escalations: Arc<dyn EscalationRepository>,
    pub sent_replies: Arc<dyn SentReplyRepository>,
}

impl RecordStore {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            customers: Arc::new(SqlCustomerRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            escalations: Arc::new(SqlEscalationRepository::new(pool.clone())),
            sent_replies: Arc::new(SqlSentReplyRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            customers: Arc::new(InMemoryCustomerRepository::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            escalations: Arc::new(InMemoryEscalationRepository::default()),
            sent_replies: Arc::new(InMemorySentReplyRepository::default()),
        }
    }

    /// Orders for `customer` placed within the last `days` days of `now`.
    pub async fn recent_orders(
        &self,
        customer: &CustomerId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let since = now - Duration::days(i64::from(days));
        self.orders.list_for_customer(customer, since).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use parceldesk_core::domain::customer::{Customer, CustomerId};
    use parceldesk_core::domain::order::{OrderId, OrderRecord, OrderStatus};

    use super::RecordStore;
    use crate::{connect_with_settings, migrations};

    async fn exercise(store: RecordStore) {
        let now = Utc::now();
        store
            .customers
            .save(Customer {
                id: CustomerId("usr_001".to_owned()),
                email: "john.doe@email.com".to_owned(),
                name: "John Doe".to_owned(),
            })
            .await
            .expect("save customer");
        for (id, days_ago) in [("ORD-1", 3), ("ORD-2", 13), ("ORD-3", 15)] {
            store
                .orders
                .save(OrderRecord {
                    id: OrderId(id.to_owned()),
                    owner_id: CustomerId("usr_001".to_owned()),
                    product_name: "USB-C Charging Cable".to_owned(),
                    status: OrderStatus::Delivered,
                    tracking_number: None,
                    estimated_delivery: None,
                    ordered_at: now - Duration::days(days_ago),
                    total_amount: Decimal::new(1999, 2),
                })
                .await
                .expect("save order");
        }

        let recent = store
            .recent_orders(&CustomerId("usr_001".to_owned()), 14, now)
            .await
            .expect("recent orders");
        let ids: Vec<&str> = recent.iter().map(|order| order.id.0.as_str()).collect();
        assert_eq!(ids, vec!["ORD-1", "ORD-2"]);
    }

    #[tokio::test]
    async fn sql_and_in_memory_stores_agree_on_lookback() {
        exercise(RecordStore::in_memory()).await;

        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        exercise(RecordStore::sql(pool)).await;
    }
}
