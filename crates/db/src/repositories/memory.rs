use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parceldesk_core::domain::customer::{Customer, CustomerId};
use parceldesk_core::domain::email::OutboundReply;
use parceldesk_core::domain::escalation::{EscalationId, EscalationItem};
use parceldesk_core::domain::order::{OrderId, OrderRecord};

use super::{
    CustomerRepository, EscalationRepository, OrderRepository, RepositoryError,
    SentReplyRepository,
};

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.values().find(|customer| customer.owns_address(email)).cloned())
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        let mut all: Vec<Customer> = customers.values().cloned().collect();
        all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(all)
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id.0.clone(), customer);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, OrderRecord>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn list_for_customer(
        &self,
        customer: &CustomerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<OrderRecord> = orders
            .values()
            .filter(|order| order.is_owned_by(customer) && order.ordered_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));
        Ok(matching)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut all: Vec<OrderRecord> = orders.values().cloned().collect();
        all.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));
        Ok(all)
    }

    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEscalationRepository {
    items: RwLock<Vec<EscalationItem>>,
}

#[async_trait::async_trait]
impl EscalationRepository for InMemoryEscalationRepository {
    async fn append(&self, item: EscalationItem) -> Result<(), RepositoryError> {
        self.items.write().await.push(item);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EscalationItem>, RepositoryError> {
        Ok(self.items.read().await.clone())
    }

    async fn resolve(&self, id: &EscalationId) -> Result<bool, RepositoryError> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|item| &item.id == id) {
            Some(item) => {
                item.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemorySentReplyRepository {
    replies: RwLock<Vec<OutboundReply>>,
}

#[async_trait::async_trait]
impl SentReplyRepository for InMemorySentReplyRepository {
    async fn append(&self, reply: OutboundReply) -> Result<(), RepositoryError> {
        self.replies.write().await.push(reply);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<OutboundReply>, RepositoryError> {
        Ok(self.replies.read().await.clone())
    }
}
