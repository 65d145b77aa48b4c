use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use parceldesk_core::domain::customer::{Customer, CustomerId};
use parceldesk_core::domain::email::OutboundReply;
use parceldesk_core::domain::escalation::{EscalationId, EscalationItem};
use parceldesk_core::domain::order::{OrderId, OrderRecord};

pub mod customer;
pub mod escalation;
pub mod memory;
pub mod order;
pub mod sent_reply;

pub use customer::SqlCustomerRepository;
pub use escalation::SqlEscalationRepository;
pub use memory::{
    InMemoryCustomerRepository, InMemoryEscalationRepository, InMemoryOrderRepository,
    InMemorySentReplyRepository,
};
pub use order::SqlOrderRepository;
pub use sent_reply::SqlSentReplyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Case-insensitive lookup on the contact address.
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError>;
    async fn save(&self, customer: Customer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Orders placed by `customer` at or after `since`, newest first.
    async fn list_for_customer(
        &self,
        customer: &CustomerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError>;
    async fn list(&self) -> Result<Vec<OrderRecord>, RepositoryError>;
    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EscalationRepository: Send + Sync {
    async fn append(&self, item: EscalationItem) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<EscalationItem>, RepositoryError>;
    /// Marks an item resolved. Returns `false` when the id is unknown.
    async fn resolve(&self, id: &EscalationId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SentReplyRepository: Send + Sync {
    async fn append(&self, reply: OutboundReply) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<OutboundReply>, RepositoryError>;
}

/// Fixed-width UTC rendering so stored timestamps compare lexically.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
