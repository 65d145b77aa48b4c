use sqlx::Row;

use parceldesk_core::domain::customer::{Customer, CustomerId};

use super::{decode_error, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let email: String = row.try_get("email").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;

    Ok(Customer { id: CustomerId(id), email, name })
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, name FROM customer WHERE email = ? COLLATE NOCASE")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = sqlx::query("SELECT id, email, name FROM customer ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_customer).collect()
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, email, name)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 name = excluded.name",
        )
        .bind(&customer.id.0)
        .bind(&customer.email)
        .bind(&customer.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
