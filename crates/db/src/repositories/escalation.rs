use sqlx::Row;

use parceldesk_core::domain::email::InboundEmail;
use parceldesk_core::domain::escalation::{EscalationId, EscalationItem};

use super::{decode_error, decode_timestamp, encode_timestamp, EscalationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEscalationRepository {
    pool: DbPool,
}

impl SqlEscalationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<EscalationItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let sender_email: String = row.try_get("sender_email").map_err(decode_error)?;
    let subject: String = row.try_get("subject").map_err(decode_error)?;
    let body: String = row.try_get("body").map_err(decode_error)?;
    let reason: String = row.try_get("reason").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let resolved: i64 = row.try_get("resolved").map_err(decode_error)?;

    Ok(EscalationItem {
        id: EscalationId(id),
        email_input: InboundEmail::new(sender_email, subject, body),
        reason,
        timestamp: decode_timestamp("created_at", &created_at)?,
        resolved: resolved != 0,
    })
}

#[async_trait::async_trait]
impl EscalationRepository for SqlEscalationRepository {
    async fn append(&self, item: EscalationItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO escalation_queue (id, sender_email, subject, body, reason, created_at, resolved)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id.0)
        .bind(&item.email_input.sender_email)
        .bind(&item.email_input.subject)
        .bind(&item.email_input.body)
        .bind(&item.reason)
        .bind(encode_timestamp(&item.timestamp))
        .bind(i64::from(item.resolved))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<EscalationItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sender_email, subject, body, reason, created_at, resolved
             FROM escalation_queue ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn resolve(&self, id: &EscalationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE escalation_queue SET resolved = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use parceldesk_core::domain::email::InboundEmail;
    use parceldesk_core::domain::escalation::{EscalationId, EscalationItem};

    use super::SqlEscalationRepository;
    use crate::repositories::EscalationRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlEscalationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlEscalationRepository::new(pool)
    }

    #[tokio::test]
    async fn appended_items_can_be_resolved() {
        let repo = repo().await;
        let item = EscalationItem::open(
            InboundEmail::new("jane.smith@email.com", "Refund", "I want my money back"),
            "requires human review",
            Utc::now(),
        );
        repo.append(item.clone()).await.expect("append");

        assert!(repo.resolve(&item.id).await.expect("resolve"));
        assert!(!repo.resolve(&EscalationId("missing".to_owned())).await.expect("resolve"));

        let items = repo.list().await.expect("list");
        assert_eq!(items.len(), 1);
        assert!(items[0].resolved);
        assert_eq!(items[0].email_input, item.email_input);
        assert_eq!(items[0].reason, "requires human review");
    }

    #[tokio::test]
    async fn queue_lists_in_arrival_order() {
        let repo = repo().await;
        let now = Utc::now();
        for subject in ["first", "second", "third"] {
            repo.append(EscalationItem::open(InboundEmail::new("a@x.com", subject, "body"), "r", now))
                .await
                .expect("append");
        }

        let subjects: Vec<String> = repo
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|item| item.email_input.subject)
            .collect();
        assert_eq!(subjects, vec!["first", "second", "third"]);
    }
}
