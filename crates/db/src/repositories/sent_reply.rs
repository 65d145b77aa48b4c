use sqlx::Row;

use parceldesk_core::domain::email::OutboundReply;

use super::{decode_error, decode_timestamp, encode_timestamp, RepositoryError, SentReplyRepository};
use crate::DbPool;

pub struct SqlSentReplyRepository {
    pool: DbPool,
}

impl SqlSentReplyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_reply(row: &sqlx::sqlite::SqliteRow) -> Result<OutboundReply, RepositoryError> {
    let sent_at: String = row.try_get("sent_at").map_err(decode_error)?;

    Ok(OutboundReply {
        to_email: row.try_get("to_email").map_err(decode_error)?,
        subject: row.try_get("subject").map_err(decode_error)?,
        body: row.try_get("body").map_err(decode_error)?,
        timestamp: decode_timestamp("sent_at", &sent_at)?,
    })
}

#[async_trait::async_trait]
impl SentReplyRepository for SqlSentReplyRepository {
    async fn append(&self, reply: OutboundReply) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO sent_reply (to_email, subject, body, sent_at) VALUES (?, ?, ?, ?)")
            .bind(&reply.to_email)
            .bind(&reply.subject)
            .bind(&reply.body)
            .bind(encode_timestamp(&reply.timestamp))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<OutboundReply>, RepositoryError> {
        let rows =
            sqlx::query("SELECT to_email, subject, body, sent_at FROM sent_reply ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_reply).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use parceldesk_core::domain::email::{InboundEmail, OutboundReply};

    use super::SqlSentReplyRepository;
    use crate::repositories::SentReplyRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn sent_log_is_append_only_and_ordered() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlSentReplyRepository::new(pool);

        let email = InboundEmail::new("john.doe@email.com", "Order status", "Where is it?");
        repo.append(OutboundReply::reply_to(&email, "It shipped.", Utc::now())).await.expect("first");
        repo.append(OutboundReply::reply_to(&email, "It arrived.", Utc::now())).await.expect("second");

        let sent = repo.list().await.expect("list");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, "It shipped.");
        assert_eq!(sent[1].subject, "Re: Order status");
    }
}
