use async_trait::async_trait;
use sqlx::Row;

use promissory_core::domain::conversation::{ConversationMessage, MessageRole};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::errors::StoreError;
use promissory_core::ports::ConversationLog;

use super::{decode_error, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlConversationLog {
    pool: DbPool,
}

impl SqlConversationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, text, created_at
             FROM conversation_message
             WHERE tenant_id = ? AND lead_id = ?
             ORDER BY id ASC",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    let role: String = row.try_get("role").map_err(decode_error)?;
    let text: String = row.try_get("text").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(ConversationMessage {
        role: MessageRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?,
        text,
        timestamp: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl ConversationLog for SqlConversationLog {
    async fn messages(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        Ok(self.load(tenant_id, lead_id).await?)
    }

    async fn append(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        message: ConversationMessage,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_message (tenant_id, lead_id, role, text, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use promissory_core::domain::conversation::{ConversationMessage, MessageRole};
    use promissory_core::domain::lead::{LeadId, TenantId};
    use promissory_core::ports::ConversationLog;

    use super::SqlConversationLog;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn messages_come_back_in_insertion_order_per_lead() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let log = SqlConversationLog::new(pool);
        let tenant = TenantId("t-1".to_string());
        let lead = LeadId("lead-1".to_string());
        let other = LeadId("lead-2".to_string());

        log.append(&tenant, &lead, ConversationMessage::new(MessageRole::User, "hola"))
            .await
            .expect("append");
        log.append(&tenant, &lead, ConversationMessage::new(MessageRole::Assistant, "hi!"))
            .await
            .expect("append");
        log.append(&tenant, &other, ConversationMessage::new(MessageRole::User, "other"))
            .await
            .expect("append");

        let messages = log.messages(&tenant, &lead).await.expect("messages");

        assert_eq!(
            messages.iter().map(|message| message.text.as_str()).collect::<Vec<_>>(),
            vec!["hola", "hi!"]
        );
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }
}
