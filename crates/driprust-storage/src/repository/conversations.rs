//! Conversation log repository

use crate::db::DatabasePool;
use crate::models::{ConversationMessage, CreateConversationMessage};
use async_trait::async_trait;
use driprust_common::{Error, Result};
use uuid::Uuid;

/// Append-only record of messages exchanged with a lead
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Append a message to the lead's conversation for a channel
    async fn append(&self, input: CreateConversationMessage) -> Result<ConversationMessage>;
}

/// Database conversation log
pub struct DbConversationLog {
    pool: DatabasePool,
}

impl DbConversationLog {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationLog for DbConversationLog {
    async fn append(&self, input: CreateConversationMessage) -> Result<ConversationMessage> {
        sqlx::query_as::<_, ConversationMessage>(
            r#"
            INSERT INTO conversation_messages (
                id, tenant_id, lead_id, channel, direction, body, provider_message_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.lead_id)
        .bind(&input.channel)
        .bind(input.direction.to_string())
        .bind(&input.body)
        .bind(&input.provider_message_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
