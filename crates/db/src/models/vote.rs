use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Vote {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub is_upvoted: bool,
}

impl Vote {
    /// Records or flips the vote for `(chat_id, message_id)`.
    pub async fn upsert(
        pool: &SqlitePool,
        chat_id: Uuid,
        message_id: Uuid,
        is_upvoted: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Vote>(
            r#"INSERT INTO votes (chat_id, message_id, is_upvoted)
               VALUES ($1, $2, $3)
               ON CONFLICT(chat_id, message_id) DO UPDATE SET is_upvoted = excluded.is_upvoted
               RETURNING chat_id, message_id, is_upvoted"#,
        )
        .bind(chat_id)
        .bind(message_id)
        .bind(is_upvoted)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_chat_id(pool: &SqlitePool, chat_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Vote>("SELECT chat_id, message_id, is_upvoted FROM votes WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_all(pool)
            .await
    }
}
