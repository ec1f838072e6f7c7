use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "chat_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatVisibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub visibility: ChatVisibility,
    pub created_at: DateTime<Utc>,
}

const CHAT_COLUMNS: &str = "id, user_id, title, visibility, created_at";

impl Chat {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        user_id: Uuid,
        title: &str,
        visibility: ChatVisibility,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Chat>(&format!(
            r#"INSERT INTO chats (id, user_id, title, visibility, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {CHAT_COLUMNS}"#
        ))
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(visibility)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn update_visibility(
        pool: &SqlitePool,
        id: Uuid,
        visibility: ChatVisibility,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE chats SET visibility = $2 WHERE id = $1")
            .bind(id)
            .bind(visibility)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes the chat with its messages and votes.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
