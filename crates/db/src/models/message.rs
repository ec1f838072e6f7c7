use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One ordered piece of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[ts(type = "unknown")]
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[ts(type = "unknown")]
        result: Value,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, FromRow)]
struct MessageRow {
    id: Uuid,
    chat_id: Uuid,
    role: MessageRole,
    parts: String, // JSON-serialized Vec<MessagePart>
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = sqlx::Error;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let parts = serde_json::from_str(&row.parts).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.id,
            chat_id: row.chat_id,
            role: row.role,
            parts,
            created_at: row.created_at,
        })
    }
}

impl Message {
    /// Concatenated text parts, ignoring tool traffic.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        chat_id: Uuid,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<Self, sqlx::Error> {
        let json = serde_json::to_string(parts).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let row = sqlx::query_as::<_, MessageRow>(
            r#"INSERT INTO messages (id, chat_id, role, parts, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, chat_id, role, parts, created_at"#,
        )
        .bind(id)
        .bind(chat_id)
        .bind(role)
        .bind(json)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;
        row.try_into()
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, role, parts, created_at FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Message::try_from)
        .transpose()
    }

    /// Messages of a chat in conversation order.
    pub async fn find_by_chat_id(pool: &SqlitePool, chat_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, chat_id, role, parts, created_at
               FROM messages
               WHERE chat_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        models::{
            chat::{Chat, ChatVisibility},
            user::{CreateUser, User, UserRole},
        },
        test_support::test_db,
    };

    #[tokio::test]
    async fn parts_survive_storage_in_order() {
        let (db, _dir) = test_db().await;
        let user = User::create(
            &db.pool,
            Uuid::new_v4(),
            &CreateUser {
                name: "Admin".into(),
                email: "admin@example.org".into(),
                password_hash: None,
                role: UserRole::Admin,
                email_verified: true,
            },
        )
        .await
        .unwrap();
        let chat = Chat::create(&db.pool, Uuid::new_v4(), user.id, "News", ChatVisibility::Private)
            .await
            .unwrap();

        Message::create(&db.pool, Uuid::new_v4(), chat.id, MessageRole::User, &[MessagePart::text("Add news")])
            .await
            .unwrap();
        let parts = vec![
            MessagePart::ToolCall {
                tool_call_id: "call_1".into(),
                tool_name: "createNews".into(),
                args: json!({"slug": "open-day"}),
            },
            MessagePart::text("Done."),
        ];
        Message::create(&db.pool, Uuid::new_v4(), chat.id, MessageRole::Assistant, &parts)
            .await
            .unwrap();

        let messages = Message::find_by_chat_id(&db.pool, chat.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "Add news");
        assert_eq!(messages[1].parts, parts);
        assert_eq!(messages[1].text(), "Done.");
    }
}
