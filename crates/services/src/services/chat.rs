//! Conversations with the assistant and the documents it drafts.

use chrono::{DateTime, Utc};
use db::models::{
    chat::{Chat, ChatVisibility},
    document::{CreateSuggestion, Document, DocumentKind, Suggestion},
    message::{Message, MessagePart, MessageRole},
    vote::Vote,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use utils::text::truncate_chars;
use uuid::Uuid;

use super::{
    claude_api::SharedModel,
    content::{ValidationErrors, MAX_TITLE_CHARS},
};

const MAX_CHAT_TITLE_CHARS: usize = 80;
const HISTORY_LIMIT: i64 = 50;
const TITLE_SYSTEM_PROMPT: &str = "Write a short title (at most 80 characters) for a conversation \
that starts with the user's message. Reply with the title only, without quotes. Use the \
language of the message.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("this chat belongs to another user")]
    Forbidden,
    #[error("validation failed")]
    Validation(ValidationErrors),
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    #[ts(flatten)]
    pub chat: Chat,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SaveDocument {
    pub title: String,
    pub content: Option<String>,
    #[serde(default)]
    pub kind: DocumentKind,
}

#[derive(Clone)]
pub struct ChatService {
    pool: SqlitePool,
    model: Option<SharedModel>,
}

impl ChatService {
    pub fn new(pool: SqlitePool, model: Option<SharedModel>) -> Self {
        Self { pool, model }
    }

    async fn owned_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat, ChatError> {
        let chat = Chat::find_by_id(&self.pool, chat_id)
            .await?
            .ok_or(ChatError::NotFound("chat"))?;
        if chat.user_id != user_id {
            return Err(ChatError::Forbidden);
        }
        Ok(chat)
    }

    /// Returns the chat, creating it with a generated title on the first message.
    pub async fn start_or_continue(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        first_message: &str,
    ) -> Result<Chat, ChatError> {
        if Chat::find_by_id(&self.pool, chat_id).await?.is_some() {
            return self.owned_chat(chat_id, user_id).await;
        }
        let title = self.generate_title(first_message).await;
        let chat = Chat::create(&self.pool, chat_id, user_id, &title, ChatVisibility::Private).await?;
        info!(chat_id = %chat.id, user_id = %user_id, "Started chat");
        Ok(chat)
    }

    async fn generate_title(&self, message: &str) -> String {
        let fallback = || truncate_chars(message.trim(), MAX_CHAT_TITLE_CHARS);
        let Some(model) = &self.model else {
            return fallback();
        };
        match model.ask(message, Some(TITLE_SYSTEM_PROMPT)).await {
            Ok(title) => {
                let title = title.trim().trim_matches('"').trim();
                if title.is_empty() {
                    fallback()
                } else {
                    truncate_chars(title, MAX_CHAT_TITLE_CHARS)
                }
            }
            Err(e) => {
                warn!(error = %e, "Chat title generation failed, using the message");
                fallback()
            }
        }
    }

    pub async fn save_message(
        &self,
        chat_id: Uuid,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<Message, ChatError> {
        Ok(Message::create(&self.pool, Uuid::new_v4(), chat_id, role, parts).await?)
    }

    pub async fn messages(&self, chat_id: Uuid) -> Result<Vec<Message>, ChatError> {
        Ok(Message::find_by_chat_id(&self.pool, chat_id).await?)
    }

    /// The user's most recent chats.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Chat>, ChatError> {
        Ok(Chat::find_by_user_id(&self.pool, user_id, HISTORY_LIMIT).await?)
    }

    /// Private chats are only visible to their owner.
    pub async fn get(&self, chat_id: Uuid, viewer: Option<Uuid>) -> Result<ChatWithMessages, ChatError> {
        let chat = Chat::find_by_id(&self.pool, chat_id)
            .await?
            .ok_or(ChatError::NotFound("chat"))?;
        if chat.visibility == ChatVisibility::Private && viewer != Some(chat.user_id) {
            return Err(ChatError::Forbidden);
        }
        let messages = Message::find_by_chat_id(&self.pool, chat_id).await?;
        Ok(ChatWithMessages { chat, messages })
    }

    pub async fn delete(&self, chat_id: Uuid, user_id: Uuid) -> Result<(), ChatError> {
        self.owned_chat(chat_id, user_id).await?;
        Chat::delete(&self.pool, chat_id).await?;
        info!(chat_id = %chat_id, "Deleted chat");
        Ok(())
    }

    pub async fn set_visibility(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        visibility: ChatVisibility,
    ) -> Result<Chat, ChatError> {
        let chat = self.owned_chat(chat_id, user_id).await?;
        Chat::update_visibility(&self.pool, chat_id, visibility).await?;
        Ok(Chat { visibility, ..chat })
    }

    pub async fn vote(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
        is_upvoted: bool,
    ) -> Result<Vote, ChatError> {
        self.owned_chat(chat_id, user_id).await?;
        let message = Message::find_by_id(&self.pool, message_id)
            .await?
            .filter(|m| m.chat_id == chat_id)
            .ok_or(ChatError::NotFound("message"))?;
        Ok(Vote::upsert(&self.pool, chat_id, message.id, is_upvoted).await?)
    }

    pub async fn votes(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Vote>, ChatError> {
        self.owned_chat(chat_id, user_id).await?;
        Ok(Vote::find_by_chat_id(&self.pool, chat_id).await?)
    }

    /// All saved versions of a document, oldest first.
    pub async fn document_versions(&self, id: Uuid, user_id: Uuid) -> Result<Vec<Document>, ChatError> {
        let versions = Document::find_versions(&self.pool, id).await?;
        match versions.first() {
            None => Err(ChatError::NotFound("document")),
            Some(doc) if doc.user_id != user_id => Err(ChatError::Forbidden),
            Some(_) => Ok(versions),
        }
    }

    pub async fn latest_document(&self, id: Uuid, user_id: Uuid) -> Result<Document, ChatError> {
        let document = Document::find_latest(&self.pool, id)
            .await?
            .ok_or(ChatError::NotFound("document"))?;
        if document.user_id != user_id {
            return Err(ChatError::Forbidden);
        }
        Ok(document)
    }

    /// Saves a new version; the first save creates the document.
    pub async fn save_document(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: SaveDocument,
    ) -> Result<Document, ChatError> {
        let mut errors = ValidationErrors::default();
        errors.require_text("title", &input.title, Some(MAX_TITLE_CHARS));
        if !errors.is_empty() {
            return Err(ChatError::Validation(errors));
        }
        if let Some(existing) = Document::find_latest(&self.pool, id).await?
            && existing.user_id != user_id
        {
            return Err(ChatError::Forbidden);
        }

        let document = Document::create_version(
            &self.pool,
            id,
            input.title.trim(),
            input.content.as_deref(),
            input.kind,
            user_id,
        )
        .await?;
        info!(document_id = %id, kind = %document.kind, "Saved document version");
        Ok(document)
    }

    /// Discards versions newer than `after`, returning how many were removed.
    pub async fn delete_documents_after(
        &self,
        id: Uuid,
        user_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<u64, ChatError> {
        self.document_versions(id, user_id).await?;
        Ok(Document::delete_versions_after(&self.pool, id, after).await?)
    }

    pub async fn suggestions(&self, document_id: Uuid, user_id: Uuid) -> Result<Vec<Suggestion>, ChatError> {
        self.document_versions(document_id, user_id).await?;
        Ok(Suggestion::find_by_document_id(&self.pool, document_id).await?)
    }

    pub async fn add_suggestions(
        &self,
        document: &Document,
        user_id: Uuid,
        suggestions: &[CreateSuggestion],
    ) -> Result<Vec<Suggestion>, ChatError> {
        Ok(Suggestion::create_many(&self.pool, document, user_id, suggestions).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::models::user::{CreateUser, User, UserRole};

    use super::*;
    use crate::services::{
        claude_api::test_support::{ScriptedModel, text},
        content::test_support::test_pool,
    };

    async fn user(pool: &SqlitePool, email: &str) -> Uuid {
        let data = CreateUser {
            name: "Admin".into(),
            email: email.into(),
            password_hash: None,
            role: UserRole::Admin,
            email_verified: true,
        };
        User::create(pool, Uuid::new_v4(), &data).await.unwrap().id
    }

    #[tokio::test]
    async fn title_comes_from_model_with_fallback() {
        let (pool, _dir) = test_pool().await;
        let owner = user(&pool, "a@example.org").await;
        let model = Arc::new(ScriptedModel::new(vec![vec![text("\"Ramadan news post\"")]]));
        let service = ChatService::new(pool, Some(model));

        let chat = service
            .start_or_continue(Uuid::new_v4(), owner, "Write a news post about Ramadan classes")
            .await
            .unwrap();
        assert_eq!(chat.title, "Ramadan news post");

        let long = "x".repeat(200);
        let fallback = service.start_or_continue(Uuid::new_v4(), owner, &long).await.unwrap();
        assert_eq!(fallback.title.chars().count(), MAX_CHAT_TITLE_CHARS);
    }

    #[tokio::test]
    async fn private_chat_hidden_from_others() {
        let (pool, _dir) = test_pool().await;
        let owner = user(&pool, "owner@example.org").await;
        let other = user(&pool, "other@example.org").await;
        let service = ChatService::new(pool, None);
        let chat = service.start_or_continue(Uuid::new_v4(), owner, "hello").await.unwrap();

        assert!(service.get(chat.id, Some(owner)).await.is_ok());
        assert!(matches!(service.get(chat.id, Some(other)).await, Err(ChatError::Forbidden)));
        assert!(matches!(service.get(chat.id, None).await, Err(ChatError::Forbidden)));
        assert!(matches!(
            service.start_or_continue(chat.id, other, "hijack").await,
            Err(ChatError::Forbidden)
        ));

        service.set_visibility(chat.id, owner, ChatVisibility::Public).await.unwrap();
        assert!(service.get(chat.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn votes_flip_and_require_a_message_in_the_chat() {
        let (pool, _dir) = test_pool().await;
        let owner = user(&pool, "owner@example.org").await;
        let service = ChatService::new(pool, None);
        let chat = service.start_or_continue(Uuid::new_v4(), owner, "hi").await.unwrap();
        let reply = service
            .save_message(chat.id, MessageRole::Assistant, &[MessagePart::text("Salam")])
            .await
            .unwrap();

        service.vote(chat.id, owner, reply.id, true).await.unwrap();
        service.vote(chat.id, owner, reply.id, false).await.unwrap();
        let votes = service.votes(chat.id, owner).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].is_upvoted);

        assert!(matches!(
            service.vote(chat.id, owner, Uuid::new_v4(), true).await,
            Err(ChatError::NotFound("message"))
        ));
    }

    #[tokio::test]
    async fn documents_are_versioned_per_owner() {
        let (pool, _dir) = test_pool().await;
        let owner = user(&pool, "owner@example.org").await;
        let other = user(&pool, "other@example.org").await;
        let service = ChatService::new(pool, None);
        let id = Uuid::new_v4();

        let first = service
            .save_document(
                id,
                owner,
                SaveDocument {
                    title: "Khutbah notes".into(),
                    content: Some("v1".into()),
                    kind: DocumentKind::Text,
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service
            .save_document(
                id,
                owner,
                SaveDocument {
                    title: "Khutbah notes".into(),
                    content: Some("v2".into()),
                    kind: DocumentKind::Text,
                },
            )
            .await
            .unwrap();
        assert_eq!(service.document_versions(id, owner).await.unwrap().len(), 2);
        assert!(matches!(
            service.document_versions(id, other).await,
            Err(ChatError::Forbidden)
        ));

        let removed = service
            .delete_documents_after(id, owner, first.created_at)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            service.latest_document(id, owner).await.unwrap().content.as_deref(),
            Some("v1")
        );
    }
}
