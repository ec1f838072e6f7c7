use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "document_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Text,
    Code,
    Sheet,
}

/// One saved version of an assistant-authored document. Versions share `id` and
/// are ordered by `created_at`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub content: Option<String>,
    pub kind: DocumentKind,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Suggestion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_created_at: DateTime<Utc>,
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
    pub is_resolved: bool,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSuggestion {
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
}

const DOCUMENT_COLUMNS: &str = "id, created_at, title, content, kind, user_id";
const SUGGESTION_COLUMNS: &str = "id, document_id, document_created_at, original_text, \
                                  suggested_text, description, is_resolved, user_id, created_at";

impl Document {
    /// Saves a new version of document `id`.
    pub async fn create_version(
        pool: &SqlitePool,
        id: Uuid,
        title: &str,
        content: Option<&str>,
        kind: DocumentKind,
        user_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            r#"INSERT INTO documents (id, created_at, title, content, kind, user_id)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {DOCUMENT_COLUMNS}"#
        ))
        .bind(id)
        .bind(Utc::now())
        .bind(title)
        .bind(content)
        .bind(kind)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// All versions, oldest first.
    pub async fn find_versions(pool: &SqlitePool, id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 ORDER BY created_at ASC"
        ))
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_latest(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Drops versions newer than `after`, with their suggestions.
    pub async fn delete_versions_after(
        pool: &SqlitePool,
        id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND created_at > $2")
            .bind(id)
            .bind(after)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl Suggestion {
    pub async fn create_many(
        pool: &SqlitePool,
        document: &Document,
        user_id: Uuid,
        suggestions: &[CreateSuggestion],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut created = Vec::with_capacity(suggestions.len());
        for suggestion in suggestions {
            let row = sqlx::query_as::<_, Suggestion>(&format!(
                r#"INSERT INTO suggestions
                       (id, document_id, document_created_at, original_text, suggested_text,
                        description, is_resolved, user_id, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8)
                   RETURNING {SUGGESTION_COLUMNS}"#
            ))
            .bind(Uuid::new_v4())
            .bind(document.id)
            .bind(document.created_at)
            .bind(&suggestion.original_text)
            .bind(&suggestion.suggested_text)
            .bind(&suggestion.description)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn find_by_document_id(
        pool: &SqlitePool,
        document_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Suggestion>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE document_id = $1 ORDER BY created_at ASC"
        ))
        .bind(document_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::{CreateUser, User, UserRole},
        test_support::test_db,
    };

    #[tokio::test]
    async fn deleting_newer_versions_drops_their_suggestions() {
        let (db, _dir) = test_db().await;
        let user = User::create(
            &db.pool,
            Uuid::new_v4(),
            &CreateUser {
                name: "Editor".into(),
                email: "editor@example.org".into(),
                password_hash: None,
                role: UserRole::Admin,
                email_verified: true,
            },
        )
        .await
        .unwrap();

        let id = Uuid::new_v4();
        let v1 = Document::create_version(&db.pool, id, "Intro", Some("v1"), DocumentKind::Text, user.id)
            .await
            .unwrap();
        let v2 = Document::create_version(&db.pool, id, "Intro", Some("v2"), DocumentKind::Text, user.id)
            .await
            .unwrap();
        Suggestion::create_many(
            &db.pool,
            &v2,
            user.id,
            &[CreateSuggestion {
                original_text: "v2".into(),
                suggested_text: "version two".into(),
                description: None,
            }],
        )
        .await
        .unwrap();

        assert_eq!(Document::find_latest(&db.pool, id).await.unwrap().unwrap(), v2);
        assert_eq!(Document::delete_versions_after(&db.pool, id, v1.created_at).await.unwrap(), 1);
        assert_eq!(Document::find_versions(&db.pool, id).await.unwrap(), vec![v1]);
        assert!(Suggestion::find_by_document_id(&db.pool, id).await.unwrap().is_empty());
    }
}
