use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Inbound message from the public contact form.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

const CONTACT_COLUMNS: &str = "id, name, email, phone, subject, message, is_read, created_at";

impl Contact {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateContact) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"INSERT INTO contacts (id, name, email, phone, subject, message, is_read, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
               RETURNING {CONTACT_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.subject)
        .bind(&data.message)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"SELECT {CONTACT_COLUMNS} FROM contacts
               WHERE ($1 = 0 OR is_read = 0)
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#
        ))
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn set_read(pool: &SqlitePool, id: Uuid, is_read: bool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            "UPDATE contacts SET is_read = $2 WHERE id = $1 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .bind(is_read)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn unread_filter() {
        let (db, _dir) = test_db().await;
        let data = CreateContact {
            name: "Yusuf".into(),
            email: "yusuf@example.org".into(),
            phone: None,
            subject: Some("Enrollment".into()),
            message: "When does the next tajweed class start?".into(),
        };
        let first = Contact::create(&db.pool, Uuid::new_v4(), &data).await.unwrap();
        Contact::create(&db.pool, Uuid::new_v4(), &data).await.unwrap();

        let read = Contact::set_read(&db.pool, first.id, true).await.unwrap().unwrap();
        assert!(read.is_read);

        assert_eq!(Contact::list(&db.pool, false, 10, 0).await.unwrap().len(), 2);
        assert_eq!(Contact::list(&db.pool, true, 10, 0).await.unwrap().len(), 1);
    }
}
