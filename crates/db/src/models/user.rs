use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

/// Self-reported Quran study level, used to place students in programs.
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "quran_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuranLevel {
    Beginner,
    Intermediate,
    Advanced,
    Hafiz,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub quran_level: Option<QuranLevel>,
    pub phone: Option<String>,
    pub national_id_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub quran_level: Option<QuranLevel>,
    pub phone: Option<String>,
    pub national_id_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
            quran_level: user.quran_level,
            phone: user.phone,
            national_id_image_url: user.national_id_image_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
}

/// Column values written by [`User::update`]; callers start from the current row.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub quran_level: Option<QuranLevel>,
    pub phone: Option<String>,
    pub national_id_image_url: Option<String>,
}

impl From<&User> for UserChanges {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            role: user.role,
            email_verified: user.email_verified,
            quran_level: user.quran_level,
            phone: user.phone.clone(),
            national_id_image_url: user.national_id_image_url.clone(),
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, email_verified, quran_level, \
                            phone, national_id_image_url, created_at, updated_at";

impl User {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateUser) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (id, name, email, password_hash, role, email_verified, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.name)
        .bind(data.email.to_lowercase())
        .bind(&data.password_hash)
        .bind(data.role)
        .bind(data.email_verified)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email.trim().to_lowercase())
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"UPDATE users
               SET name = $2,
                   role = $3,
                   email_verified = $4,
                   quran_level = $5,
                   phone = $6,
                   national_id_image_url = $7,
                   updated_at = $8
               WHERE id = $1
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(changes.role)
        .bind(changes.email_verified)
        .bind(changes.quran_level)
        .bind(&changes.phone)
        .bind(&changes.national_id_image_url)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_email_verified(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = 1, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{is_unique_violation, test_support::test_db};

    fn new_user(email: &str) -> CreateUser {
        CreateUser {
            name: "Amina".to_string(),
            email: email.to_string(),
            password_hash: None,
            role: UserRole::User,
            email_verified: false,
        }
    }

    #[tokio::test]
    async fn email_is_stored_lowercase_and_unique() {
        let (db, _dir) = test_db().await;
        let user = User::create(&db.pool, Uuid::new_v4(), &new_user("Amina@Example.org"))
            .await
            .unwrap();
        assert_eq!(user.email, "amina@example.org");

        let found = User::find_by_email(&db.pool, " AMINA@example.org ").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let err = User::create(&db.pool, Uuid::new_v4(), &new_user("amina@example.org"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn update_writes_all_columns() {
        let (db, _dir) = test_db().await;
        let user = User::create(&db.pool, Uuid::new_v4(), &new_user("a@b.co"))
            .await
            .unwrap();

        let mut changes = UserChanges::from(&user);
        changes.quran_level = Some(QuranLevel::Hafiz);
        changes.role = UserRole::Admin;
        let updated = User::update(&db.pool, user.id, &changes).await.unwrap().unwrap();

        assert_eq!(updated.quran_level, Some(QuranLevel::Hafiz));
        assert_eq!(updated.role, UserRole::Admin);
        assert!(User::update(&db.pool, Uuid::new_v4(), &changes).await.unwrap().is_none());
    }
}
