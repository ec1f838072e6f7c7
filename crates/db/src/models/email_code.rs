use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

/// One outstanding sign-in code per email address. Only the hash is stored.
#[derive(Debug, Clone, FromRow)]
pub struct EmailCode {
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

impl EmailCode {
    /// Inserts a fresh code, replacing any previous one for the address.
    pub async fn replace(
        pool: &SqlitePool,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EmailCode>(
            r#"INSERT INTO email_codes (email, code_hash, expires_at, attempts, created_at)
               VALUES ($1, $2, $3, 0, $4)
               ON CONFLICT(email) DO UPDATE SET
                   code_hash = excluded.code_hash,
                   expires_at = excluded.expires_at,
                   attempts = 0,
                   created_at = excluded.created_at
               RETURNING email, code_hash, expires_at, attempts, created_at"#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmailCode>(
            "SELECT email, code_hash, expires_at, attempts, created_at FROM email_codes WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    pub async fn record_attempt(pool: &SqlitePool, email: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE email_codes SET attempts = attempts + 1 WHERE email = $1")
            .bind(email)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, email: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM email_codes WHERE email = $1")
            .bind(email)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
