use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::locale::Locale;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Event {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventTranslation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventTranslationFields {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
}

impl From<&EventTranslation> for EventTranslationFields {
    fn from(t: &EventTranslation) -> Self {
        Self {
            title: t.title.clone(),
            description: t.description.clone(),
            location: t.location.clone(),
        }
    }
}

/// Schedule columns of the base row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSchedule {
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct LocalizedEvent {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str = "id, slug, image_url, starts_at, ends_at, created_at, updated_at";

const LOCALIZED_SELECT: &str = r#"
    SELECT e.id, e.slug, e.image_url, e.starts_at, e.ends_at, t.locale, t.title, t.description,
           t.location, e.created_at, e.updated_at
    FROM events e
    JOIN event_translations t ON t.event_id = e.id
"#;

impl Event {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        schedule: EventSchedule,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Event>(&format!(
            r#"INSERT INTO events (id, slug, image_url, starts_at, ends_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $6)
               RETURNING {EVENT_COLUMNS}"#
        ))
        .bind(id)
        .bind(slug)
        .bind(image_url)
        .bind(schedule.starts_at)
        .bind(schedule.ends_at)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub fn schedule(&self) -> EventSchedule {
        EventSchedule {
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        }
    }

    pub async fn update_base<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        schedule: EventSchedule,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"UPDATE events
               SET slug = $2, image_url = $3, starts_at = $4, ends_at = $5, updated_at = $6
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(slug)
        .bind(image_url)
        .bind(schedule.starts_at)
        .bind(schedule.ends_at)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl EventTranslation {
    pub async fn find(
        pool: &SqlitePool,
        event_id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventTranslation>(
            r#"SELECT id, event_id, locale, title, description, location
               FROM event_translations
               WHERE event_id = $1 AND locale = $2"#,
        )
        .bind(event_id)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert<'e, E>(
        executor: E,
        event_id: Uuid,
        locale: Locale,
        fields: &EventTranslationFields,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"INSERT INTO event_translations (id, event_id, locale, title, description, location)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT(event_id, locale) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description,
                   location = excluded.location"#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(locale)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.location)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn locales(pool: &SqlitePool, event_id: Uuid) -> Result<Vec<Locale>, sqlx::Error> {
        sqlx::query_scalar::<_, Locale>(
            "SELECT locale FROM event_translations WHERE event_id = $1 ORDER BY locale",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}

impl LocalizedEvent {
    pub async fn find(
        pool: &SqlitePool,
        id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedEvent>(&format!(
            "{LOCALIZED_SELECT} WHERE e.id = $1 AND t.locale = $2"
        ))
        .bind(id)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(
        pool: &SqlitePool,
        slug: &str,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedEvent>(&format!(
            "{LOCALIZED_SELECT} WHERE e.slug = $1 AND t.locale = $2"
        ))
        .bind(slug)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    /// Upcoming and past events, latest start first.
    pub async fn list(
        pool: &SqlitePool,
        locale: Locale,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedEvent>(&format!(
            "{LOCALIZED_SELECT} WHERE t.locale = $1 ORDER BY e.starts_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(locale)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}
