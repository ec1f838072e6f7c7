use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::locale::Locale;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct News {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct NewsTranslation {
    pub id: Uuid,
    pub news_id: Uuid,
    pub locale: Locale,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewsTranslationFields {
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

impl From<&NewsTranslation> for NewsTranslationFields {
    fn from(t: &NewsTranslation) -> Self {
        Self {
            title: t.title.clone(),
            excerpt: t.excerpt.clone(),
            content: t.content.clone(),
            seo_title: t.seo_title.clone(),
            seo_description: t.seo_description.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct LocalizedNews {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub locale: Locale,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const NEWS_COLUMNS: &str = "id, slug, image_url, published_at, created_at, updated_at";

const LOCALIZED_SELECT: &str = r#"
    SELECT n.id, n.slug, n.image_url, n.published_at, t.locale, t.title, t.excerpt, t.content,
           t.seo_title, t.seo_description, n.created_at, n.updated_at
    FROM news n
    JOIN news_translations t ON t.news_id = n.id
"#;

impl News {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        published_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, News>(&format!(
            r#"INSERT INTO news (id, slug, image_url, published_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               RETURNING {NEWS_COLUMNS}"#
        ))
        .bind(id)
        .bind(slug)
        .bind(image_url)
        .bind(published_at)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, News>(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, News>(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_base<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        published_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"UPDATE news
               SET slug = $2, image_url = $3, published_at = $4, updated_at = $5
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(slug)
        .bind(image_url)
        .bind(published_at)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM news WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl NewsTranslation {
    pub async fn find(
        pool: &SqlitePool,
        news_id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, NewsTranslation>(
            r#"SELECT id, news_id, locale, title, excerpt, content, seo_title, seo_description
               FROM news_translations
               WHERE news_id = $1 AND locale = $2"#,
        )
        .bind(news_id)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert<'e, E>(
        executor: E,
        news_id: Uuid,
        locale: Locale,
        fields: &NewsTranslationFields,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"INSERT INTO news_translations
                   (id, news_id, locale, title, excerpt, content, seo_title, seo_description)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT(news_id, locale) DO UPDATE SET
                   title = excluded.title,
                   excerpt = excluded.excerpt,
                   content = excluded.content,
                   seo_title = excluded.seo_title,
                   seo_description = excluded.seo_description"#,
        )
        .bind(Uuid::new_v4())
        .bind(news_id)
        .bind(locale)
        .bind(&fields.title)
        .bind(&fields.excerpt)
        .bind(&fields.content)
        .bind(&fields.seo_title)
        .bind(&fields.seo_description)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn locales(pool: &SqlitePool, news_id: Uuid) -> Result<Vec<Locale>, sqlx::Error> {
        sqlx::query_scalar::<_, Locale>(
            "SELECT locale FROM news_translations WHERE news_id = $1 ORDER BY locale",
        )
        .bind(news_id)
        .fetch_all(pool)
        .await
    }
}

impl LocalizedNews {
    pub async fn find(
        pool: &SqlitePool,
        id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedNews>(&format!(
            "{LOCALIZED_SELECT} WHERE n.id = $1 AND t.locale = $2"
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
        sqlx::query_as::<_, LocalizedNews>(&format!(
            "{LOCALIZED_SELECT} WHERE n.slug = $1 AND t.locale = $2"
        ))
        .bind(slug)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    /// Newest first by publication date.
    pub async fn list(
        pool: &SqlitePool,
        locale: Locale,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedNews>(&format!(
            "{LOCALIZED_SELECT} WHERE t.locale = $1 ORDER BY n.published_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(locale)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}
