use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::locale::Locale;
use uuid::Uuid;

/// Locale-independent part of a study program.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Program {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProgramTranslation {
    pub id: Uuid,
    pub program_id: Uuid,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

/// Text columns of a translation row as written by an upsert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramTranslationFields {
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

impl From<&ProgramTranslation> for ProgramTranslationFields {
    fn from(t: &ProgramTranslation) -> Self {
        Self {
            title: t.title.clone(),
            description: t.description.clone(),
            content: t.content.clone(),
            seo_title: t.seo_title.clone(),
            seo_description: t.seo_description.clone(),
        }
    }
}

/// A program joined with one of its translations.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct LocalizedProgram {
    pub id: Uuid,
    pub slug: String,
    pub image_url: Option<String>,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const LOCALIZED_SELECT: &str = r#"
    SELECT p.id, p.slug, p.image_url, t.locale, t.title, t.description, t.content,
           t.seo_title, t.seo_description, p.created_at, p.updated_at
    FROM programs p
    JOIN program_translations t ON t.program_id = p.id
"#;

impl Program {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Program>(
            r#"INSERT INTO programs (id, slug, image_url, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $4)
               RETURNING id, slug, image_url, created_at, updated_at"#,
        )
        .bind(id)
        .bind(slug)
        .bind(image_url)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Program>(
            "SELECT id, slug, image_url, created_at, updated_at FROM programs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Program>(
            "SELECT id, slug, image_url, created_at, updated_at FROM programs WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_base<'e, E>(
        executor: E,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE programs SET slug = $2, image_url = $3, updated_at = $4 WHERE id = $1")
            .bind(id)
            .bind(slug)
            .bind(image_url)
            .bind(Utc::now())
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Deletes the program; translations go with it through the cascade.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM programs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl ProgramTranslation {
    pub async fn find(
        pool: &SqlitePool,
        program_id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProgramTranslation>(
            r#"SELECT id, program_id, locale, title, description, content, seo_title, seo_description
               FROM program_translations
               WHERE program_id = $1 AND locale = $2"#,
        )
        .bind(program_id)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    /// Inserts or overwrites the translation for `(program_id, locale)`.
    pub async fn upsert<'e, E>(
        executor: E,
        program_id: Uuid,
        locale: Locale,
        fields: &ProgramTranslationFields,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"INSERT INTO program_translations
                   (id, program_id, locale, title, description, content, seo_title, seo_description)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT(program_id, locale) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description,
                   content = excluded.content,
                   seo_title = excluded.seo_title,
                   seo_description = excluded.seo_description"#,
        )
        .bind(Uuid::new_v4())
        .bind(program_id)
        .bind(locale)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.content)
        .bind(&fields.seo_title)
        .bind(&fields.seo_description)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn locales(pool: &SqlitePool, program_id: Uuid) -> Result<Vec<Locale>, sqlx::Error> {
        sqlx::query_scalar::<_, Locale>(
            "SELECT locale FROM program_translations WHERE program_id = $1 ORDER BY locale",
        )
        .bind(program_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for(pool: &SqlitePool, program_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM program_translations WHERE program_id = $1")
            .bind(program_id)
            .fetch_one(pool)
            .await
    }
}

impl LocalizedProgram {
    pub async fn find(
        pool: &SqlitePool,
        id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedProgram>(&format!(
            "{LOCALIZED_SELECT} WHERE p.id = $1 AND t.locale = $2"
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
        sqlx::query_as::<_, LocalizedProgram>(&format!(
            "{LOCALIZED_SELECT} WHERE p.slug = $1 AND t.locale = $2"
        ))
        .bind(slug)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        locale: Locale,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedProgram>(&format!(
            "{LOCALIZED_SELECT} WHERE t.locale = $1 ORDER BY p.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(locale)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    fn fields(title: &str) -> ProgramTranslationFields {
        ProgramTranslationFields {
            title: title.to_string(),
            description: "Memorization circle".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_locale() {
        let (db, _dir) = test_db().await;
        let program = Program::create(&db.pool, Uuid::new_v4(), "hifz", None).await.unwrap();

        ProgramTranslation::upsert(&db.pool, program.id, Locale::Ar, &fields("تحفيظ"))
            .await
            .unwrap();
        ProgramTranslation::upsert(&db.pool, program.id, Locale::Ar, &fields("تحفيظ القرآن"))
            .await
            .unwrap();
        ProgramTranslation::upsert(&db.pool, program.id, Locale::En, &fields("Hifz"))
            .await
            .unwrap();

        assert_eq!(ProgramTranslation::count_for(&db.pool, program.id).await.unwrap(), 2);
        let ar = LocalizedProgram::find(&db.pool, program.id, Locale::Ar).await.unwrap().unwrap();
        assert_eq!(ar.title, "تحفيظ القرآن");
        assert_eq!(
            ProgramTranslation::locales(&db.pool, program.id).await.unwrap(),
            vec![Locale::Ar, Locale::En]
        );
    }

    #[tokio::test]
    async fn delete_cascades_to_translations() {
        let (db, _dir) = test_db().await;
        let program = Program::create(&db.pool, Uuid::new_v4(), "tajweed", None).await.unwrap();
        ProgramTranslation::upsert(&db.pool, program.id, Locale::En, &fields("Tajweed"))
            .await
            .unwrap();

        assert_eq!(Program::delete(&db.pool, program.id).await.unwrap(), 1);
        assert_eq!(ProgramTranslation::count_for(&db.pool, program.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_only_returns_translated_locale() {
        let (db, _dir) = test_db().await;
        let a = Program::create(&db.pool, Uuid::new_v4(), "a", None).await.unwrap();
        let b = Program::create(&db.pool, Uuid::new_v4(), "b", None).await.unwrap();
        ProgramTranslation::upsert(&db.pool, a.id, Locale::En, &fields("A")).await.unwrap();
        ProgramTranslation::upsert(&db.pool, b.id, Locale::Ar, &fields("ب")).await.unwrap();

        let en = LocalizedProgram::list(&db.pool, Locale::En, 10, 0).await.unwrap();
        assert_eq!(en.len(), 1);
        assert_eq!(en[0].id, a.id);
        assert!(LocalizedProgram::find(&db.pool, a.id, Locale::Ar).await.unwrap().is_none());
    }
}
