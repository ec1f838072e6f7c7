use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::locale::Locale;
use uuid::Uuid;

/// A photo in the public gallery. Unlike other content it always has an image.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GalleryItem {
    pub id: Uuid,
    pub image_url: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GalleryTranslation {
    pub id: Uuid,
    pub gallery_item_id: Uuid,
    pub locale: Locale,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
pub struct GalleryTranslationFields {
    pub title: String,
    pub description: Option<String>,
}

impl From<&GalleryTranslation> for GalleryTranslationFields {
    fn from(t: &GalleryTranslation) -> Self {
        Self {
            title: t.title.clone(),
            description: t.description.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct LocalizedGalleryItem {
    pub id: Uuid,
    pub image_url: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub locale: Locale,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ITEM_COLUMNS: &str = "id, image_url, taken_at, created_at, updated_at";

const LOCALIZED_SELECT: &str = r#"
    SELECT g.id, g.image_url, g.taken_at, t.locale, t.title, t.description,
           g.created_at, g.updated_at
    FROM gallery_items g
    JOIN gallery_translations t ON t.gallery_item_id = g.id
"#;

impl GalleryItem {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        image_url: &str,
        taken_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, GalleryItem>(&format!(
            r#"INSERT INTO gallery_items (id, image_url, taken_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $4)
               RETURNING {ITEM_COLUMNS}"#
        ))
        .bind(id)
        .bind(image_url)
        .bind(taken_at)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GalleryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM gallery_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_base<'e, E>(
        executor: E,
        id: Uuid,
        image_url: &str,
        taken_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE gallery_items SET image_url = $2, taken_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(image_url)
        .bind(taken_at)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gallery_items WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl GalleryTranslation {
    pub async fn find(
        pool: &SqlitePool,
        gallery_item_id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GalleryTranslation>(
            r#"SELECT id, gallery_item_id, locale, title, description
               FROM gallery_translations
               WHERE gallery_item_id = $1 AND locale = $2"#,
        )
        .bind(gallery_item_id)
        .bind(locale)
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert<'e, E>(
        executor: E,
        gallery_item_id: Uuid,
        locale: Locale,
        fields: &GalleryTranslationFields,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"INSERT INTO gallery_translations (id, gallery_item_id, locale, title, description)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT(gallery_item_id, locale) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description"#,
        )
        .bind(Uuid::new_v4())
        .bind(gallery_item_id)
        .bind(locale)
        .bind(&fields.title)
        .bind(&fields.description)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Swaps the full translation set of an item in one transaction.
    pub async fn replace_all(
        pool: &SqlitePool,
        gallery_item_id: Uuid,
        translations: &[(Locale, GalleryTranslationFields)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM gallery_translations WHERE gallery_item_id = $1")
            .bind(gallery_item_id)
            .execute(&mut *tx)
            .await?;
        for (locale, fields) in translations {
            Self::upsert(&mut *tx, gallery_item_id, *locale, fields).await?;
        }
        sqlx::query("UPDATE gallery_items SET updated_at = $2 WHERE id = $1")
            .bind(gallery_item_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    pub async fn locales(
        pool: &SqlitePool,
        gallery_item_id: Uuid,
    ) -> Result<Vec<Locale>, sqlx::Error> {
        sqlx::query_scalar::<_, Locale>(
            "SELECT locale FROM gallery_translations WHERE gallery_item_id = $1 ORDER BY locale",
        )
        .bind(gallery_item_id)
        .fetch_all(pool)
        .await
    }
}

impl LocalizedGalleryItem {
    pub async fn find(
        pool: &SqlitePool,
        id: Uuid,
        locale: Locale,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalizedGalleryItem>(&format!(
            "{LOCALIZED_SELECT} WHERE g.id = $1 AND t.locale = $2"
        ))
        .bind(id)
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
        sqlx::query_as::<_, LocalizedGalleryItem>(&format!(
            "{LOCALIZED_SELECT} WHERE t.locale = $1 ORDER BY COALESCE(g.taken_at, g.created_at) DESC LIMIT $2 OFFSET $3"
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

    #[tokio::test]
    async fn replace_all_swaps_translation_set() {
        let (db, _dir) = test_db().await;
        let item = GalleryItem::create(&db.pool, Uuid::new_v4(), "/uploads/gallery/a.png", None)
            .await
            .unwrap();
        GalleryTranslation::upsert(
            &db.pool,
            item.id,
            Locale::Ar,
            &GalleryTranslationFields {
                title: "حفل التخرج".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        GalleryTranslation::replace_all(
            &db.pool,
            item.id,
            &[(
                Locale::En,
                GalleryTranslationFields {
                    title: "Graduation".into(),
                    description: Some("Class of 2025".into()),
                },
            )],
        )
        .await
        .unwrap();

        assert_eq!(
            GalleryTranslation::locales(&db.pool, item.id).await.unwrap(),
            vec![Locale::En]
        );
        let en = LocalizedGalleryItem::find(&db.pool, item.id, Locale::En)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(en.description.as_deref(), Some("Class of 2025"));
    }
}
