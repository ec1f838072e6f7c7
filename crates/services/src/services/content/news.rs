use chrono::{DateTime, Utc};
use db::models::news::{LocalizedNews, News, NewsTranslation, NewsTranslationFields};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use ts_rs::TS;
use utils::{locale::Locale, text::non_blank};
use uuid::Uuid;

use super::{
    ContentError, MAX_SEO_DESCRIPTION_CHARS, MAX_TITLE_CHARS, Page, StagedImage, UpdateOutcome,
    ValidationErrors, apply_optional_text, apply_text, apply_value, discard, map_unique_slug,
    resolve_slug, validate_image_change,
};
use crate::services::{
    image::{ImageChange, ImageUpload},
    storage::SharedStorage,
};

const FOLDER: &str = "news";
const ENTITY: &str = "news article";
const MAX_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct CreateNews {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    /// Defaults to the time of creation.
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateNews {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl UpdateNews {
    /// True when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.slug.is_none()
            && self.title.is_none()
            && self.excerpt.is_none()
            && self.content.is_none()
            && self.seo_title.is_none()
            && self.seo_description.is_none()
            && self.published_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct NewsDto {
    #[serde(flatten)]
    #[ts(flatten)]
    pub news: LocalizedNews,
    pub available_locales: Vec<Locale>,
}

#[derive(Clone)]
pub struct NewsService {
    pool: SqlitePool,
    storage: SharedStorage,
}

fn validate(slug: &str, fields: &NewsTranslationFields) -> Result<(), ContentError> {
    let mut errors = ValidationErrors::default();
    errors.check_slug(slug);
    errors.require_text("title", &fields.title, Some(MAX_TITLE_CHARS));
    errors.require_text("content", &fields.content, None);
    errors.limit_text("excerpt", fields.excerpt.as_deref(), MAX_EXCERPT_CHARS);
    errors.limit_text("seo_title", fields.seo_title.as_deref(), MAX_TITLE_CHARS);
    errors.limit_text(
        "seo_description",
        fields.seo_description.as_deref(),
        MAX_SEO_DESCRIPTION_CHARS,
    );
    errors.into_result()
}

impl NewsService {
    pub fn new(pool: SqlitePool, storage: SharedStorage) -> Self {
        Self { pool, storage }
    }

    pub async fn create(
        &self,
        input: CreateNews,
        image: Option<ImageUpload>,
    ) -> Result<NewsDto, ContentError> {
        let slug = resolve_slug(input.slug.as_deref(), &input.title);
        let fields = NewsTranslationFields {
            title: input.title.trim().to_string(),
            excerpt: non_blank(input.excerpt),
            content: input.content.trim().to_string(),
            seo_title: non_blank(input.seo_title),
            seo_description: non_blank(input.seo_description),
        };
        validate(&slug, &fields)?;

        let change = image.map(ImageChange::Replace).unwrap_or_default();
        let validated = validate_image_change(&change)?;
        if News::find_by_slug(&self.pool, &slug).await?.is_some() {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged =
            StagedImage::stage(self.storage.as_ref(), FOLDER, None, &change, validated).await?;
        let id = Uuid::new_v4();
        let published_at = input.published_at.unwrap_or_else(Utc::now);
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            News::create(&mut *tx, id, &slug, staged.url.as_deref(), published_at)
                .await
                .map_err(|e| map_unique_slug(e, &slug))?;
            NewsTranslation::upsert(&mut *tx, id, input.locale, &fields).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(news_id = %id, slug, locale = %input.locale, "Created news article");
        self.get(id, input.locale).await
    }

    pub async fn get(&self, id: Uuid, locale: Locale) -> Result<NewsDto, ContentError> {
        let Some(news) = LocalizedNews::find(&self.pool, id, locale).await? else {
            return Err(match News::find_by_id(&self.pool, id).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(news).await
    }

    pub async fn get_by_slug(&self, slug: &str, locale: Locale) -> Result<NewsDto, ContentError> {
        let Some(news) = LocalizedNews::find_by_slug(&self.pool, slug, locale).await? else {
            return Err(match News::find_by_slug(&self.pool, slug).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(news).await
    }

    /// Newest publication first.
    pub async fn list(&self, locale: Locale, page: Page) -> Result<Vec<NewsDto>, ContentError> {
        let items = LocalizedNews::list(&self.pool, locale, page.limit(), page.offset()).await?;
        let mut out = Vec::with_capacity(items.len());
        for news in items {
            out.push(self.with_locales(news).await?);
        }
        Ok(out)
    }

    pub async fn locales(&self, id: Uuid) -> Result<Vec<Locale>, ContentError> {
        if News::find_by_id(&self.pool, id).await?.is_none() {
            return Err(ContentError::NotFound(ENTITY));
        }
        Ok(NewsTranslation::locales(&self.pool, id).await?)
    }

    async fn with_locales(&self, news: LocalizedNews) -> Result<NewsDto, ContentError> {
        let available_locales = NewsTranslation::locales(&self.pool, news.id).await?;
        Ok(NewsDto {
            news,
            available_locales,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateNews,
        image: ImageChange,
    ) -> Result<UpdateOutcome<NewsDto>, ContentError> {
        let news = News::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        let locale = patch.locale;
        let existing = NewsTranslation::find(&self.pool, id, locale).await?;

        let mut fields = existing
            .as_ref()
            .map(NewsTranslationFields::from)
            .unwrap_or_default();
        let mut translation_changed = apply_text(&mut fields.title, patch.title);
        translation_changed |= apply_optional_text(&mut fields.excerpt, patch.excerpt);
        translation_changed |= apply_text(&mut fields.content, patch.content);
        translation_changed |= apply_optional_text(&mut fields.seo_title, patch.seo_title);
        translation_changed |=
            apply_optional_text(&mut fields.seo_description, patch.seo_description);

        let mut slug = news.slug.clone();
        let mut base_changed = apply_text(&mut slug, patch.slug.map(|s| s.to_lowercase()));
        let slug_changed = base_changed;
        let mut published_at = news.published_at;
        base_changed |= apply_value(&mut published_at, patch.published_at);

        validate(&slug, &fields)?;
        let validated = validate_image_change(&image)?;
        let image = match image {
            ImageChange::Remove if news.image_url.is_none() => ImageChange::Keep,
            other => other,
        };

        if !translation_changed && !base_changed && image.is_keep() {
            debug!(news_id = %id, %locale, "News update has no changes");
            return Ok(UpdateOutcome::Unchanged(self.get(id, locale).await?));
        }

        if slug_changed
            && News::find_by_slug(&self.pool, &slug)
                .await?
                .is_some_and(|other| other.id != id)
        {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged = StagedImage::stage(
            self.storage.as_ref(),
            FOLDER,
            news.image_url.as_deref(),
            &image,
            validated,
        )
        .await?;
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            News::update_base(&mut *tx, id, &slug, staged.url.as_deref(), published_at)
                .await
                .map_err(|e| map_unique_slug(e, &slug))?;
            if translation_changed {
                NewsTranslation::upsert(&mut *tx, id, locale, &fields).await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(news_id = %id, %locale, base_changed, translation_changed, "Updated news article");
        Ok(UpdateOutcome::Updated(self.get(id, locale).await?))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ContentError> {
        let news = News::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        News::delete(&self.pool, id).await?;
        if let Some(url) = &news.image_url {
            discard(self.storage.as_ref(), url).await;
        }
        info!(news_id = %id, "Deleted news article");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::services::{
        content::test_support::{storage, test_pool},
        image::fixtures::png,
    };

    fn input(slug: &str, title: &str) -> CreateNews {
        CreateNews {
            locale: Locale::En,
            slug: Some(slug.to_string()),
            title: title.to_string(),
            content: "The center opens registration for the new term.".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_orders_by_publication_date() {
        let (pool, _dir) = test_pool().await;
        let service = NewsService::new(pool, storage());
        let older = CreateNews {
            published_at: Some(Utc::now() - Duration::days(3)),
            ..input("older", "Older")
        };
        service.create(older, None).await.unwrap();
        service.create(input("newer", "Newer"), None).await.unwrap();

        let titles: Vec<_> = service
            .list(Locale::En, Page::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.news.title)
            .collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
        assert!(service.list(Locale::Ar, Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adding_a_locale_keeps_the_other() {
        let (pool, _dir) = test_pool().await;
        let service = NewsService::new(pool, storage());
        let created = service.create(input("eid", "Eid prayer times"), None).await.unwrap();

        let outcome = service
            .update(
                created.news.id,
                UpdateNews {
                    locale: Locale::Ar,
                    title: Some("مواعيد صلاة العيد".into()),
                    content: Some("تقام الصلاة في الساحة".into()),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap();

        assert!(outcome.is_updated());
        let ar = outcome.into_inner();
        assert_eq!(ar.available_locales, vec![Locale::Ar, Locale::En]);
        let en = service.get(created.news.id, Locale::En).await.unwrap();
        assert_eq!(en.news.title, "Eid prayer times");
    }

    #[tokio::test]
    async fn removing_image_nulls_column_then_deletes_file() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = NewsService::new(pool, files.clone());
        let created = service
            .create(input("iftar", "Community iftar"), Some(png(64)))
            .await
            .unwrap();
        let url = created.news.image_url.clone().unwrap();

        let updated = service
            .update(
                created.news.id,
                UpdateNews {
                    locale: Locale::En,
                    ..Default::default()
                },
                ImageChange::Remove,
            )
            .await
            .unwrap()
            .into_inner();

        assert_eq!(updated.news.image_url, None);
        assert_eq!(files.deleted(), vec![url]);
    }

    #[tokio::test]
    async fn invalid_create_uploads_nothing() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = NewsService::new(pool, files.clone());

        let err = service
            .create(input("bad", "  "), Some(png(64)))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::Validation(ref e) if e.0.contains_key("title")));
        assert_eq!(files.put_count(), 0);
    }
}
