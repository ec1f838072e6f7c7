use std::collections::HashSet;

use chrono::{DateTime, Utc};
use db::models::gallery::{
    GalleryItem, GalleryTranslation, GalleryTranslationFields, LocalizedGalleryItem,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use ts_rs::TS;
use utils::{locale::Locale, text::non_blank};
use uuid::Uuid;

use super::{
    ContentError, MAX_TITLE_CHARS, Page, StagedImage, UpdateOutcome, ValidationErrors,
    apply_optional_text, apply_text, apply_value, discard, validate_image_change,
};
use crate::services::{
    image::{ImageChange, ImageUpload},
    storage::SharedStorage,
};

const FOLDER: &str = "gallery";
const ENTITY: &str = "gallery item";

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct CreateGalleryItem {
    #[serde(default)]
    pub locale: Locale,
    pub title: String,
    pub description: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateGalleryItem {
    #[serde(default)]
    pub locale: Locale,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub taken_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
pub struct GalleryTranslationInput {
    pub locale: Locale,
    #[serde(flatten)]
    #[ts(flatten)]
    pub fields: GalleryTranslationFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct GalleryItemDto {
    #[serde(flatten)]
    #[ts(flatten)]
    pub item: LocalizedGalleryItem,
    pub available_locales: Vec<Locale>,
}

#[derive(Clone)]
pub struct GalleryService {
    pool: SqlitePool,
    storage: SharedStorage,
}

fn check_fields(errors: &mut ValidationErrors, prefix: &str, fields: &GalleryTranslationFields) {
    errors.require_text(&format!("{prefix}title"), &fields.title, Some(MAX_TITLE_CHARS));
}

impl GalleryService {
    pub fn new(pool: SqlitePool, storage: SharedStorage) -> Self {
        Self { pool, storage }
    }

    /// Gallery items cannot exist without their photo.
    pub async fn create(
        &self,
        input: CreateGalleryItem,
        image: Option<ImageUpload>,
    ) -> Result<GalleryItemDto, ContentError> {
        let fields = GalleryTranslationFields {
            title: input.title.trim().to_string(),
            description: non_blank(input.description),
        };
        let mut errors = ValidationErrors::default();
        check_fields(&mut errors, "", &fields);
        if image.is_none() {
            errors.add("image", "is required");
        }
        errors.into_result()?;

        let change = image.map(ImageChange::Replace).unwrap_or_default();
        let validated = validate_image_change(&change)?;
        let staged =
            StagedImage::stage(self.storage.as_ref(), FOLDER, None, &change, validated).await?;
        let Some(image_url) = staged.url.clone() else {
            return Err(ValidationErrors::single("image", "is required"));
        };

        let id = Uuid::new_v4();
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            GalleryItem::create(&mut *tx, id, &image_url, input.taken_at).await?;
            GalleryTranslation::upsert(&mut *tx, id, input.locale, &fields).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(gallery_item_id = %id, locale = %input.locale, "Created gallery item");
        self.get(id, input.locale).await
    }

    pub async fn get(&self, id: Uuid, locale: Locale) -> Result<GalleryItemDto, ContentError> {
        let Some(item) = LocalizedGalleryItem::find(&self.pool, id, locale).await? else {
            return Err(match GalleryItem::find_by_id(&self.pool, id).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(item).await
    }

    pub async fn list(&self, locale: Locale, page: Page) -> Result<Vec<GalleryItemDto>, ContentError> {
        let items =
            LocalizedGalleryItem::list(&self.pool, locale, page.limit(), page.offset()).await?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.with_locales(item).await?);
        }
        Ok(out)
    }

    pub async fn locales(&self, id: Uuid) -> Result<Vec<Locale>, ContentError> {
        if GalleryItem::find_by_id(&self.pool, id).await?.is_none() {
            return Err(ContentError::NotFound(ENTITY));
        }
        Ok(GalleryTranslation::locales(&self.pool, id).await?)
    }

    async fn with_locales(&self, item: LocalizedGalleryItem) -> Result<GalleryItemDto, ContentError> {
        let available_locales = GalleryTranslation::locales(&self.pool, item.id).await?;
        Ok(GalleryItemDto {
            item,
            available_locales,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateGalleryItem,
        image: ImageChange,
    ) -> Result<UpdateOutcome<GalleryItemDto>, ContentError> {
        let item = GalleryItem::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        let locale = patch.locale;
        let existing = GalleryTranslation::find(&self.pool, id, locale).await?;

        let mut fields = existing
            .as_ref()
            .map(GalleryTranslationFields::from)
            .unwrap_or_default();
        let mut translation_changed = apply_text(&mut fields.title, patch.title);
        translation_changed |= apply_optional_text(&mut fields.description, patch.description);
        let mut taken_at = item.taken_at;
        let taken_at_changed = apply_value(&mut taken_at, patch.taken_at);

        let mut errors = ValidationErrors::default();
        check_fields(&mut errors, "", &fields);
        if matches!(image, ImageChange::Remove) {
            errors.add("image", "gallery items must keep an image; upload a replacement instead");
        }
        errors.into_result()?;
        let validated = validate_image_change(&image)?;

        if !translation_changed && !taken_at_changed && image.is_keep() {
            debug!(gallery_item_id = %id, %locale, "Gallery update has no changes");
            return Ok(UpdateOutcome::Unchanged(self.get(id, locale).await?));
        }

        let staged = StagedImage::stage(
            self.storage.as_ref(),
            FOLDER,
            Some(&item.image_url),
            &image,
            validated,
        )
        .await?;
        let image_url = staged.url.clone().unwrap_or_else(|| item.image_url.clone());
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            GalleryItem::update_base(&mut *tx, id, &image_url, taken_at).await?;
            if translation_changed {
                GalleryTranslation::upsert(&mut *tx, id, locale, &fields).await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(gallery_item_id = %id, %locale, "Updated gallery item");
        Ok(UpdateOutcome::Updated(self.get(id, locale).await?))
    }

    /// Replaces every translation of the item with `translations`.
    pub async fn replace_translations(
        &self,
        id: Uuid,
        translations: Vec<GalleryTranslationInput>,
    ) -> Result<Vec<Locale>, ContentError> {
        if GalleryItem::find_by_id(&self.pool, id).await?.is_none() {
            return Err(ContentError::NotFound(ENTITY));
        }

        let mut errors = ValidationErrors::default();
        if translations.is_empty() {
            errors.add("translations", "at least one translation is required");
        }
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(translations.len());
        for input in translations {
            if !seen.insert(input.locale) {
                errors.add("translations", format!("duplicate locale {}", input.locale));
            }
            let fields = GalleryTranslationFields {
                title: input.fields.title.trim().to_string(),
                description: non_blank(input.fields.description),
            };
            check_fields(&mut errors, &format!("translations.{}.", input.locale), &fields);
            rows.push((input.locale, fields));
        }
        errors.into_result()?;

        GalleryTranslation::replace_all(&self.pool, id, &rows).await?;
        info!(gallery_item_id = %id, count = rows.len(), "Replaced gallery translations");
        Ok(GalleryTranslation::locales(&self.pool, id).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ContentError> {
        let item = GalleryItem::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        GalleryItem::delete(&self.pool, id).await?;
        discard(self.storage.as_ref(), &item.image_url).await;
        info!(gallery_item_id = %id, "Deleted gallery item");
        Ok(())
    }
}
