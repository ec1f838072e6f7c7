use db::models::program::{LocalizedProgram, Program, ProgramTranslation, ProgramTranslationFields};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use ts_rs::TS;
use utils::{locale::Locale, text::non_blank};
use uuid::Uuid;

use super::{
    ContentError, MAX_SEO_DESCRIPTION_CHARS, MAX_TITLE_CHARS, Page, StagedImage, UpdateOutcome,
    ValidationErrors, apply_optional_text, apply_text, discard, map_unique_slug, resolve_slug,
    validate_image_change,
};
use crate::services::{
    image::{ImageChange, ImageUpload},
    storage::SharedStorage,
};

const FOLDER: &str = "programs";
const ENTITY: &str = "program";

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct CreateProgram {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

/// Partial update of one translation plus the shared slug. `None` leaves a field as
/// it is; for optional text an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateProgram {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct ProgramDto {
    #[serde(flatten)]
    #[ts(flatten)]
    pub program: LocalizedProgram,
    pub available_locales: Vec<Locale>,
}

#[derive(Clone)]
pub struct ProgramService {
    pool: SqlitePool,
    storage: SharedStorage,
}

fn validate(slug: &str, fields: &ProgramTranslationFields) -> Result<(), ContentError> {
    let mut errors = ValidationErrors::default();
    errors.check_slug(slug);
    errors.require_text("title", &fields.title, Some(MAX_TITLE_CHARS));
    errors.require_text("description", &fields.description, None);
    errors.limit_text("seo_title", fields.seo_title.as_deref(), MAX_TITLE_CHARS);
    errors.limit_text(
        "seo_description",
        fields.seo_description.as_deref(),
        MAX_SEO_DESCRIPTION_CHARS,
    );
    errors.into_result()
}

impl ProgramService {
    pub fn new(pool: SqlitePool, storage: SharedStorage) -> Self {
        Self { pool, storage }
    }

    pub async fn create(
        &self,
        input: CreateProgram,
        image: Option<ImageUpload>,
    ) -> Result<ProgramDto, ContentError> {
        let slug = resolve_slug(input.slug.as_deref(), &input.title);
        let fields = ProgramTranslationFields {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            content: non_blank(input.content),
            seo_title: non_blank(input.seo_title),
            seo_description: non_blank(input.seo_description),
        };
        validate(&slug, &fields)?;

        let change = image.map(ImageChange::Replace).unwrap_or_default();
        let validated = validate_image_change(&change)?;
        if Program::find_by_slug(&self.pool, &slug).await?.is_some() {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged =
            StagedImage::stage(self.storage.as_ref(), FOLDER, None, &change, validated).await?;
        let id = Uuid::new_v4();
        let result = self
            .insert(id, &slug, staged.url.as_deref(), input.locale, &fields)
            .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(program_id = %id, slug, locale = %input.locale, "Created program");
        self.get(id, input.locale).await
    }

    async fn insert(
        &self,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        locale: Locale,
        fields: &ProgramTranslationFields,
    ) -> Result<(), ContentError> {
        let mut tx = self.pool.begin().await?;
        Program::create(&mut *tx, id, slug, image_url)
            .await
            .map_err(|e| map_unique_slug(e, slug))?;
        ProgramTranslation::upsert(&mut *tx, id, locale, fields).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid, locale: Locale) -> Result<ProgramDto, ContentError> {
        let Some(program) = LocalizedProgram::find(&self.pool, id, locale).await? else {
            return Err(match Program::find_by_id(&self.pool, id).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(program).await
    }

    pub async fn get_by_slug(&self, slug: &str, locale: Locale) -> Result<ProgramDto, ContentError> {
        let Some(program) = LocalizedProgram::find_by_slug(&self.pool, slug, locale).await? else {
            return Err(match Program::find_by_slug(&self.pool, slug).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(program).await
    }

    pub async fn list(&self, locale: Locale, page: Page) -> Result<Vec<ProgramDto>, ContentError> {
        let programs =
            LocalizedProgram::list(&self.pool, locale, page.limit(), page.offset()).await?;
        let mut out = Vec::with_capacity(programs.len());
        for program in programs {
            out.push(self.with_locales(program).await?);
        }
        Ok(out)
    }

    pub async fn locales(&self, id: Uuid) -> Result<Vec<Locale>, ContentError> {
        if Program::find_by_id(&self.pool, id).await?.is_none() {
            return Err(ContentError::NotFound(ENTITY));
        }
        Ok(ProgramTranslation::locales(&self.pool, id).await?)
    }

    async fn with_locales(&self, program: LocalizedProgram) -> Result<ProgramDto, ContentError> {
        let available_locales = ProgramTranslation::locales(&self.pool, program.id).await?;
        Ok(ProgramDto {
            program,
            available_locales,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateProgram,
        image: ImageChange,
    ) -> Result<UpdateOutcome<ProgramDto>, ContentError> {
        let program = Program::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        let locale = patch.locale;
        let existing = ProgramTranslation::find(&self.pool, id, locale).await?;

        let mut fields = existing
            .as_ref()
            .map(ProgramTranslationFields::from)
            .unwrap_or_default();
        let mut translation_changed = apply_text(&mut fields.title, patch.title);
        translation_changed |= apply_text(&mut fields.description, patch.description);
        translation_changed |= apply_optional_text(&mut fields.content, patch.content);
        translation_changed |= apply_optional_text(&mut fields.seo_title, patch.seo_title);
        translation_changed |=
            apply_optional_text(&mut fields.seo_description, patch.seo_description);

        let mut slug = program.slug.clone();
        let slug_changed = apply_text(&mut slug, patch.slug.map(|s| s.to_lowercase()));

        validate(&slug, &fields)?;
        let validated = validate_image_change(&image)?;
        let image = match image {
            ImageChange::Remove if program.image_url.is_none() => ImageChange::Keep,
            other => other,
        };

        if !translation_changed && !slug_changed && image.is_keep() {
            debug!(program_id = %id, %locale, "Program update has no changes");
            return Ok(UpdateOutcome::Unchanged(self.get(id, locale).await?));
        }

        if slug_changed
            && Program::find_by_slug(&self.pool, &slug)
                .await?
                .is_some_and(|other| other.id != id)
        {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged = StagedImage::stage(
            self.storage.as_ref(),
            FOLDER,
            program.image_url.as_deref(),
            &image,
            validated,
        )
        .await?;
        let translation = translation_changed.then_some(&fields);
        let result = self
            .write_update(id, &slug, staged.url.as_deref(), locale, translation)
            .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(program_id = %id, %locale, slug_changed, translation_changed, "Updated program");
        Ok(UpdateOutcome::Updated(self.get(id, locale).await?))
    }

    async fn write_update(
        &self,
        id: Uuid,
        slug: &str,
        image_url: Option<&str>,
        locale: Locale,
        translation: Option<&ProgramTranslationFields>,
    ) -> Result<(), ContentError> {
        let mut tx = self.pool.begin().await?;
        Program::update_base(&mut *tx, id, slug, image_url)
            .await
            .map_err(|e| map_unique_slug(e, slug))?;
        if let Some(fields) = translation {
            ProgramTranslation::upsert(&mut *tx, id, locale, fields).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes the program with all translations, then its image.
    pub async fn delete(&self, id: Uuid) -> Result<(), ContentError> {
        let program = Program::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        Program::delete(&self.pool, id).await?;
        if let Some(url) = &program.image_url {
            discard(self.storage.as_ref(), url).await;
        }
        info!(program_id = %id, "Deleted program");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        content::test_support::{storage, test_pool},
        image::fixtures::png,
    };

    fn input(locale: Locale, slug: &str, title: &str) -> CreateProgram {
        CreateProgram {
            locale,
            slug: Some(slug.to_string()),
            title: title.to_string(),
            description: "Daily memorization with an instructor".to_string(),
            content: Some("Sunday to Thursday after Asr".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_locale_reads_back_identically() {
        let (pool, _dir) = test_pool().await;
        let service = ProgramService::new(pool, storage());

        let created = service
            .create(input(Locale::Ar, "hifz", "حلقة التحفيظ"), None)
            .await
            .unwrap();
        let read = service.get(created.program.id, Locale::Ar).await.unwrap();

        assert_eq!(read.program.title, "حلقة التحفيظ");
        assert_eq!(read.program.content.as_deref(), Some("Sunday to Thursday after Asr"));
        assert_eq!(read.available_locales, vec![Locale::Ar]);
        assert_eq!(service.get_by_slug("hifz", Locale::Ar).await.unwrap(), read);
    }

    #[tokio::test]
    async fn missing_translation_is_not_found() {
        let (pool, _dir) = test_pool().await;
        let service = ProgramService::new(pool, storage());
        let created = service
            .create(input(Locale::Ar, "tajweed", "التجويد"), None)
            .await
            .unwrap();

        let err = service.get(created.program.id, Locale::En).await.unwrap_err();
        assert!(matches!(err, ContentError::TranslationNotFound { locale: Locale::En, .. }));
        let err = service.get(Uuid::new_v4(), Locale::Ar).await.unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_image_leaves_program_untouched() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool, files.clone());
        let created = service
            .create(input(Locale::En, "kids", "Kids circle"), Some(png(128)))
            .await
            .unwrap();
        let before = created.program.clone();

        let patch = UpdateProgram {
            locale: Locale::En,
            title: Some("Kids weekend circle".into()),
            ..Default::default()
        };
        let err = service
            .update(before.id, patch, ImageChange::Replace(png(6 * 1024 * 1024)))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::Image(_)));
        assert_eq!(files.put_count(), 1);
        assert_eq!(service.get(before.id, Locale::En).await.unwrap().program, before);
    }

    #[tokio::test]
    async fn delete_removes_translations_and_image() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool.clone(), files.clone());
        let created = service
            .create(input(Locale::Ar, "adults", "حلقة الكبار"), Some(png(64)))
            .await
            .unwrap();
        let id = created.program.id;
        service
            .update(
                id,
                UpdateProgram {
                    locale: Locale::En,
                    title: Some("Adults circle".into()),
                    description: Some("Evening classes".into()),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap();
        let image_url = created.program.image_url.clone().unwrap();

        service.delete(id).await.unwrap();

        assert_eq!(ProgramTranslation::count_for(&pool, id).await.unwrap(), 0);
        assert!(files.deleted().contains(&image_url));
        assert!(files.stored().is_empty());
        assert!(matches!(service.delete(id).await, Err(ContentError::NotFound(_))));
    }

    #[tokio::test]
    async fn slug_collision_writes_nothing() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool, files.clone());
        service.create(input(Locale::En, "taken", "First"), None).await.unwrap();
        let second = service.create(input(Locale::En, "free", "Second"), None).await.unwrap();

        let patch = UpdateProgram {
            locale: Locale::En,
            slug: Some("taken".into()),
            title: Some("Second renamed".into()),
            ..Default::default()
        };
        let err = service
            .update(second.program.id, patch, ImageChange::Replace(png(64)))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::SlugTaken(ref s) if s == "taken"));
        assert_eq!(files.put_count(), 0);
        let after = service.get(second.program.id, Locale::En).await.unwrap();
        assert_eq!(after.program.slug, "free");
        assert_eq!(after.program.title, "Second");
    }

    #[tokio::test]
    async fn identical_submission_is_unchanged() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool, files.clone());
        let created = service.create(input(Locale::En, "quran", "Quran"), None).await.unwrap();

        let patch = UpdateProgram {
            locale: Locale::En,
            slug: Some("quran".into()),
            title: Some("Quran".into()),
            description: Some(created.program.description.clone()),
            ..Default::default()
        };
        let outcome = service
            .update(created.program.id, patch, ImageChange::Remove)
            .await
            .unwrap();

        assert!(!outcome.is_updated());
        assert_eq!(outcome.into_inner().program.updated_at, created.program.updated_at);
        assert_eq!(files.put_count(), 0);
        assert!(files.deleted().is_empty());
    }

    #[tokio::test]
    async fn new_locale_requires_title_and_description() {
        let (pool, _dir) = test_pool().await;
        let service = ProgramService::new(pool, storage());
        let created = service.create(input(Locale::Ar, "fiqh", "الفقه"), None).await.unwrap();

        let err = service
            .update(
                created.program.id,
                UpdateProgram {
                    locale: Locale::En,
                    title: Some("Fiqh".into()),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap_err();
        let ContentError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.0.contains_key("description"));
    }

    #[tokio::test]
    async fn replacing_image_deletes_old_file_after_commit() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool, files.clone());
        let created = service
            .create(input(Locale::En, "seerah", "Seerah"), Some(png(64)))
            .await
            .unwrap();
        let old = created.program.image_url.clone().unwrap();

        let updated = service
            .update(
                created.program.id,
                UpdateProgram {
                    locale: Locale::En,
                    ..Default::default()
                },
                ImageChange::Replace(png(96)),
            )
            .await
            .unwrap()
            .into_inner();

        let new = updated.program.image_url.unwrap();
        assert_ne!(new, old);
        assert_eq!(files.deleted(), vec![old]);
        assert_eq!(files.stored(), vec![new]);
    }

    #[tokio::test]
    async fn failed_write_deletes_fresh_upload() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        *files.close_on_put.lock().unwrap() = Some(pool.clone());
        let service = ProgramService::new(pool, files.clone());

        let result = service
            .create(input(Locale::En, "arabic", "Arabic"), Some(png(64)))
            .await;

        assert!(matches!(result, Err(ContentError::Database(_))));
        assert_eq!(files.put_count(), 1);
        assert!(files.stored().is_empty());
        assert_eq!(files.deleted().len(), 1);
    }

    #[tokio::test]
    async fn failed_update_keeps_old_image() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = ProgramService::new(pool.clone(), files.clone());
        let created = service
            .create(input(Locale::En, "nahw", "Nahw"), Some(png(64)))
            .await
            .unwrap();
        let old = created.program.image_url.clone().unwrap();
        *files.close_on_put.lock().unwrap() = Some(pool);

        let result = service
            .update(
                created.program.id,
                UpdateProgram {
                    locale: Locale::En,
                    title: Some("Arabic grammar".into()),
                    ..Default::default()
                },
                ImageChange::Replace(png(96)),
            )
            .await;

        assert!(matches!(result, Err(ContentError::Database(_))));
        assert_eq!(files.put_count(), 2);
        assert_eq!(files.stored(), vec![old.clone()]);
        let deleted = files.deleted();
        assert_eq!(deleted.len(), 1);
        assert_ne!(deleted[0], old);
    }

    #[tokio::test]
    async fn arabic_title_without_slug_gets_generated_slug() {
        let (pool, _dir) = test_pool().await;
        let service = ProgramService::new(pool, storage());
        let create = CreateProgram {
            slug: None,
            ..input(Locale::Ar, "", "حلقة التحفيظ")
        };

        let created = service.create(create, None).await.unwrap();

        let slug = created.program.slug.clone();
        assert!(utils::text::is_valid_slug(&slug));
        let read = service.get_by_slug(&slug, Locale::Ar).await.unwrap();
        assert_eq!(read.program.title, "حلقة التحفيظ");
    }
}
