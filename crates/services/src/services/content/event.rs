use chrono::{DateTime, Utc};
use db::models::event::{
    Event, EventSchedule, EventTranslation, EventTranslationFields, LocalizedEvent,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use ts_rs::TS;
use utils::{locale::Locale, text::non_blank};
use uuid::Uuid;

use super::{
    ContentError, MAX_TITLE_CHARS, Page, StagedImage, UpdateOutcome, ValidationErrors,
    apply_optional_text, apply_text, apply_value, discard, map_unique_slug, resolve_slug,
    validate_image_change,
};
use crate::services::{
    image::{ImageChange, ImageUpload},
    storage::SharedStorage,
};

const FOLDER: &str = "events";
const ENTITY: &str = "event";

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateEvent {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateEvent {
    #[serde(default)]
    pub locale: Locale,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    /// `null` clears the end time, an absent field keeps it.
    #[serde(default, with = "serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct EventDto {
    #[serde(flatten)]
    #[ts(flatten)]
    pub event: LocalizedEvent,
    pub available_locales: Vec<Locale>,
}

#[derive(Clone)]
pub struct EventService {
    pool: SqlitePool,
    storage: SharedStorage,
}

fn validate(
    slug: &str,
    fields: &EventTranslationFields,
    schedule: &EventSchedule,
) -> Result<(), ContentError> {
    let mut errors = ValidationErrors::default();
    errors.check_slug(slug);
    errors.require_text("title", &fields.title, Some(MAX_TITLE_CHARS));
    errors.require_text("description", &fields.description, None);
    errors.limit_text("location", fields.location.as_deref(), MAX_TITLE_CHARS);
    if schedule.ends_at.is_some_and(|end| end < schedule.starts_at) {
        errors.add("ends_at", "must not be before starts_at");
    }
    errors.into_result()
}

impl EventService {
    pub fn new(pool: SqlitePool, storage: SharedStorage) -> Self {
        Self { pool, storage }
    }

    pub async fn create(
        &self,
        input: CreateEvent,
        image: Option<ImageUpload>,
    ) -> Result<EventDto, ContentError> {
        let slug = resolve_slug(input.slug.as_deref(), &input.title);
        let fields = EventTranslationFields {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            location: non_blank(input.location),
        };
        let schedule = EventSchedule {
            starts_at: input.starts_at,
            ends_at: input.ends_at,
        };
        validate(&slug, &fields, &schedule)?;

        let change = image.map(ImageChange::Replace).unwrap_or_default();
        let validated = validate_image_change(&change)?;
        if Event::find_by_slug(&self.pool, &slug).await?.is_some() {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged =
            StagedImage::stage(self.storage.as_ref(), FOLDER, None, &change, validated).await?;
        let id = Uuid::new_v4();
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            Event::create(&mut *tx, id, &slug, staged.url.as_deref(), schedule)
                .await
                .map_err(|e| map_unique_slug(e, &slug))?;
            EventTranslation::upsert(&mut *tx, id, input.locale, &fields).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(event_id = %id, slug, starts_at = %schedule.starts_at, "Created event");
        self.get(id, input.locale).await
    }

    pub async fn get(&self, id: Uuid, locale: Locale) -> Result<EventDto, ContentError> {
        let Some(event) = LocalizedEvent::find(&self.pool, id, locale).await? else {
            return Err(match Event::find_by_id(&self.pool, id).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(event).await
    }

    pub async fn get_by_slug(&self, slug: &str, locale: Locale) -> Result<EventDto, ContentError> {
        let Some(event) = LocalizedEvent::find_by_slug(&self.pool, slug, locale).await? else {
            return Err(match Event::find_by_slug(&self.pool, slug).await? {
                Some(_) => ContentError::TranslationNotFound { entity: ENTITY, locale },
                None => ContentError::NotFound(ENTITY),
            });
        };
        self.with_locales(event).await
    }

    pub async fn list(&self, locale: Locale, page: Page) -> Result<Vec<EventDto>, ContentError> {
        let events = LocalizedEvent::list(&self.pool, locale, page.limit(), page.offset()).await?;
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            out.push(self.with_locales(event).await?);
        }
        Ok(out)
    }

    pub async fn locales(&self, id: Uuid) -> Result<Vec<Locale>, ContentError> {
        if Event::find_by_id(&self.pool, id).await?.is_none() {
            return Err(ContentError::NotFound(ENTITY));
        }
        Ok(EventTranslation::locales(&self.pool, id).await?)
    }

    async fn with_locales(&self, event: LocalizedEvent) -> Result<EventDto, ContentError> {
        let available_locales = EventTranslation::locales(&self.pool, event.id).await?;
        Ok(EventDto {
            event,
            available_locales,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateEvent,
        image: ImageChange,
    ) -> Result<UpdateOutcome<EventDto>, ContentError> {
        let event = Event::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        let locale = patch.locale;
        let existing = EventTranslation::find(&self.pool, id, locale).await?;

        let mut fields = existing
            .as_ref()
            .map(EventTranslationFields::from)
            .unwrap_or_default();
        let mut translation_changed = apply_text(&mut fields.title, patch.title);
        translation_changed |= apply_text(&mut fields.description, patch.description);
        translation_changed |= apply_optional_text(&mut fields.location, patch.location);

        let mut slug = event.slug.clone();
        let slug_changed = apply_text(&mut slug, patch.slug.map(|s| s.to_lowercase()));
        let mut schedule = event.schedule();
        let mut schedule_changed = apply_value(&mut schedule.starts_at, patch.starts_at);
        schedule_changed |= apply_value(&mut schedule.ends_at, patch.ends_at);

        validate(&slug, &fields, &schedule)?;
        let validated = validate_image_change(&image)?;
        let image = match image {
            ImageChange::Remove if event.image_url.is_none() => ImageChange::Keep,
            other => other,
        };

        if !translation_changed && !slug_changed && !schedule_changed && image.is_keep() {
            debug!(event_id = %id, %locale, "Event update has no changes");
            return Ok(UpdateOutcome::Unchanged(self.get(id, locale).await?));
        }

        if slug_changed
            && Event::find_by_slug(&self.pool, &slug)
                .await?
                .is_some_and(|other| other.id != id)
        {
            return Err(ContentError::SlugTaken(slug));
        }

        let staged = StagedImage::stage(
            self.storage.as_ref(),
            FOLDER,
            event.image_url.as_deref(),
            &image,
            validated,
        )
        .await?;
        let result: Result<(), ContentError> = async {
            let mut tx = self.pool.begin().await?;
            Event::update_base(&mut *tx, id, &slug, staged.url.as_deref(), schedule)
                .await
                .map_err(|e| map_unique_slug(e, &slug))?;
            if translation_changed {
                EventTranslation::upsert(&mut *tx, id, locale, &fields).await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        staged.settle(self.storage.as_ref(), result).await?;

        info!(event_id = %id, %locale, schedule_changed, translation_changed, "Updated event");
        Ok(UpdateOutcome::Updated(self.get(id, locale).await?))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ContentError> {
        let event = Event::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContentError::NotFound(ENTITY))?;
        Event::delete(&self.pool, id).await?;
        if let Some(url) = &event.image_url {
            discard(self.storage.as_ref(), url).await;
        }
        info!(event_id = %id, "Deleted event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::services::content::test_support::{storage, test_pool};

    fn input(slug: &str) -> CreateEvent {
        let starts_at = Utc.with_ymd_and_hms(2026, 3, 20, 17, 0, 0).unwrap();
        CreateEvent {
            locale: Locale::En,
            slug: Some(slug.to_string()),
            title: "Quran competition".to_string(),
            description: "Annual recitation competition".to_string(),
            location: Some("Main hall".to_string()),
            starts_at,
            ends_at: Some(starts_at + Duration::hours(3)),
        }
    }

    #[tokio::test]
    async fn end_before_start_is_rejected() {
        let (pool, _dir) = test_pool().await;
        let service = EventService::new(pool, storage());
        let mut bad = input("competition");
        bad.ends_at = Some(bad.starts_at - Duration::hours(1));

        let err = service.create(bad, None).await.unwrap_err();
        assert!(matches!(err, ContentError::Validation(ref e) if e.0.contains_key("ends_at")));
    }

    #[tokio::test]
    async fn clearing_end_time_is_a_change() {
        let (pool, _dir) = test_pool().await;
        let service = EventService::new(pool, storage());
        let created = service.create(input("open-day"), None).await.unwrap();

        let same = service
            .update(
                created.event.id,
                UpdateEvent {
                    locale: Locale::En,
                    starts_at: Some(created.event.starts_at),
                    location: Some("Main hall".into()),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap();
        assert!(!same.is_updated());

        let cleared = service
            .update(
                created.event.id,
                UpdateEvent {
                    locale: Locale::En,
                    ends_at: Some(None),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap();
        assert!(cleared.is_updated());
        assert_eq!(cleared.into_inner().event.ends_at, None);
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let absent: UpdateEvent = serde_json::from_str(r#"{"locale":"en"}"#).unwrap();
        assert_eq!(absent.ends_at, None);
        let null: UpdateEvent = serde_json::from_str(r#"{"locale":"en","ends_at":null}"#).unwrap();
        assert_eq!(null.ends_at, Some(None));
    }
}
