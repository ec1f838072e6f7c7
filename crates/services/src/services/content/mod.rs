//! Localized content (programs, news, events, gallery) shared by the REST handlers
//! and the assistant tools.
//!
//! Every resource is a base row plus one translation row per locale. Writes that
//! involve an image follow the same order: validate everything, upload the new
//! image, commit the database transaction, then delete the image that was
//! replaced. If the transaction fails the fresh upload is deleted instead, so a
//! failed request never leaves a row pointing at a missing file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use ts_rs::TS;
use utils::locale::Locale;

use super::{
    image::{ImageChange, ImageError, ImageUpload, ValidImage},
    storage::{FileStorage, StorageError},
};

pub mod event;
pub mod gallery;
pub mod news;
pub mod program;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_SEO_DESCRIPTION_CHARS: usize = 320;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{entity} has no {locale} translation")]
    TranslationNotFound { entity: &'static str, locale: Locale },
    #[error("slug '{0}' is already in use")]
    SlugTaken(String),
}

/// Field name to message, serialized as the `error_data` of a 400 response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ContentError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ContentError::Validation(self))
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> ContentError {
        let mut errors = Self::default();
        errors.add(field, message);
        ContentError::Validation(errors)
    }

    /// Required text: present and non-blank, at most `max` characters.
    pub fn require_text(&mut self, field: &str, value: &str, max: Option<usize>) {
        if value.trim().is_empty() {
            self.add(field, "is required");
        } else if let Some(max) = max.filter(|max| value.chars().count() > *max) {
            self.add(field, format!("must be at most {max} characters"));
        }
    }

    pub fn limit_text(&mut self, field: &str, value: Option<&str>, max: usize) {
        if value.is_some_and(|v| v.chars().count() > max) {
            self.add(field, format!("must be at most {max} characters"));
        }
    }

    pub fn check_slug(&mut self, slug: &str) {
        if !utils::text::is_valid_slug(slug) {
            self.add("slug", "must contain only lowercase letters, digits and single dashes");
        }
    }
}

/// Paging for list endpoints; `page` is 1-based.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, TS)]
pub struct Page {
    #[serde(default = "Page::default_page")]
    pub page: u32,
    #[serde(default = "Page::default_per_page")]
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    fn default_page() -> u32 {
        1
    }

    fn default_per_page() -> u32 {
        20
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }
}

/// Result of an update. Submissions identical to what is stored yield `Unchanged`
/// and perform no writes.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    Updated(T),
    Unchanged(T),
}

impl<T> UpdateOutcome<T> {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            UpdateOutcome::Updated(v) | UpdateOutcome::Unchanged(v) => v,
        }
    }
}

/// Sets `target` to the trimmed `value` if one was submitted and it differs.
pub(crate) fn apply_text(target: &mut String, value: Option<String>) -> bool {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if *target != v => {
            *target = v;
            true
        }
        _ => false,
    }
}

/// Like [`apply_text`] for nullable columns: a blank submission clears the value.
pub(crate) fn apply_optional_text(target: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(v) => {
            let v = utils::text::non_blank(Some(v));
            if *target != v {
                *target = v;
                true
            } else {
                false
            }
        }
        None => false,
    }
}

pub(crate) fn apply_value<T: PartialEq>(target: &mut T, value: Option<T>) -> bool {
    match value {
        Some(v) if *target != v => {
            *target = v;
            true
        }
        _ => false,
    }
}

/// Validates the upload carried by an image change before any write happens.
pub(crate) fn validate_image_change(change: &ImageChange) -> Result<Option<ValidImage>, ContentError> {
    match change {
        ImageChange::Replace(upload) => Ok(Some(upload.validate()?)),
        ImageChange::Keep | ImageChange::Remove => Ok(None),
    }
}

/// Image state between upload and database commit.
#[derive(Debug, Default)]
pub(crate) struct StagedImage {
    /// Value the image column should take.
    pub url: Option<String>,
    /// Freshly uploaded file, removed if the write fails.
    uploaded: Option<String>,
    /// Previous file, removed once the write succeeds.
    replaced: Option<String>,
}

impl StagedImage {
    pub fn changed(&self) -> bool {
        self.uploaded.is_some() || self.replaced.is_some()
    }

    /// Uploads the new image (if any) and records what must be cleaned up afterwards.
    pub async fn stage(
        storage: &dyn FileStorage,
        folder: &str,
        current: Option<&str>,
        change: &ImageChange,
        validated: Option<ValidImage>,
    ) -> Result<Self, ContentError> {
        match (change, validated) {
            (ImageChange::Keep, _) => Ok(Self {
                url: current.map(str::to_string),
                ..Default::default()
            }),
            (ImageChange::Remove, _) => Ok(Self {
                url: None,
                uploaded: None,
                replaced: current.map(str::to_string),
            }),
            (ImageChange::Replace(upload), validated) => {
                let image = match validated {
                    Some(image) => image,
                    None => upload.validate()?,
                };
                let stored = storage
                    .put(folder, &image.object_name(), image.bytes.clone(), image.content_type)
                    .await?;
                Ok(Self {
                    url: Some(stored.url.clone()),
                    uploaded: Some(stored.url),
                    replaced: current.map(str::to_string),
                })
            }
        }
    }

    /// Runs the compensating delete matching the outcome of the database write.
    pub async fn settle<T>(
        self,
        storage: &dyn FileStorage,
        result: Result<T, ContentError>,
    ) -> Result<T, ContentError> {
        let stale = if result.is_ok() { self.replaced } else { self.uploaded };
        if let Some(url) = stale {
            discard(storage, &url).await;
        }
        result
    }
}

/// Best-effort delete; a leftover file is logged rather than failing the request.
pub(crate) async fn discard(storage: &dyn FileStorage, url: &str) {
    if let Err(e) = storage.delete(url).await {
        warn!(url, error = %e, "Failed to delete stored image");
    }
}

pub(crate) fn map_unique_slug(err: sqlx::Error, slug: &str) -> ContentError {
    if db::is_unique_violation(&err) {
        ContentError::SlugTaken(slug.to_string())
    } else {
        ContentError::Database(err)
    }
}

/// Slug to use for a new entity: the submitted one, or one derived from the title.
/// Titles with no ASCII letters or digits (Arabic-only) get a generated `entry-<id>` slug.
pub(crate) fn resolve_slug(slug: Option<&str>, title: &str) -> String {
    if let Some(slug) = utils::text::non_blank(slug.map(str::to_string)) {
        return slug.to_lowercase();
    }
    let derived = utils::text::slugify(title);
    if derived.is_empty() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("entry-{}", &id[..8])
    } else {
        derived
    }
}

/// Convenience for callers that received an optional upload.
pub fn image_change_from(upload: Option<ImageUpload>, remove: bool) -> ImageChange {
    match (upload, remove) {
        (Some(upload), _) => ImageChange::Replace(upload),
        (None, true) => ImageChange::Remove,
        (None, false) => ImageChange::Keep,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    use crate::services::storage::{FileStorage, StorageBackend, StorageError, StoredFile};

    /// In-memory storage that records every call.
    #[derive(Default)]
    pub struct RecordingStorage {
        pub files: Mutex<Vec<String>>,
        pub puts: Mutex<usize>,
        pub deletes: Mutex<Vec<String>>,
        /// Closed right after the next upload, to make the following database write fail.
        pub close_on_put: Mutex<Option<sqlx::SqlitePool>>,
    }

    impl RecordingStorage {
        pub fn put_count(&self) -> usize {
            *self.puts.lock().unwrap()
        }

        pub fn stored(&self) -> Vec<String> {
            self.files.lock().unwrap().clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FileStorage for RecordingStorage {
        async fn put(
            &self,
            folder: &str,
            file_name: &str,
            _bytes: Bytes,
            _content_type: &str,
        ) -> Result<StoredFile, StorageError> {
            let url = format!("/uploads/{folder}/{file_name}");
            *self.puts.lock().unwrap() += 1;
            self.files.lock().unwrap().push(url.clone());
            let pool = self.close_on_put.lock().unwrap().take();
            if let Some(pool) = pool {
                pool.close().await;
            }
            Ok(StoredFile { url, size: 0 })
        }

        async fn delete(&self, url: &str) -> Result<(), StorageError> {
            self.files.lock().unwrap().retain(|f| f != url);
            self.deletes.lock().unwrap().push(url.to_string());
            Ok(())
        }

        fn backend(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    pub async fn test_pool() -> (sqlx::SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("content.db").display());
        let db = db::DBService::new(&url).await.unwrap();
        (db.pool, dir)
    }

    pub fn storage() -> Arc<RecordingStorage> {
        Arc::new(RecordingStorage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_helpers_only_report_real_differences() {
        let mut title = "Hifz".to_string();
        assert!(!apply_text(&mut title, Some(" Hifz ".into())));
        assert!(!apply_text(&mut title, None));
        assert!(apply_text(&mut title, Some("Hifz Circle".into())));
        assert_eq!(title, "Hifz Circle");

        let mut seo = Some("x".to_string());
        assert!(!apply_optional_text(&mut seo, Some("x".into())));
        assert!(apply_optional_text(&mut seo, Some("  ".into())));
        assert_eq!(seo, None);
        assert!(!apply_optional_text(&mut seo, Some("".into())));
    }

    #[test]
    fn page_bounds() {
        let page = Page { page: 0, per_page: 1000 };
        assert_eq!(page.limit(), 100);
        assert_eq!(page.offset(), 0);
        assert_eq!(Page { page: 3, per_page: 10 }.offset(), 20);
    }

    #[test]
    fn slug_resolution() {
        assert_eq!(resolve_slug(Some(" Open-Day "), "ignored"), "open-day");
        assert_eq!(resolve_slug(None, "Ramadan Night Prayers"), "ramadan-night-prayers");
        let generated = resolve_slug(None, "حلقة التحفيظ");
        assert!(generated.starts_with("entry-"));
        assert!(utils::text::is_valid_slug(&generated));
        assert_ne!(generated, resolve_slug(None, "حلقة التحفيظ"));
    }
}
