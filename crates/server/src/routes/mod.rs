use std::str::FromStr;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use deployment::Deployment;
use serde::Deserialize;
use services::services::{
    content::{Page, UpdateOutcome},
    image::MAX_IMAGE_BYTES,
    storage::StorageBackend,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utils::{locale::Locale, response::ApiResponse};

use crate::{DeploymentImpl, error::ApiError};

pub mod auth;
pub mod chat;
pub mod contacts;
pub mod events;
pub mod gallery;
pub mod health;
pub mod news;
pub mod programs;
pub mod users;

/// `?locale=` on read endpoints. Missing means the site default.
#[derive(Debug, Default, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

impl LocaleQuery {
    pub fn resolve(&self, deployment: &DeploymentImpl) -> Result<Locale, ApiError> {
        parse_locale(self.locale.as_deref(), deployment.default_locale())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub locale: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    pub fn locale(&self, deployment: &DeploymentImpl) -> Result<Locale, ApiError> {
        parse_locale(self.locale.as_deref(), deployment.default_locale())
    }

    pub fn page(&self) -> Page {
        let default = Page::default();
        Page {
            page: self.page.unwrap_or(default.page),
            per_page: self.per_page.unwrap_or(default.per_page),
        }
    }
}

fn parse_locale(tag: Option<&str>, default: Locale) -> Result<Locale, ApiError> {
    match tag.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(default),
        Some(tag) => Locale::from_str(tag)
            .map_err(|_| ApiError::BadRequest(format!("unsupported locale '{tag}'"))),
    }
}

/// Unchanged submissions still succeed, with the stored entity and a note.
pub fn updated<T>(outcome: UpdateOutcome<T>) -> ApiResponse<T> {
    match outcome {
        UpdateOutcome::Updated(value) => ApiResponse::success(value),
        UpdateOutcome::Unchanged(value) => {
            ApiResponse::success_with_message(value, "No changes detected")
        }
    }
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::router(&deployment))
        .merge(programs::router(&deployment))
        .merge(news::router(&deployment))
        .merge(events::router(&deployment))
        .merge(gallery::router(&deployment))
        .merge(contacts::router(&deployment))
        .merge(users::router(&deployment))
        .merge(chat::router(&deployment));

    let storage = &deployment.config().storage;
    let mut app = Router::new().nest("/api", api);
    if deployment.storage().backend() == StorageBackend::Local {
        app = app.nest_service(&storage.public_prefix, ServeDir::new(&storage.uploads_dir));
    }

    app.layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES * 2))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_defaults_and_rejects_unknown_tags() {
        assert_eq!(parse_locale(None, Locale::Ar).unwrap(), Locale::Ar);
        assert_eq!(parse_locale(Some(" "), Locale::En).unwrap(), Locale::En);
        assert_eq!(parse_locale(Some("EN"), Locale::Ar).unwrap(), Locale::En);
        assert!(matches!(parse_locale(Some("fr"), Locale::Ar), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn paging_falls_back_to_defaults() {
        let query = ListQuery {
            per_page: Some(5),
            ..Default::default()
        };
        let page = query.page();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 5);
    }
}
