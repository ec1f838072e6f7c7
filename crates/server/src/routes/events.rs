use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use deployment::Deployment;
use services::services::content::event::{CreateEvent, EventDto, UpdateEvent};
use utils::response::ApiResponse;
use uuid::Uuid;

use super::{ListQuery, LocaleQuery, updated};
use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::AdminUser,
    multipart::{IMAGE_FIELD, MultipartForm},
};

/// GET /api/events?locale=&page=&per_page=
pub async fn list_events(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<EventDto>>>, ApiError> {
    let locale = query.locale(&deployment)?;
    let events = deployment.events().list(locale, query.page()).await?;
    Ok(ResponseJson(ApiResponse::success(events)))
}

/// GET /api/events/{id}?locale=
pub async fn get_event(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<EventDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let event = deployment.events().get(id, locale).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

/// GET /api/events/slug/{slug}?locale=
pub async fn get_event_by_slug(
    State(deployment): State<DeploymentImpl>,
    Path(slug): Path<String>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<EventDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let event = deployment.events().get_by_slug(&slug, locale).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

/// POST /api/events
pub async fn create_event(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<EventDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD).into_upload();
    let input: CreateEvent = form.parse()?;

    let event = deployment.events().create(input, image).await?;
    tracing::debug!(admin_id = %admin.id, event_id = %event.event.id, "Event created via API");
    Ok(ResponseJson(ApiResponse::success(event)))
}

/// PATCH /api/events/{id}
pub async fn update_event(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<EventDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD);
    let patch: UpdateEvent = form.parse()?;

    let outcome = deployment.events().update(id, patch, image).await?;
    Ok(ResponseJson(updated(outcome)))
}

/// DELETE /api/events/{id}
pub async fn delete_event(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.events().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/events",
        Router::new()
            .route("/", get(list_events).post(create_event))
            .route("/slug/{slug}", get(get_event_by_slug))
            .route(
                "/{id}",
                get(get_event)
                    .patch(update_event)
                    .put(update_event)
                    .delete(delete_event),
            ),
    )
}
