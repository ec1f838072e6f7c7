use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use deployment::Deployment;
use services::services::content::gallery::{
    CreateGalleryItem, GalleryItemDto, GalleryTranslationInput, UpdateGalleryItem,
};
use utils::{locale::Locale, response::ApiResponse};
use uuid::Uuid;

use super::{ListQuery, LocaleQuery, updated};
use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::AdminUser,
    multipart::{IMAGE_FIELD, MultipartForm},
};

/// GET /api/gallery?locale=&page=&per_page=
pub async fn list_gallery(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<GalleryItemDto>>>, ApiError> {
    let locale = query.locale(&deployment)?;
    let items = deployment.gallery().list(locale, query.page()).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

/// GET /api/gallery/{id}?locale=
pub async fn get_gallery_item(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<GalleryItemDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let item = deployment.gallery().get(id, locale).await?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// POST /api/gallery
/// Multipart; the `image` file is required
pub async fn create_gallery_item(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<GalleryItemDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD).into_upload();
    let input: CreateGalleryItem = form.parse()?;

    // A missing photo is reported as a validation error by the service.
    let item = deployment.gallery().create(input, image).await?;
    tracing::debug!(admin_id = %admin.id, gallery_item_id = %item.item.id, "Gallery item created via API");
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// PATCH /api/gallery/{id}
pub async fn update_gallery_item(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<GalleryItemDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD);
    let patch: UpdateGalleryItem = form.parse()?;

    let outcome = deployment.gallery().update(id, patch, image).await?;
    Ok(ResponseJson(updated(outcome)))
}

/// DELETE /api/gallery/{id}
pub async fn delete_gallery_item(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.gallery().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// PUT /api/gallery/{id}/translations
/// Replaces every translation at once and returns the stored locales
pub async fn replace_translations(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(translations): Json<Vec<GalleryTranslationInput>>,
) -> Result<ResponseJson<ApiResponse<Vec<Locale>>>, ApiError> {
    let locales = deployment.gallery().replace_translations(id, translations).await?;
    Ok(ResponseJson(ApiResponse::success(locales)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/gallery",
        Router::new()
            .route("/", get(list_gallery).post(create_gallery_item))
            .route(
                "/{id}",
                get(get_gallery_item)
                    .patch(update_gallery_item)
                    .put(update_gallery_item)
                    .delete(delete_gallery_item),
            )
            .route("/{id}/translations", put(replace_translations)),
    )
}
