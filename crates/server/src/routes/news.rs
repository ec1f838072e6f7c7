use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use deployment::Deployment;
use services::services::content::news::{CreateNews, NewsDto, UpdateNews};
use utils::response::ApiResponse;
use uuid::Uuid;

use super::{ListQuery, LocaleQuery, updated};
use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::AdminUser,
    multipart::{IMAGE_FIELD, MultipartForm},
};

/// GET /api/news?locale=&page=&per_page=
pub async fn list_news(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<NewsDto>>>, ApiError> {
    let locale = query.locale(&deployment)?;
    let news = deployment.news().list(locale, query.page()).await?;
    Ok(ResponseJson(ApiResponse::success(news)))
}

/// GET /api/news/{id}?locale=
pub async fn get_news(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<NewsDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let news = deployment.news().get(id, locale).await?;
    Ok(ResponseJson(ApiResponse::success(news)))
}

/// GET /api/news/slug/{slug}?locale=
pub async fn get_news_by_slug(
    State(deployment): State<DeploymentImpl>,
    Path(slug): Path<String>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<NewsDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let news = deployment.news().get_by_slug(&slug, locale).await?;
    Ok(ResponseJson(ApiResponse::success(news)))
}

/// POST /api/news
/// Multipart: news fields plus an optional `image` file
pub async fn create_news(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<NewsDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD).into_upload();
    let input: CreateNews = form.parse()?;

    let news = deployment.news().create(input, image).await?;
    tracing::debug!(admin_id = %admin.id, news_id = %news.news.id, "News article created via API");
    Ok(ResponseJson(ApiResponse::success(news)))
}

/// PATCH /api/news/{id}
pub async fn update_news(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<NewsDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD);
    let patch: UpdateNews = form.parse()?;

    let outcome = deployment.news().update(id, patch, image).await?;
    Ok(ResponseJson(updated(outcome)))
}

/// DELETE /api/news/{id}
pub async fn delete_news(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.news().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/news",
        Router::new()
            .route("/", get(list_news).post(create_news))
            .route("/slug/{slug}", get(get_news_by_slug))
            .route(
                "/{id}",
                get(get_news)
                    .patch(update_news)
                    .put(update_news)
                    .delete(delete_news),
            ),
    )
}
