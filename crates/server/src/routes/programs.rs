use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use deployment::Deployment;
use services::services::content::program::{CreateProgram, ProgramDto, UpdateProgram};
use utils::response::ApiResponse;
use uuid::Uuid;

use super::{ListQuery, LocaleQuery, updated};
use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::AdminUser,
    multipart::{IMAGE_FIELD, MultipartForm},
};

/// GET /api/programs?locale=&page=&per_page=
/// Programs that have a translation in the requested locale
pub async fn list_programs(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ProgramDto>>>, ApiError> {
    let locale = query.locale(&deployment)?;
    let programs = deployment.programs().list(locale, query.page()).await?;
    Ok(ResponseJson(ApiResponse::success(programs)))
}

/// GET /api/programs/{id}?locale=
pub async fn get_program(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<ProgramDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let program = deployment.programs().get(id, locale).await?;
    Ok(ResponseJson(ApiResponse::success(program)))
}

/// GET /api/programs/slug/{slug}?locale=
pub async fn get_program_by_slug(
    State(deployment): State<DeploymentImpl>,
    Path(slug): Path<String>,
    Query(query): Query<LocaleQuery>,
) -> Result<ResponseJson<ApiResponse<ProgramDto>>, ApiError> {
    let locale = query.resolve(&deployment)?;
    let program = deployment.programs().get_by_slug(&slug, locale).await?;
    Ok(ResponseJson(ApiResponse::success(program)))
}

/// POST /api/programs
/// Multipart: program fields plus an optional `image` file
pub async fn create_program(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<ProgramDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD).into_upload();
    let input: CreateProgram = form.parse()?;

    let program = deployment.programs().create(input, image).await?;
    tracing::debug!(admin_id = %admin.id, program_id = %program.program.id, "Program created via API");
    Ok(ResponseJson(ApiResponse::success(program)))
}

/// PATCH /api/programs/{id}
/// Also mounted as PUT. Updates the base row and one locale
pub async fn update_program(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<ProgramDto>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    form.default_field("locale", deployment.default_locale().as_str());
    let image = form.take_image(IMAGE_FIELD);
    let patch: UpdateProgram = form.parse()?;

    let outcome = deployment.programs().update(id, patch, image).await?;
    Ok(ResponseJson(updated(outcome)))
}

/// DELETE /api/programs/{id}
pub async fn delete_program(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.programs().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/programs",
        Router::new()
            .route("/", get(list_programs).post(create_program))
            .route("/slug/{slug}", get(get_program_by_slug))
            .route(
                "/{id}",
                get(get_program)
                    .patch(update_program)
                    .put(update_program)
                    .delete(delete_program),
            ),
    )
}
