use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::UserProfile;
use deployment::Deployment;
use services::services::users::{AdminUserPatch, ProfilePatch};
use utils::response::ApiResponse;
use uuid::Uuid;

use super::{ListQuery, updated};
use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::{AdminUser, CurrentUser},
    multipart::MultipartForm,
};

const NATIONAL_ID_FIELD: &str = "national_id_image";

/// GET /api/users/me
pub async fn get_me(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let profile = deployment.users().me(user.id).await?;
    Ok(ResponseJson(ApiResponse::success(profile)))
}

/// PATCH /api/users/me
/// Multipart profile edit; the national ID scan goes in `national_id_image`.
pub async fn update_me(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let mut form = MultipartForm::read(multipart).await?;
    let national_id = form.take_image(NATIONAL_ID_FIELD);
    let patch: ProfilePatch = form.parse()?;

    let outcome = deployment
        .users()
        .update_profile(user.id, patch, national_id)
        .await?;
    Ok(ResponseJson(updated(outcome)))
}

/// GET /api/users?page=&per_page=
pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let users = deployment.users().list(query.page()).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let user = deployment.users().get(id).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

/// PATCH /api/users/{id}
/// Role and verification changes by an admin
pub async fn update_user(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<AdminUserPatch>,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let outcome = deployment.users().update(admin.id, id, patch).await?;
    Ok(ResponseJson(updated(outcome)))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.users().delete(admin.id, id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/users",
        Router::new()
            .route("/", get(list_users))
            .route("/me", get(get_me).patch(update_me))
            .route(
                "/{id}",
                get(get_user).patch(update_user).delete(delete_user),
            ),
    )
}
