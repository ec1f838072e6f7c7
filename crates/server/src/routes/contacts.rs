use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::contact::{Contact, CreateContact};
use deployment::Deployment;
use serde::Deserialize;
use services::services::content::Page;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::AdminUser};

#[derive(Debug, Default, Deserialize)]
pub struct ContactListQuery {
    #[serde(default)]
    pub unread: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, TS)]
pub struct MarkContact {
    pub is_read: bool,
}

/// POST /api/contacts
/// Public contact form
pub async fn submit_contact(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateContact>,
) -> Result<ResponseJson<ApiResponse<Contact>>, ApiError> {
    let contact = deployment.contacts().submit(payload).await?;
    Ok(ResponseJson(ApiResponse::success_with_message(
        contact,
        "Thank you, we will get back to you soon",
    )))
}

/// GET /api/contacts?unread=&page=&per_page=
pub async fn list_contacts(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ContactListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Contact>>>, ApiError> {
    let default = Page::default();
    let page = Page {
        page: query.page.unwrap_or(default.page),
        per_page: query.per_page.unwrap_or(default.per_page),
    };
    let contacts = deployment.contacts().list(query.unread, page).await?;
    Ok(ResponseJson(ApiResponse::success(contacts)))
}

/// GET /api/contacts/{id}
pub async fn get_contact(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Contact>>, ApiError> {
    let contact = deployment.contacts().get(id).await?;
    Ok(ResponseJson(ApiResponse::success(contact)))
}

/// PATCH /api/contacts/{id}
pub async fn mark_contact(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkContact>,
) -> Result<ResponseJson<ApiResponse<Contact>>, ApiError> {
    let contact = deployment.contacts().mark_read(id, payload.is_read).await?;
    Ok(ResponseJson(ApiResponse::success(contact)))
}

/// DELETE /api/contacts/{id}
pub async fn delete_contact(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.contacts().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/contacts",
        Router::new()
            .route("/", get(list_contacts).post(submit_contact))
            .route(
                "/{id}",
                get(get_contact).patch(mark_contact).delete(delete_contact),
            ),
    )
}
