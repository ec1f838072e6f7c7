use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{
        Json as ResponseJson,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use db::models::{
    chat::{Chat, ChatVisibility},
    document::{Document, Suggestion},
    vote::Vote,
};
use deployment::Deployment;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use services::services::{
    assistant::{
        ChatRequest,
        events::{ChatEvent, EventSink},
    },
    chat::{ChatWithMessages, SaveDocument},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::{AdminUser, MaybeUser},
};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
}

#[derive(Debug, Deserialize, TS)]
pub struct VoteRequest {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    #[serde(rename = "type")]
    pub kind: VoteKind,
}

#[derive(Debug, Deserialize)]
pub struct VotesQuery {
    pub chat_id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
pub struct VisibilityRequest {
    pub visibility: ChatVisibility,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAfterQuery {
    pub after: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub document_id: Uuid,
}

/// POST /api/chat
/// Stores the message and streams the assistant's turn as server-sent events.
pub async fn send_message(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let assistant = deployment.assistant().clone();
    let turn = assistant
        .prepare(user, request, deployment.default_locale())
        .await?;
    tracing::debug!(chat_id = %turn.chat.id, user_id = %user.id, "Starting assistant turn");

    let (sender, receiver) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);
    tokio::spawn(async move {
        assistant.respond(turn, EventSink::new(sender)).await;
    });

    let stream = ReceiverStream::new(receiver).map(|event| Event::default().json_data(event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// GET /api/chat/history
pub async fn chat_history(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
) -> Result<ResponseJson<ApiResponse<Vec<Chat>>>, ApiError> {
    let chats = deployment.chats().history(user.id).await?;
    Ok(ResponseJson(ApiResponse::success(chats)))
}

/// GET /api/chat/{id}
/// Public chats are readable by anyone; private ones only by their owner.
pub async fn get_chat(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ChatWithMessages>>, ApiError> {
    let chat = deployment
        .chats()
        .get(id, viewer.map(|user| user.id))
        .await?;
    Ok(ResponseJson(ApiResponse::success(chat)))
}

/// DELETE /api/chat/{id}
pub async fn delete_chat(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.chats().delete(id, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// PATCH /api/chat/{id}/visibility
pub async fn set_visibility(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VisibilityRequest>,
) -> Result<ResponseJson<ApiResponse<Chat>>, ApiError> {
    let chat = deployment
        .chats()
        .set_visibility(id, user.id, payload.visibility)
        .await?;
    Ok(ResponseJson(ApiResponse::success(chat)))
}

/// GET /api/vote?chat_id=
pub async fn get_votes(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Query(query): Query<VotesQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Vote>>>, ApiError> {
    let votes = deployment.chats().votes(query.chat_id, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(votes)))
}

/// PATCH /api/vote
pub async fn vote(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Json(payload): Json<VoteRequest>,
) -> Result<ResponseJson<ApiResponse<Vote>>, ApiError> {
    let vote = deployment
        .chats()
        .vote(
            payload.chat_id,
            user.id,
            payload.message_id,
            payload.kind == VoteKind::Up,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(vote)))
}

/// GET /api/documents/{id}
/// All saved versions, oldest first
pub async fn document_versions(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Document>>>, ApiError> {
    let versions = deployment.chats().document_versions(id, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(versions)))
}

/// POST /api/documents/{id}
pub async fn save_document(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveDocument>,
) -> Result<ResponseJson<ApiResponse<Document>>, ApiError> {
    let document = deployment.chats().save_document(id, user.id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(document)))
}

/// DELETE /api/documents/{id}?after=<timestamp>
/// Drops versions newer than `after`, returning how many were removed.
pub async fn delete_documents_after(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteAfterQuery>,
) -> Result<ResponseJson<ApiResponse<u64>>, ApiError> {
    let removed = deployment
        .chats()
        .delete_documents_after(id, user.id, query.after)
        .await?;
    Ok(ResponseJson(ApiResponse::success(removed)))
}

/// GET /api/suggestions?document_id=
pub async fn suggestions(
    State(deployment): State<DeploymentImpl>,
    AdminUser(user): AdminUser,
    Query(query): Query<SuggestionsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Suggestion>>>, ApiError> {
    let suggestions = deployment
        .chats()
        .suggestions(query.document_id, user.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(suggestions)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .nest(
            "/chat",
            Router::new()
                .route("/", post(send_message))
                .route("/history", get(chat_history))
                .route("/{id}", get(get_chat).delete(delete_chat))
                .route("/{id}/visibility", patch(set_visibility)),
        )
        .route("/vote", get(get_votes).patch(vote))
        .route(
            "/documents/{id}",
            get(document_versions)
                .post(save_document)
                .delete(delete_documents_after),
        )
        .route("/suggestions", get(suggestions))
}
