use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use serde_json::{Value, json};
use services::services::{
    assistant::AssistantError,
    auth::{AuthError, AuthErrorCode},
    chat::ChatError,
    contact::ContactError,
    content::{ContentError, ValidationErrors},
    users::UserError,
};
use thiserror::Error;
use utils::{locale::Locale, response::ApiResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{}", .code.message(*.locale))]
    AuthRejected { code: AuthErrorCode, locale: Locale },
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// Auth failures with the client-facing message in `locale`.
    pub fn auth(err: AuthError, locale: Locale) -> Self {
        match err {
            AuthError::Rejected(code) => ApiError::AuthRejected { code, locale },
            other => ApiError::Auth(other),
        }
    }
}

enum Body {
    Plain,
    Validation(ValidationErrors),
    Code(AuthErrorCode),
}

fn content_status(err: &ContentError) -> (StatusCode, Body) {
    match err {
        ContentError::Validation(errors) => (StatusCode::BAD_REQUEST, Body::Validation(errors.clone())),
        ContentError::Image(_) => (StatusCode::BAD_REQUEST, Body::Plain),
        ContentError::NotFound(_) | ContentError::TranslationNotFound { .. } => {
            (StatusCode::NOT_FOUND, Body::Plain)
        }
        ContentError::SlugTaken(_) => (StatusCode::CONFLICT, Body::Plain),
        ContentError::Database(_) | ContentError::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain)
        }
    }
}

fn auth_code_status(code: AuthErrorCode) -> StatusCode {
    match code {
        AuthErrorCode::InvalidCredentials | AuthErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthErrorCode::Forbidden => StatusCode::FORBIDDEN,
        AuthErrorCode::EmailTaken => StatusCode::CONFLICT,
        AuthErrorCode::CodeExpired
        | AuthErrorCode::CodeInvalid
        | AuthErrorCode::TooManyAttempts
        | AuthErrorCode::WeakPassword
        | AuthErrorCode::InvalidEmail => StatusCode::BAD_REQUEST,
    }
}

fn chat_status(err: &ChatError) -> (StatusCode, Body) {
    match err {
        ChatError::Validation(errors) => (StatusCode::BAD_REQUEST, Body::Validation(errors.clone())),
        ChatError::NotFound(_) => (StatusCode::NOT_FOUND, Body::Plain),
        ChatError::Forbidden => (StatusCode::FORBIDDEN, Body::Plain),
        ChatError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Content(err) => content_status(err),
            ApiError::Contact(err) => match err {
                ContactError::Validation(errors) => {
                    (StatusCode::BAD_REQUEST, Body::Validation(errors.clone()))
                }
                ContactError::NotFound => (StatusCode::NOT_FOUND, Body::Plain),
                ContactError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain),
            },
            ApiError::Auth(AuthError::Rejected(code)) | ApiError::AuthRejected { code, .. } => {
                (auth_code_status(*code), Body::Code(*code))
            }
            ApiError::Auth(AuthError::Token(_)) => (StatusCode::UNAUTHORIZED, Body::Plain),
            ApiError::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain),
            ApiError::User(err) => match err {
                UserError::NotFound => (StatusCode::NOT_FOUND, Body::Plain),
                UserError::SelfModification => (StatusCode::FORBIDDEN, Body::Plain),
                UserError::Content(err) => content_status(err),
            },
            ApiError::Chat(err) => chat_status(err),
            ApiError::Assistant(err) => match err {
                AssistantError::Forbidden => (StatusCode::FORBIDDEN, Body::Plain),
                AssistantError::Chat(err) => chat_status(err),
                AssistantError::Disabled | AssistantError::Model(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain)
                }
            },
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, Body::Plain),
            ApiError::Multipart(_) | ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Body::Plain),
        };

        let message = if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
            match &self {
                ApiError::Assistant(AssistantError::Disabled) => self.to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else if let ApiError::Auth(AuthError::Rejected(code)) = &self {
            code.message(Locale::default()).to_string()
        } else {
            self.to_string()
        };

        let response = match body {
            Body::Plain => ApiResponse::<(), Value>::error(&message),
            Body::Validation(errors) => ApiResponse::<(), Value>::error_with_data(json!(errors), &message),
            Body::Code(code) => ApiResponse::<(), Value>::error_with_data(json!({ "code": code }), &message),
        };
        (status, ResponseJson(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ValidationErrors::single("title", "is required").into(), StatusCode::BAD_REQUEST),
            (ContentError::NotFound("program").into(), StatusCode::NOT_FOUND),
            (
                ContentError::TranslationNotFound { entity: "program", locale: Locale::En }.into(),
                StatusCode::NOT_FOUND,
            ),
            (ContentError::SlugTaken("x".into()).into(), StatusCode::CONFLICT),
            (
                ApiError::auth(AuthErrorCode::InvalidCredentials.into(), Locale::En),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::auth(AuthErrorCode::Forbidden.into(), Locale::Ar),
                StatusCode::FORBIDDEN,
            ),
            (UserError::SelfModification.into(), StatusCode::FORBIDDEN),
            (ContentError::Database(sqlx::Error::RowNotFound).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn auth_rejections_are_localized() {
        let en = ApiError::auth(AuthErrorCode::EmailTaken.into(), Locale::En);
        assert_eq!(en.to_string(), "An account with this email already exists.");
        let ar = ApiError::auth(AuthErrorCode::EmailTaken.into(), Locale::Ar);
        assert_eq!(ar.to_string(), AuthErrorCode::EmailTaken.message(Locale::Ar));
    }
}
