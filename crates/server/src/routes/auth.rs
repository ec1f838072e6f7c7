use axum::{
    Json, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use db::models::user::UserProfile;
use deployment::Deployment;
use services::services::auth::{
    EmailCodeRequest, LoginRequest, RegisterRequest, SESSION_COOKIE, Session,
    VerifyEmailCodeRequest,
};
use utils::response::ApiResponse;

use super::LocaleQuery;
use crate::{DeploymentImpl, error::ApiError, middleware::CurrentUser};

fn session_cookie(deployment: &DeploymentImpl, session: &Session) -> Cookie<'static> {
    let ttl = deployment.auth().session_ttl();
    Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

fn signed_in(
    deployment: &DeploymentImpl,
    jar: CookieJar,
    session: Session,
) -> (CookieJar, ResponseJson<ApiResponse<Session>>) {
    let jar = jar.add(session_cookie(deployment, &session));
    (jar, ResponseJson(ApiResponse::success(session)))
}

/// POST /api/auth/register
pub async fn register(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<LocaleQuery>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<Session>>), ApiError> {
    let locale = query.resolve(&deployment)?;
    let session = deployment
        .auth()
        .register(payload)
        .await
        .map_err(|e| ApiError::auth(e, locale))?;
    tracing::info!(user_id = %session.user.id, "User registered");
    Ok(signed_in(&deployment, jar, session))
}

/// POST /api/auth/login
/// Sets the session cookie and returns the token
pub async fn login(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<LocaleQuery>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<Session>>), ApiError> {
    let locale = query.resolve(&deployment)?;
    let session = deployment
        .auth()
        .login_with_password(payload)
        .await
        .map_err(|e| ApiError::auth(e, locale))?;
    Ok(signed_in(&deployment, jar, session))
}

/// POST /api/auth/email-code
pub async fn request_email_code(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<EmailCodeRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let locale = payload.locale;
    deployment
        .auth()
        .request_email_code(payload)
        .await
        .map_err(|e| ApiError::auth(e, locale))?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/auth/email-code/verify
pub async fn verify_email_code(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<LocaleQuery>,
    jar: CookieJar,
    Json(payload): Json<VerifyEmailCodeRequest>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<Session>>), ApiError> {
    let locale = query.resolve(&deployment)?;
    let session = deployment
        .auth()
        .verify_email_code(payload)
        .await
        .map_err(|e| ApiError::auth(e, locale))?;
    Ok(signed_in(&deployment, jar, session))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, ResponseJson<ApiResponse<()>>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, ResponseJson(ApiResponse::success(())))
}

/// GET /api/auth/session
pub async fn session(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let profile = deployment
        .auth()
        .current_user(user)
        .await
        .map_err(|e| ApiError::auth(e, deployment.default_locale()))?;
    Ok(ResponseJson(ApiResponse::success(profile)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/register", post(register))
            .route("/login", post(login))
            .route("/email-code", post(request_email_code))
            .route("/email-code/verify", post(verify_email_code))
            .route("/logout", post(logout))
            .route("/session", get(session)),
    )
}
