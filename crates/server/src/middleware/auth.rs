use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    extract::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use deployment::Deployment;
use services::services::auth::{AuthErrorCode, AuthenticatedUser, SESSION_COOKIE};

use crate::{DeploymentImpl, error::ApiError};

/// Session token from `Authorization: Bearer`, falling back to the session cookie.
fn session_token(parts: &Parts) -> Option<String> {
    if let Some(Authorization(bearer)) = parts.headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

async fn authenticate(
    parts: &Parts,
    deployment: &DeploymentImpl,
) -> Result<Option<AuthenticatedUser>, ApiError> {
    let Some(token) = session_token(parts) else {
        return Ok(None);
    };
    deployment
        .auth()
        .authenticate(&token)
        .await
        .map(Some)
        .map_err(|e| ApiError::auth(e, deployment.default_locale()))
}

/// Any signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub AuthenticatedUser);

impl FromRequestParts<DeploymentImpl> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(parts, deployment).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ApiError::auth(
                AuthErrorCode::Unauthenticated.into(),
                deployment.default_locale(),
            )),
        }
    }
}

/// A signed-in user with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequestParts<DeploymentImpl> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, deployment).await?;
        if !user.is_admin() {
            tracing::debug!(user_id = %user.id, path = %parts.uri.path(), "Non-admin request rejected");
            return Err(ApiError::auth(
                AuthErrorCode::Forbidden.into(),
                deployment.default_locale(),
            ));
        }
        Ok(AdminUser(user))
    }
}

/// The signed-in user if there is one. An invalid or stale token reads as
/// anonymous.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequestParts<DeploymentImpl> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(parts, deployment).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(ApiError::AuthRejected { .. }) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}
