//! Account sign-in: passwords, emailed one-time codes and signed session tokens.

use chrono::{DateTime, Duration, Utc};
use db::models::{
    email_code::EmailCode,
    user::{CreateUser, User, UserProfile, UserRole},
};
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use utils::{
    jwt::{SessionClaims, SessionTokenError, decode_session, encode_session},
    locale::Locale,
    text::is_valid_email,
};
use uuid::Uuid;

use super::{config::AuthConfig, mailer::{MailError, SharedMailer}};

pub mod password;

use password::{MIN_PASSWORD_CHARS, PasswordError, check_credentials, hash_password};

pub const MAX_CODE_ATTEMPTS: i64 = 5;
pub const SESSION_COOKIE: &str = "session";

/// Stable, client-facing reasons an auth request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthErrorCode {
    InvalidCredentials,
    EmailTaken,
    CodeExpired,
    CodeInvalid,
    TooManyAttempts,
    WeakPassword,
    InvalidEmail,
    Unauthenticated,
    Forbidden,
}

impl AuthErrorCode {
    pub fn message(&self, locale: Locale) -> &'static str {
        use AuthErrorCode::*;
        match (self, locale) {
            (InvalidCredentials, Locale::En) => "Incorrect email or password.",
            (InvalidCredentials, Locale::Ar) => "البريد الإلكتروني أو كلمة المرور غير صحيحة.",
            (EmailTaken, Locale::En) => "An account with this email already exists.",
            (EmailTaken, Locale::Ar) => "يوجد حساب مسجل بهذا البريد الإلكتروني.",
            (CodeExpired, Locale::En) => "The code has expired. Request a new one.",
            (CodeExpired, Locale::Ar) => "انتهت صلاحية الرمز. اطلب رمزاً جديداً.",
            (CodeInvalid, Locale::En) => "The code is incorrect.",
            (CodeInvalid, Locale::Ar) => "الرمز غير صحيح.",
            (TooManyAttempts, Locale::En) => "Too many attempts. Request a new code.",
            (TooManyAttempts, Locale::Ar) => "محاولات كثيرة. اطلب رمزاً جديداً.",
            (WeakPassword, Locale::En) => "Password must be at least 8 characters.",
            (WeakPassword, Locale::Ar) => "يجب أن تتكون كلمة المرور من 8 أحرف على الأقل.",
            (InvalidEmail, Locale::En) => "Enter a valid email address.",
            (InvalidEmail, Locale::Ar) => "أدخل بريداً إلكترونياً صحيحاً.",
            (Unauthenticated, Locale::En) => "Please sign in to continue.",
            (Unauthenticated, Locale::Ar) => "يرجى تسجيل الدخول للمتابعة.",
            (Forbidden, Locale::En) => "You do not have permission to do this.",
            (Forbidden, Locale::Ar) => "ليس لديك صلاحية للقيام بذلك.",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
    #[error(transparent)]
    Token(#[from] SessionTokenError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("{0}")]
    Rejected(AuthErrorCode),
}

impl From<AuthErrorCode> for AuthError {
    fn from(code: AuthErrorCode) -> Self {
        AuthError::Rejected(code)
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct EmailCodeRequest {
    pub email: String,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct VerifyEmailCodeRequest {
    pub email: String,
    pub code: String,
}

/// A signed-in user and the token proving it.
#[derive(Debug, Clone, Serialize, TS)]
pub struct Session {
    /// Also set as the `session` cookie; returned for clients using bearer auth.
    pub token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

/// Identity carried by a verified session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    mailer: SharedMailer,
    secret: SecretString,
    session_ttl: Duration,
    code_ttl: Duration,
    password_iterations: u32,
}

fn normalize_email(email: &str) -> Result<String, AuthErrorCode> {
    let email = email.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(AuthErrorCode::InvalidEmail)
    }
}

impl AuthService {
    pub fn new(pool: SqlitePool, mailer: SharedMailer, config: &AuthConfig) -> Self {
        Self {
            pool,
            mailer,
            secret: config.session_secret.clone(),
            session_ttl: Duration::hours(config.session_ttl_hours),
            code_ttl: Duration::minutes(config.email_code_ttl_minutes),
            password_iterations: config.password_iterations,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&request.email)?;
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthErrorCode::WeakPassword.into());
        }
        if User::find_by_email(&self.pool, &email).await?.is_some() {
            return Err(AuthErrorCode::EmailTaken.into());
        }

        let name = match request.name.trim() {
            "" => default_name(&email),
            name => name.to_string(),
        };
        let data = CreateUser {
            name,
            email,
            password_hash: Some(hash_password(&request.password, self.password_iterations)?),
            role: UserRole::User,
            email_verified: false,
        };
        let user = User::create(&self.pool, Uuid::new_v4(), &data)
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    AuthError::Rejected(AuthErrorCode::EmailTaken)
                } else {
                    AuthError::Database(e)
                }
            })?;

        info!(user_id = %user.id, "Registered user");
        self.session_for(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login_with_password(&self, request: LoginRequest) -> Result<Session, AuthError> {
        let email = request.email.trim().to_lowercase();
        let user = User::find_by_email(&self.pool, &email).await?;
        let hash = user.as_ref().and_then(|u| u.password_hash.as_deref());
        let matched = check_credentials(&request.password, hash, self.password_iterations)?;
        let Some(user) = user.filter(|_| matched) else {
            warn!("Failed password sign-in");
            return Err(AuthErrorCode::InvalidCredentials.into());
        };
        info!(user_id = %user.id, "Signed in with password");
        self.session_for(user)
    }

    /// Emails a fresh six-digit code, replacing any earlier one for the address.
    pub async fn request_email_code(&self, request: EmailCodeRequest) -> Result<(), AuthError> {
        let email = normalize_email(&request.email)?;
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let expires_at = Utc::now() + self.code_ttl;
        EmailCode::replace(&self.pool, &email, &self.code_digest(&email, &code)?, expires_at).await?;

        let minutes = self.code_ttl.num_minutes();
        let (subject, body) = match request.locale {
            Locale::Ar => (
                "رمز تسجيل الدخول".to_string(),
                format!("رمز الدخول الخاص بك هو {code}. صالح لمدة {minutes} دقائق."),
            ),
            Locale::En => (
                "Your sign-in code".to_string(),
                format!("Your sign-in code is {code}. It is valid for {minutes} minutes."),
            ),
        };
        self.mailer.send(&email, &subject, &body).await?;
        info!(email, "Sent sign-in code");
        Ok(())
    }

    /// Consumes a valid code and signs the user in, creating the account on first use.
    pub async fn verify_email_code(&self, request: VerifyEmailCodeRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&request.email)?;
        let Some(record) = EmailCode::find(&self.pool, &email).await? else {
            return Err(AuthErrorCode::CodeInvalid.into());
        };

        if record.is_expired(Utc::now()) {
            EmailCode::delete(&self.pool, &email).await?;
            return Err(AuthErrorCode::CodeExpired.into());
        }
        if record.attempts >= MAX_CODE_ATTEMPTS {
            EmailCode::delete(&self.pool, &email).await?;
            return Err(AuthErrorCode::TooManyAttempts.into());
        }

        let digest = self.code_digest(&email, request.code.trim())?;
        if !bool::from(digest.as_bytes().ct_eq(record.code_hash.as_bytes())) {
            EmailCode::record_attempt(&self.pool, &email).await?;
            warn!(email, attempts = record.attempts + 1, "Wrong sign-in code");
            return Err(AuthErrorCode::CodeInvalid.into());
        }
        EmailCode::delete(&self.pool, &email).await?;

        let user = match User::find_by_email(&self.pool, &email).await? {
            Some(user) if user.email_verified => user,
            Some(user) => {
                User::mark_email_verified(&self.pool, user.id).await?;
                User {
                    email_verified: true,
                    ..user
                }
            }
            None => {
                let data = CreateUser {
                    name: default_name(&email),
                    email: email.clone(),
                    password_hash: None,
                    role: UserRole::User,
                    email_verified: true,
                };
                let user = User::create(&self.pool, Uuid::new_v4(), &data).await?;
                info!(user_id = %user.id, "Created user from email code");
                user
            }
        };
        self.session_for(user)
    }

    pub fn session_for(&self, user: User) -> Result<Session, AuthError> {
        let claims = SessionClaims::new(user.id, user.role.to_string(), self.session_ttl);
        let token = encode_session(&claims, self.secret.expose_secret().as_bytes())?;
        Ok(Session {
            token,
            expires_at: claims.expires_at(),
            user: user.into(),
        })
    }

    /// Verifies a session token and checks the account still exists. The role is
    /// read from the database so demotions apply to live sessions.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = decode_session(token, self.secret.expose_secret().as_bytes())
            .map_err(|_| AuthErrorCode::Unauthenticated)?;
        let user = User::find_by_id(&self.pool, claims.sub)
            .await?
            .ok_or(AuthErrorCode::Unauthenticated)?;
        Ok(AuthenticatedUser {
            id: user.id,
            role: user.role,
        })
    }

    pub async fn current_user(&self, user: AuthenticatedUser) -> Result<UserProfile, AuthError> {
        User::find_by_id(&self.pool, user.id)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthErrorCode::Unauthenticated.into())
    }

    fn code_digest(&self, email: &str, code: &str) -> Result<String, AuthError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| PasswordError::Key)?;
        mac.update(email.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn default_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::{
        config::Config, content::test_support::test_pool, mailer::test_support::RecordingMailer,
    };

    async fn service() -> (AuthService, Arc<RecordingMailer>, SqlitePool, tempfile::TempDir) {
        let (pool, dir) = test_pool().await;
        let config = Config::for_local(dir.path(), "unused");
        let mailer = Arc::new(RecordingMailer::default());
        let service = AuthService::new(pool.clone(), mailer.clone(), &config.auth);
        (service, mailer, pool, dir)
    }

    fn sent_code(mailer: &RecordingMailer) -> String {
        let body = mailer.last().unwrap().body;
        body.chars()
            .collect::<Vec<_>>()
            .windows(6)
            .map(|w| w.iter().collect::<String>())
            .find(|w| w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
    }

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Abdullah".into(),
            email: email.into(),
            password: "correct horse".into(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let (service, _mailer, _pool, _dir) = service().await;
        let session = service.register(register("Abdullah@Example.org")).await.unwrap();
        assert_eq!(session.user.email, "abdullah@example.org");

        let again = service.register(register("abdullah@example.org")).await.unwrap_err();
        assert!(matches!(again, AuthError::Rejected(AuthErrorCode::EmailTaken)));

        let login = service
            .login_with_password(LoginRequest {
                email: "abdullah@example.org".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        let user = service.authenticate(&login.token).await.unwrap();
        assert_eq!(user.id, session.user.id);
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (service, _mailer, _pool, _dir) = service().await;
        service.register(register("a@example.org")).await.unwrap();

        for (email, password) in [("a@example.org", "wrong pass"), ("b@example.org", "correct horse")] {
            let err = service
                .login_with_password(LoginRequest {
                    email: email.into(),
                    password: password.into(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Rejected(AuthErrorCode::InvalidCredentials)));
        }
    }

    #[tokio::test]
    async fn email_code_signs_in_and_is_single_use() {
        let (service, mailer, _pool, _dir) = service().await;
        service
            .request_email_code(EmailCodeRequest {
                email: "student@example.org".into(),
                locale: Locale::En,
            })
            .await
            .unwrap();
        let code = sent_code(&mailer);

        let verify = VerifyEmailCodeRequest {
            email: "student@example.org".into(),
            code,
        };
        let session = service.verify_email_code(verify.clone()).await.unwrap();
        assert!(session.user.email_verified);
        assert_eq!(session.user.role, UserRole::User);

        let reused = service.verify_email_code(verify).await.unwrap_err();
        assert!(matches!(reused, AuthError::Rejected(AuthErrorCode::CodeInvalid)));
    }

    #[tokio::test]
    async fn email_code_attempts_are_limited() {
        let (service, mailer, _pool, _dir) = service().await;
        let request = EmailCodeRequest {
            email: "x@example.org".into(),
            locale: Locale::Ar,
        };
        service.request_email_code(request).await.unwrap();
        let code = sent_code(&mailer);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_CODE_ATTEMPTS {
            let err = service
                .verify_email_code(VerifyEmailCodeRequest {
                    email: "x@example.org".into(),
                    code: wrong.into(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Rejected(AuthErrorCode::CodeInvalid)));
        }
        let err = service
            .verify_email_code(VerifyEmailCodeRequest {
                email: "x@example.org".into(),
                code,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(AuthErrorCode::TooManyAttempts)));
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let (service, _mailer, pool, _dir) = service().await;
        let digest = service.code_digest("late@example.org", "123456").unwrap();
        EmailCode::replace(&pool, "late@example.org", &digest, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let err = service
            .verify_email_code(VerifyEmailCodeRequest {
                email: "late@example.org".into(),
                code: "123456".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(AuthErrorCode::CodeExpired)));
    }

    #[test]
    fn error_codes_have_both_locales() {
        let code: AuthErrorCode = "too_many_attempts".parse().unwrap();
        assert_eq!(code, AuthErrorCode::TooManyAttempts);
        assert_ne!(code.message(Locale::Ar), code.message(Locale::En));
        assert_eq!(AuthErrorCode::EmailTaken.to_string(), "email_taken");
    }
}
