//! Process configuration read from the environment (and `.env` through `dotenvy`).

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;
use utils::locale::Locale;

const DEV_SESSION_SECRET: &str = "dev-only-session-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("{0} must be set in release builds")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub default_locale: Locale,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub ai: AiConfig,
    pub mail: MailConfig,
    pub sentry_dsn: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub public_prefix: String,
    pub blob_token: Option<SecretString>,
    pub blob_api_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_secret: SecretString,
    pub session_ttl_hours: i64,
    pub password_iterations: u32,
    pub email_code_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub anthropic_api_key: Option<SecretString>,
    pub anthropic_model: Option<String>,
    pub openai_api_key: Option<SecretString>,
    pub image_model: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub resend_api_key: Option<SecretString>,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_secret = match var("SESSION_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                warn!("SESSION_SECRET not set, using development secret");
                DEV_SESSION_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("SESSION_SECRET")),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/quran-center.db".to_string()),
            default_locale: parse_or("DEFAULT_LOCALE", Locale::Ar)?,
            storage: StorageConfig {
                uploads_dir: var("UPLOADS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("public/uploads")),
                public_prefix: var("PUBLIC_UPLOADS_PREFIX").unwrap_or_else(|| "/uploads".to_string()),
                blob_token: var("BLOB_READ_WRITE_TOKEN").map(SecretString::from),
                blob_api_url: var("BLOB_API_URL")
                    .unwrap_or_else(|| "https://blob.vercel-storage.com".to_string()),
            },
            auth: AuthConfig {
                session_secret: SecretString::from(session_secret),
                session_ttl_hours: parse_or("SESSION_TTL_HOURS", 24 * 7)?,
                password_iterations: parse_or("PASSWORD_HASH_ITERATIONS", 100_000)?,
                email_code_ttl_minutes: parse_or("EMAIL_CODE_TTL_MINUTES", 10)?,
            },
            ai: AiConfig {
                anthropic_api_key: var("ANTHROPIC_API_KEY").map(SecretString::from),
                anthropic_model: var("ANTHROPIC_MODEL"),
                openai_api_key: var("OPENAI_API_KEY").map(SecretString::from),
                image_model: var("IMAGE_MODEL").unwrap_or_else(|| "gpt-image-1".to_string()),
            },
            mail: MailConfig {
                resend_api_key: var("RESEND_API_KEY").map(SecretString::from),
                from: var("MAIL_FROM")
                    .unwrap_or_else(|| "Quran Center <no-reply@localhost>".to_string()),
            },
            sentry_dsn: var("SENTRY_DSN"),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "HOST",
                reason: e.to_string(),
            })
    }

    /// Configuration for tests and local tooling: local storage under `root`,
    /// no external services.
    pub fn for_local(root: &std::path::Path, database_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: database_url.into(),
            default_locale: Locale::Ar,
            storage: StorageConfig {
                uploads_dir: root.join("uploads"),
                public_prefix: "/uploads".to_string(),
                blob_token: None,
                blob_api_url: "https://blob.vercel-storage.com".to_string(),
            },
            auth: AuthConfig {
                session_secret: SecretString::from(DEV_SESSION_SECRET.to_string()),
                session_ttl_hours: 24,
                password_iterations: 1_000,
                email_code_ttl_minutes: 10,
            },
            ai: AiConfig {
                anthropic_api_key: None,
                anthropic_model: None,
                openai_api_key: None,
                image_model: "gpt-image-1".to_string(),
            },
            mail: MailConfig {
                resend_api_key: None,
                from: "Quran Center <no-reply@localhost>".to_string(),
            },
            sentry_dsn: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_config_has_no_external_services() {
        let config = Config::for_local(std::path::Path::new("/tmp/qc"), "sqlite::memory:");
        assert!(config.storage.blob_token.is_none());
        assert!(config.ai.anthropic_api_key.is_none());
        assert_eq!(config.storage.uploads_dir, PathBuf::from("/tmp/qc/uploads"));
        assert_eq!(config.socket_addr().unwrap().ip().to_string(), "127.0.0.1");
    }
}
