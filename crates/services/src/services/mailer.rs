//! Outbound email for sign-in codes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::config::MailConfig;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail api returned http {status}: {body}")]
    Http { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub type SharedMailer = Arc<dyn Mailer>;

pub fn mailer_from_config(config: &MailConfig) -> Result<SharedMailer, MailError> {
    match &config.resend_api_key {
        Some(key) => Ok(Arc::new(ResendMailer::new(key.clone(), config.from.clone())?)),
        None => {
            warn!("RESEND_API_KEY not set, emails are written to the log");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Development mailer: writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(to, subject, body, "Email (not sent)");
        Ok(())
    }
}

pub struct ResendMailer {
    client: Client,
    api_key: SecretString,
    from: String,
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl ResendMailer {
    pub fn new(api_key: SecretString, from: String) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&SendEmail {
                from: &self.from,
                to: [to],
                subject,
                text: body,
            })
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Http {
                status: status.as_u16(),
                body,
            });
        }
        info!(to, subject, "Email sent");
        Ok(())
    }
}
