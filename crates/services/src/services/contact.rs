use db::models::contact::{Contact, CreateContact};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use utils::text::{is_valid_email, non_blank};
use uuid::Uuid;

use super::content::{Page, ValidationErrors};

pub const MAX_MESSAGE_CHARS: usize = 5000;
const MAX_NAME_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("contact message not found")]
    NotFound,
}

#[derive(Clone)]
pub struct ContactService {
    pool: SqlitePool,
}

impl ContactService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a message from the public contact form.
    pub async fn submit(&self, data: CreateContact) -> Result<Contact, ContactError> {
        let data = CreateContact {
            name: data.name.trim().to_string(),
            email: data.email.trim().to_lowercase(),
            phone: non_blank(data.phone),
            subject: non_blank(data.subject),
            message: data.message.trim().to_string(),
        };

        let mut errors = ValidationErrors::default();
        errors.require_text("name", &data.name, Some(MAX_NAME_CHARS));
        if !is_valid_email(&data.email) {
            errors.add("email", "must be a valid email address");
        }
        errors.require_text("message", &data.message, Some(MAX_MESSAGE_CHARS));
        errors.limit_text("subject", data.subject.as_deref(), 200);
        if !errors.is_empty() {
            return Err(ContactError::Validation(errors));
        }

        let contact = Contact::create(&self.pool, Uuid::new_v4(), &data).await?;
        info!(contact_id = %contact.id, "Contact message received");
        Ok(contact)
    }

    pub async fn list(&self, unread_only: bool, page: Page) -> Result<Vec<Contact>, ContactError> {
        Ok(Contact::list(&self.pool, unread_only, page.limit(), page.offset()).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Contact, ContactError> {
        Contact::find_by_id(&self.pool, id)
            .await?
            .ok_or(ContactError::NotFound)
    }

    pub async fn mark_read(&self, id: Uuid, is_read: bool) -> Result<Contact, ContactError> {
        Contact::set_read(&self.pool, id, is_read)
            .await?
            .ok_or(ContactError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ContactError> {
        match Contact::delete(&self.pool, id).await? {
            0 => Err(ContactError::NotFound),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content::test_support::test_pool;

    fn form(message: &str) -> CreateContact {
        CreateContact {
            name: "Maryam".into(),
            email: " Maryam@Example.org ".into(),
            phone: Some("".into()),
            subject: None,
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn submit_normalizes_and_stores() {
        let (pool, _dir) = test_pool().await;
        let service = ContactService::new(pool);

        let contact = service.submit(form("Is there a class for sisters?")).await.unwrap();
        assert_eq!(contact.email, "maryam@example.org");
        assert_eq!(contact.phone, None);
        assert!(!contact.is_read);

        let read = service.mark_read(contact.id, true).await.unwrap();
        assert!(read.is_read);
        service.delete(contact.id).await.unwrap();
        assert!(matches!(service.get(contact.id).await, Err(ContactError::NotFound)));
    }

    #[tokio::test]
    async fn overlong_message_is_rejected() {
        let (pool, _dir) = test_pool().await;
        let service = ContactService::new(pool);

        let err = service
            .submit(form(&"a".repeat(MAX_MESSAGE_CHARS + 1)))
            .await
            .unwrap_err();
        let ContactError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.0.contains_key("message"));
    }
}
