//! Profiles for signed-in users and account management for admins.

use db::models::user::{QuranLevel, User, UserChanges, UserProfile, UserRole};
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    content::{
        ContentError, Page, StagedImage, UpdateOutcome, ValidationErrors, apply_optional_text,
        apply_text, apply_value, discard, validate_image_change,
    },
    image::ImageChange,
    storage::SharedStorage,
};

const FOLDER: &str = "national-ids";
const MAX_NAME_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("admins cannot delete or demote their own account")]
    SelfModification,
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Content(ContentError::Database(e))
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, with = "serde_with::rust::double_option")]
    #[ts(optional, type = "QuranLevel | null")]
    pub quran_level: Option<Option<QuranLevel>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AdminUserPatch {
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub email_verified: Option<bool>,
    #[serde(default, with = "serde_with::rust::double_option")]
    #[ts(optional, type = "QuranLevel | null")]
    pub quran_level: Option<Option<QuranLevel>>,
}

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
    storage: SharedStorage,
}

fn validate(changes: &UserChanges) -> Result<(), ContentError> {
    let mut errors = ValidationErrors::default();
    errors.require_text("name", &changes.name, Some(MAX_NAME_CHARS));
    errors.limit_text("phone", changes.phone.as_deref(), 32);
    errors.into_result()
}

impl UserService {
    pub fn new(pool: SqlitePool, storage: SharedStorage) -> Self {
        Self { pool, storage }
    }

    async fn find(&self, id: Uuid) -> Result<User, UserError> {
        User::find_by_id(&self.pool, id)
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile, UserError> {
        Ok(self.find(user_id).await?.into())
    }

    /// Self-service profile edit, including the national ID scan.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        patch: ProfilePatch,
        national_id: ImageChange,
    ) -> Result<UpdateOutcome<UserProfile>, UserError> {
        let user = self.find(user_id).await?;
        let mut changes = UserChanges::from(&user);
        let mut changed = apply_text(&mut changes.name, patch.name);
        changed |= apply_optional_text(&mut changes.phone, patch.phone);
        changed |= apply_value(&mut changes.quran_level, patch.quran_level);
        validate(&changes)?;

        let validated = validate_image_change(&national_id)?;
        let national_id = match national_id {
            ImageChange::Remove if user.national_id_image_url.is_none() => ImageChange::Keep,
            other => other,
        };
        if !changed && national_id.is_keep() {
            debug!(user_id = %user_id, "Profile update has no changes");
            return Ok(UpdateOutcome::Unchanged(user.into()));
        }

        let staged = StagedImage::stage(
            self.storage.as_ref(),
            FOLDER,
            user.national_id_image_url.as_deref(),
            &national_id,
            validated,
        )
        .await?;
        changes.national_id_image_url = staged.url.clone();
        let result = User::update(&self.pool, user_id, &changes)
            .await
            .map_err(ContentError::from)
            .and_then(|user| user.ok_or(ContentError::NotFound("user")));
        let user = staged.settle(self.storage.as_ref(), result).await?;

        info!(user_id = %user_id, "Updated profile");
        Ok(UpdateOutcome::Updated(user.into()))
    }

    pub async fn list(&self, page: Page) -> Result<Vec<UserProfile>, UserError> {
        let users = User::list(&self.pool, page.limit(), page.offset()).await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<UserProfile, UserError> {
        self.me(id).await
    }

    pub async fn update(
        &self,
        actor: Uuid,
        id: Uuid,
        patch: AdminUserPatch,
    ) -> Result<UpdateOutcome<UserProfile>, UserError> {
        let user = self.find(id).await?;
        if actor == id && patch.role.is_some_and(|role| role != UserRole::Admin) {
            return Err(UserError::SelfModification);
        }

        let mut changes = UserChanges::from(&user);
        let mut changed = apply_text(&mut changes.name, patch.name);
        changed |= apply_value(&mut changes.role, patch.role);
        changed |= apply_value(&mut changes.email_verified, patch.email_verified);
        changed |= apply_value(&mut changes.quran_level, patch.quran_level);
        validate(&changes)?;
        if !changed {
            return Ok(UpdateOutcome::Unchanged(user.into()));
        }

        let user = User::update(&self.pool, id, &changes)
            .await?
            .ok_or(UserError::NotFound)?;
        info!(user_id = %id, actor = %actor, role = %user.role, "Admin updated user");
        Ok(UpdateOutcome::Updated(user.into()))
    }

    /// Deletes the account (chats cascade), then the national ID scan.
    pub async fn delete(&self, actor: Uuid, id: Uuid) -> Result<(), UserError> {
        if actor == id {
            return Err(UserError::SelfModification);
        }
        let user = self.find(id).await?;
        User::delete(&self.pool, id).await?;
        if let Some(url) = &user.national_id_image_url {
            discard(self.storage.as_ref(), url).await;
        }
        info!(user_id = %id, actor = %actor, "Deleted user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::models::user::CreateUser;

    use super::*;
    use crate::services::{
        content::test_support::{storage, test_pool},
        image::fixtures::png,
    };

    async fn seed(pool: &SqlitePool, email: &str, role: UserRole) -> User {
        let data = CreateUser {
            name: "Huda".into(),
            email: email.into(),
            password_hash: None,
            role,
            email_verified: true,
        };
        User::create(pool, Uuid::new_v4(), &data).await.unwrap()
    }

    #[tokio::test]
    async fn profile_update_stores_national_id() {
        let (pool, _dir) = test_pool().await;
        let files = storage();
        let service = UserService::new(pool.clone(), files.clone());
        let user = seed(&pool, "huda@example.org", UserRole::User).await;

        let updated = service
            .update_profile(
                user.id,
                ProfilePatch {
                    quran_level: Some(Some(QuranLevel::Intermediate)),
                    ..Default::default()
                },
                ImageChange::Replace(png(64)),
            )
            .await
            .unwrap()
            .into_inner();

        assert_eq!(updated.quran_level, Some(QuranLevel::Intermediate));
        let url = updated.national_id_image_url.unwrap();
        assert!(url.starts_with("/uploads/national-ids/"));

        let again = service
            .update_profile(
                user.id,
                ProfilePatch {
                    name: Some("Huda".into()),
                    ..Default::default()
                },
                ImageChange::Keep,
            )
            .await
            .unwrap();
        assert!(!again.is_updated());

        service.delete(Uuid::new_v4(), user.id).await.unwrap();
        assert_eq!(files.deleted(), vec![url]);
    }

    #[tokio::test]
    async fn admin_cannot_demote_or_delete_self() {
        let (pool, _dir) = test_pool().await;
        let service = UserService::new(pool.clone(), storage());
        let admin = seed(&pool, "admin@example.org", UserRole::Admin).await;

        let demote = AdminUserPatch {
            role: Some(UserRole::User),
            ..Default::default()
        };
        assert!(matches!(
            service.update(admin.id, admin.id, demote).await,
            Err(UserError::SelfModification)
        ));
        assert!(matches!(
            service.delete(admin.id, admin.id).await,
            Err(UserError::SelfModification)
        ));
    }

    #[tokio::test]
    async fn admin_promotes_user() {
        let (pool, _dir) = test_pool().await;
        let service = UserService::new(pool.clone(), storage());
        let admin = seed(&pool, "admin@example.org", UserRole::Admin).await;
        let user = seed(&pool, "instructor@example.org", UserRole::User).await;

        let outcome = service
            .update(
                admin.id,
                user.id,
                AdminUserPatch {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_updated());
        assert_eq!(outcome.into_inner().role, UserRole::Admin);
        assert_eq!(service.list(Page::default()).await.unwrap().len(), 2);
    }
}
