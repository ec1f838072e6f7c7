use async_trait::async_trait;
use db::DBService;
use services::services::{
    assistant::Assistant,
    auth::AuthService,
    chat::ChatService,
    claude_api::ClaudeApiError,
    config::{Config, ConfigError},
    contact::ContactService,
    content::{event::EventService, gallery::GalleryService, news::NewsService, program::ProgramService},
    image_generation::ImageGenerationError,
    mailer::MailError,
    storage::{SharedStorage, StorageError},
    users::UserService,
};
use thiserror::Error;
use utils::locale::Locale;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Model(#[from] ClaudeApiError),
    #[error(transparent)]
    ImageGeneration(#[from] ImageGenerationError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything a request handler needs, built once at startup and cloned into
/// every request.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    /// Builds the deployment from the process environment.
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn storage(&self) -> &SharedStorage;

    fn auth(&self) -> &AuthService;

    fn users(&self) -> &UserService;

    fn programs(&self) -> &ProgramService;

    fn news(&self) -> &NewsService;

    fn events(&self) -> &EventService;

    fn gallery(&self) -> &GalleryService;

    fn contacts(&self) -> &ContactService;

    fn chats(&self) -> &ChatService;

    fn assistant(&self) -> &Assistant;

    fn default_locale(&self) -> Locale {
        self.config().default_locale
    }
}
