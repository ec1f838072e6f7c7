use std::{path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    assistant::{Assistant, ChatAgent, tools::ToolBox},
    auth::AuthService,
    chat::ChatService,
    claude_api::{ClaudeApiClient, SharedModel},
    config::Config,
    contact::ContactService,
    content::{event::EventService, gallery::GalleryService, news::NewsService, program::ProgramService},
    image_generation::{OpenAiImageGenerator, SharedImageGenerator},
    mailer::mailer_from_config,
    storage::{SharedStorage, storage_from_config},
    users::UserService,
};
use tracing::info;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    storage: SharedStorage,
    auth: AuthService,
    users: UserService,
    programs: ProgramService,
    news: NewsService,
    events: EventService,
    gallery: GalleryService,
    contacts: ContactService,
    chats: ChatService,
    assistant: Assistant,
}

/// Creates the parent directory of a file-backed SQLite url.
async fn ensure_database_dir(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}

impl LocalDeployment {
    pub async fn from_config(config: Config) -> Result<Self, DeploymentError> {
        ensure_database_dir(&config.database_url).await?;
        let db = DBService::new(&config.database_url).await?;
        let pool = db.pool.clone();

        let storage = storage_from_config(&config.storage)?;
        let mailer = mailer_from_config(&config.mail)?;
        let model: Option<SharedModel> = match ClaudeApiClient::from_config(&config.ai)? {
            Some(client) => Some(Arc::new(client)),
            None => None,
        };
        let images: Option<SharedImageGenerator> = match OpenAiImageGenerator::from_config(&config.ai)? {
            Some(generator) => Some(Arc::new(generator)),
            None => None,
        };

        let programs = ProgramService::new(pool.clone(), storage.clone());
        let news = NewsService::new(pool.clone(), storage.clone());
        let chats = ChatService::new(pool.clone(), model.clone());
        let agent = model.clone().map(|model| {
            let tools = ToolBox::new(
                programs.clone(),
                news.clone(),
                chats.clone(),
                model.clone(),
                images.clone(),
            );
            ChatAgent::new(model, tools)
        });
        info!(
            storage = %storage.backend(),
            assistant = agent.is_some(),
            image_generation = images.is_some(),
            "Services configured"
        );

        Ok(Self {
            auth: AuthService::new(pool.clone(), mailer, &config.auth),
            users: UserService::new(pool.clone(), storage.clone()),
            events: EventService::new(pool.clone(), storage.clone()),
            gallery: GalleryService::new(pool.clone(), storage.clone()),
            contacts: ContactService::new(pool),
            assistant: Assistant::new(chats.clone(), agent),
            config: Arc::new(config),
            db,
            storage,
            programs,
            news,
            chats,
        })
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = Config::from_env()?;
        Self::from_config(config).await
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn users(&self) -> &UserService {
        &self.users
    }

    fn programs(&self) -> &ProgramService {
        &self.programs
    }

    fn news(&self) -> &NewsService {
        &self.news
    }

    fn events(&self) -> &EventService {
        &self.events
    }

    fn gallery(&self) -> &GalleryService {
        &self.gallery
    }

    fn contacts(&self) -> &ContactService {
        &self.contacts
    }

    fn chats(&self) -> &ChatService {
        &self.chats
    }

    fn assistant(&self) -> &Assistant {
        &self.assistant
    }
}
