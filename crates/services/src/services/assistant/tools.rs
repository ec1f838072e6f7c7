//! Tools the assistant may call. Content tools go through the same services as
//! the REST handlers, so validation and storage rules are shared.

use std::str::FromStr;

use db::models::document::{CreateSuggestion, DocumentKind};
use schemars::{JsonSchema, generate::SchemaSettings};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ChatContext,
    events::{EventSink, ToolStatus},
};
use crate::services::{
    chat::{ChatError, ChatService, SaveDocument},
    claude_api::{ClaudeApiError, SharedModel, ToolDefinition, ask_json},
    content::{
        ContentError, UpdateOutcome, ValidationErrors,
        news::{CreateNews, NewsDto, NewsService, UpdateNews},
        program::{CreateProgram, ProgramDto, ProgramService, UpdateProgram},
    },
    image::ImageChange,
    image_generation::{ImageGenerationError, SharedImageGenerator},
};

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "camelCase")]
pub enum ToolName {
    CreateNews,
    UpdateNews,
    CreateProgram,
    UpdateProgram,
    CreateDocument,
    UpdateDocument,
    RequestSuggestions,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
    #[error("only administrators can change site content")]
    Forbidden,
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    ImageGeneration(#[from] ImageGenerationError),
    #[error(transparent)]
    Model(#[from] ClaudeApiError),
}

impl ToolError {
    /// Result payload handed back to the model.
    fn to_result(&self) -> Value {
        let errors = match self {
            ToolError::Content(ContentError::Validation(errors))
            | ToolError::Chat(ChatError::Validation(errors)) => Some(errors),
            _ => None,
        };
        let mut result = json!({ "status": "error", "message": self.to_string() });
        if let Some(errors) = errors {
            result["errors"] = json!(errors);
        }
        result
    }
}

/// Optional generated cover image, shared by the content tools.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ImageRequest {
    /// Generate a new cover image for the entry.
    #[serde(default)]
    pub generate_image: bool,
    /// What the image should show. Defaults to a prompt built from the title.
    pub image_prompt: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateNewsArgs {
    #[serde(flatten)]
    pub news: CreateNews,
    #[serde(flatten)]
    pub image: ImageRequest,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateNewsArgs {
    /// Id of the news article to change.
    pub id: Uuid,
    #[serde(flatten)]
    pub patch: UpdateNews,
    #[serde(flatten)]
    pub image: ImageRequest,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateProgramArgs {
    #[serde(flatten)]
    pub program: CreateProgram,
    #[serde(flatten)]
    pub image: ImageRequest,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateProgramArgs {
    /// Id of the program to change.
    pub id: Uuid,
    #[serde(flatten)]
    pub patch: UpdateProgram,
    #[serde(flatten)]
    pub image: ImageRequest,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDocumentArgs {
    pub title: String,
    /// One of `text`, `code` or `sheet`. Defaults to `text`.
    pub kind: Option<String>,
    /// Full content of the document.
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateDocumentArgs {
    /// Id of the document to revise.
    pub id: Uuid,
    /// The changes to make.
    pub description: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RequestSuggestionsArgs {
    /// Id of the document to review.
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SuggestionDraft {
    original_sentence: String,
    suggested_sentence: String,
    description: Option<String>,
}

/// JSON schema of `T` with every definition inlined, as the tool API expects.
fn input_schema<T: JsonSchema>() -> Value {
    let mut settings = SchemaSettings::draft2020_12();
    settings.inline_subschemas = true;
    let mut schema = settings.into_generator().into_root_schema_for::<T>().to_value();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

fn definition<T: JsonSchema>(name: ToolName, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: input_schema::<T>(),
    }
}

fn parse<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    Ok(serde_json::from_value(input)?)
}

fn created(entity: &str, id: Uuid, slug: &str, image_url: Option<&str>) -> Value {
    json!({
        "status": "created",
        "message": format!("The {entity} was created"),
        "id": id,
        "slug": slug,
        "image_url": image_url,
    })
}

fn updated<T>(
    outcome: UpdateOutcome<T>,
    entity: &str,
    summary: impl FnOnce(&T) -> (Uuid, &str, Option<&str>),
) -> Value {
    match outcome {
        UpdateOutcome::Unchanged(_) => json!({ "status": "unchanged", "message": "Nothing to update" }),
        UpdateOutcome::Updated(dto) => {
            let (id, slug, image_url) = summary(&dto);
            json!({
                "status": "updated",
                "message": format!("The {entity} was updated"),
                "id": id,
                "slug": slug,
                "image_url": image_url,
            })
        }
    }
}

fn news_summary(dto: &NewsDto) -> (Uuid, &str, Option<&str>) {
    (dto.news.id, &dto.news.slug, dto.news.image_url.as_deref())
}

fn program_summary(dto: &ProgramDto) -> (Uuid, &str, Option<&str>) {
    (dto.program.id, &dto.program.slug, dto.program.image_url.as_deref())
}

pub struct ToolBox {
    programs: ProgramService,
    news: NewsService,
    chats: ChatService,
    model: SharedModel,
    images: Option<SharedImageGenerator>,
    definitions: Vec<ToolDefinition>,
}

impl ToolBox {
    pub fn new(
        programs: ProgramService,
        news: NewsService,
        chats: ChatService,
        model: SharedModel,
        images: Option<SharedImageGenerator>,
    ) -> Self {
        let definitions = vec![
            definition::<CreateNewsArgs>(
                ToolName::CreateNews,
                "Create a news article in one locale. Set generate_image to add a cover image.",
            ),
            definition::<UpdateNewsArgs>(
                ToolName::UpdateNews,
                "Update a news article. Only pass the fields that should change; `locale` selects \
                 the translation, which is created if missing.",
            ),
            definition::<CreateProgramArgs>(
                ToolName::CreateProgram,
                "Create a study program in one locale. Set generate_image to add a cover image.",
            ),
            definition::<UpdateProgramArgs>(
                ToolName::UpdateProgram,
                "Update a study program. Only pass the fields that should change; `locale` \
                 selects the translation, which is created if missing.",
            ),
            definition::<CreateDocumentArgs>(
                ToolName::CreateDocument,
                "Create a document for drafting longer text such as announcements or lesson notes.",
            ),
            definition::<UpdateDocumentArgs>(
                ToolName::UpdateDocument,
                "Revise an existing document according to a description of the changes.",
            ),
            definition::<RequestSuggestionsArgs>(
                ToolName::RequestSuggestions,
                "Review a document and store writing suggestions for it.",
            ),
        ];
        Self {
            programs,
            news,
            chats,
            model,
            images,
            definitions,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    /// Runs one tool call. Failures are reported to the model as an error result
    /// rather than ending the turn.
    pub async fn execute(
        &self,
        ctx: &ChatContext,
        call_id: &str,
        name: &str,
        input: Value,
        events: &EventSink,
    ) -> (Value, bool) {
        match self.dispatch(ctx, call_id, name, input, events).await {
            Ok(result) => (result, false),
            Err(e) => {
                warn!(chat_id = %ctx.chat_id, tool = name, error = %e, "Tool call failed");
                (e.to_result(), true)
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &ChatContext,
        call_id: &str,
        name: &str,
        input: Value,
        events: &EventSink,
    ) -> Result<Value, ToolError> {
        let tool = ToolName::from_str(name).map_err(|_| ToolError::UnknownTool(name.to_string()))?;
        if !ctx.user.is_admin() {
            return Err(ToolError::Forbidden);
        }
        debug!(chat_id = %ctx.chat_id, tool = %tool, "Running tool");

        match tool {
            ToolName::CreateNews => {
                let args: CreateNewsArgs = parse(input)?;
                let image = self
                    .image_change(call_id, &args.image, Some(&args.news.title), events)
                    .await?;
                self.saving(call_id, &image, events).await;
                let dto = self.news.create(args.news, image.into_upload()).await?;
                info!(news_id = %dto.news.id, "Assistant created news article");
                Ok(created("news article", dto.news.id, &dto.news.slug, dto.news.image_url.as_deref()))
            }
            ToolName::UpdateNews => {
                let args: UpdateNewsArgs = parse(input)?;
                let image = self
                    .image_change(call_id, &args.image, args.patch.title.as_deref(), events)
                    .await?;
                self.saving(call_id, &image, events).await;
                let outcome = self.news.update(args.id, args.patch, image).await?;
                Ok(updated(outcome, "news article", news_summary))
            }
            ToolName::CreateProgram => {
                let args: CreateProgramArgs = parse(input)?;
                let image = self
                    .image_change(call_id, &args.image, Some(&args.program.title), events)
                    .await?;
                self.saving(call_id, &image, events).await;
                let dto = self.programs.create(args.program, image.into_upload()).await?;
                info!(program_id = %dto.program.id, "Assistant created program");
                Ok(created(
                    "program",
                    dto.program.id,
                    &dto.program.slug,
                    dto.program.image_url.as_deref(),
                ))
            }
            ToolName::UpdateProgram => {
                let args: UpdateProgramArgs = parse(input)?;
                let image = self
                    .image_change(call_id, &args.image, args.patch.title.as_deref(), events)
                    .await?;
                self.saving(call_id, &image, events).await;
                let outcome = self.programs.update(args.id, args.patch, image).await?;
                Ok(updated(outcome, "program", program_summary))
            }
            ToolName::CreateDocument => {
                let args: CreateDocumentArgs = parse(input)?;
                let kind = args
                    .kind
                    .as_deref()
                    .map(DocumentKind::from_str)
                    .transpose()
                    .map_err(|_| ValidationErrors::single("kind", "must be text, code or sheet"))?
                    .unwrap_or_default();
                events.status(call_id, ToolStatus::Saving).await;
                let document = self
                    .chats
                    .save_document(
                        Uuid::new_v4(),
                        ctx.user.id,
                        SaveDocument {
                            title: args.title,
                            content: Some(args.content),
                            kind,
                        },
                    )
                    .await?;
                Ok(json!({
                    "status": "created",
                    "message": "The document was created and is now shown to the user",
                    "id": document.id,
                    "title": document.title,
                    "kind": document.kind,
                }))
            }
            ToolName::UpdateDocument => {
                let args: UpdateDocumentArgs = parse(input)?;
                let current = self.chats.latest_document(args.id, ctx.user.id).await?;
                let prompt = format!(
                    "Document:\n{}\n\nRequested changes:\n{}",
                    current.content.as_deref().unwrap_or_default(),
                    args.description
                );
                let revised = self
                    .model
                    .ask(
                        &prompt,
                        Some(
                            "Rewrite the document to apply the requested changes. Reply with the \
                             complete updated document only.",
                        ),
                    )
                    .await?;
                if current.content.as_deref().map(str::trim) == Some(revised.trim()) {
                    return Ok(json!({ "status": "unchanged", "message": "Nothing to update" }));
                }
                events.status(call_id, ToolStatus::Saving).await;
                let document = self
                    .chats
                    .save_document(
                        current.id,
                        ctx.user.id,
                        SaveDocument {
                            title: current.title,
                            content: Some(revised),
                            kind: current.kind,
                        },
                    )
                    .await?;
                Ok(json!({
                    "status": "updated",
                    "message": "The document was updated",
                    "id": document.id,
                    "title": document.title,
                    "kind": document.kind,
                }))
            }
            ToolName::RequestSuggestions => {
                let args: RequestSuggestionsArgs = parse(input)?;
                let document = self.chats.latest_document(args.document_id, ctx.user.id).await?;
                let drafts: Vec<SuggestionDraft> = ask_json(
                    self.model.as_ref(),
                    document.content.as_deref().unwrap_or_default(),
                    Some(
                        "You are a writing assistant. Suggest up to five improvements to the \
                         text. Reply with a JSON array of objects with original_sentence, \
                         suggested_sentence and description. Keep the language of the text.",
                    ),
                )
                .await?;
                let suggestions: Vec<CreateSuggestion> = drafts
                    .into_iter()
                    .filter(|d| !d.original_sentence.trim().is_empty())
                    .take(MAX_SUGGESTIONS)
                    .map(|d| CreateSuggestion {
                        original_text: d.original_sentence,
                        suggested_text: d.suggested_sentence,
                        description: d.description,
                    })
                    .collect();
                events.status(call_id, ToolStatus::Saving).await;
                let saved = self
                    .chats
                    .add_suggestions(&document, ctx.user.id, &suggestions)
                    .await?;
                Ok(json!({
                    "status": "created",
                    "message": format!("Added {} suggestions", saved.len()),
                    "document_id": document.id,
                    "count": saved.len(),
                }))
            }
        }
    }

    async fn saving(&self, call_id: &str, image: &ImageChange, events: &EventSink) {
        if !image.is_keep() {
            events.status(call_id, ToolStatus::Uploading).await;
        }
        events.status(call_id, ToolStatus::Saving).await;
    }

    /// Generates the requested cover image, or keeps the current one.
    async fn image_change(
        &self,
        call_id: &str,
        request: &ImageRequest,
        title: Option<&str>,
        events: &EventSink,
    ) -> Result<ImageChange, ToolError> {
        if !request.generate_image {
            return Ok(ImageChange::Keep);
        }
        let generator = self
            .images
            .as_ref()
            .ok_or(ImageGenerationError::NotConfigured)?;
        let prompt = match (request.image_prompt.as_deref(), title) {
            (Some(prompt), _) if !prompt.trim().is_empty() => prompt.trim().to_string(),
            (_, Some(title)) => format!(
                "A respectful, text-free illustration for a Quran study center about: {title}"
            ),
            _ => "A calm, text-free illustration of a Quran study circle".to_string(),
        };
        events.status(call_id, ToolStatus::GeneratingImage).await;
        let upload = generator.generate(&prompt).await?;
        Ok(ImageChange::Replace(upload))
    }
}
