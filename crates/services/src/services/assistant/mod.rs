//! The admin assistant: a tool-calling loop over the language model that can
//! draft and publish site content.

pub mod events;
pub mod tools;

use std::{mem, sync::Arc};

use chrono::Utc;
use db::models::{
    chat::Chat,
    message::{Message as StoredMessage, MessagePart, MessageRole},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use ts_rs::TS;
use utils::locale::Locale;
use uuid::Uuid;

use self::{
    events::{ChatEvent, EventSink},
    tools::ToolBox,
};
use super::{
    auth::AuthenticatedUser,
    chat::{ChatError, ChatService},
    claude_api::{ClaudeApiError, ContentBlock, Message, ModelRequest, SharedModel},
    content::ValidationErrors,
};

/// Upper bound on model calls per user message.
pub const MAX_STEPS: usize = 5;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("the assistant is not configured")]
    Disabled,
    #[error("only administrators can use the assistant")]
    Forbidden,
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Model(#[from] ClaudeApiError),
}

/// Who is asking, in which chat and language. Passed explicitly to every tool.
#[derive(Debug, Clone, Copy)]
pub struct ChatContext {
    pub chat_id: Uuid,
    pub user: AuthenticatedUser,
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct ChatRequest {
    /// Chat id chosen by the client; a new id starts a new chat.
    pub id: Uuid,
    pub message: String,
    pub locale: Option<Locale>,
}

fn system_prompt(ctx: &ChatContext) -> String {
    let language = match ctx.locale {
        Locale::Ar => "Arabic",
        Locale::En => "English",
    };
    format!(
        "You are the content assistant of a Quran memorization and study center. You help \
         administrators write and publish news articles and study programs, and draft documents. \
         Content is published per locale (`ar` or `en`); pass the locale explicitly when calling \
         a tool. When updating, only pass fields that should change. Reply in {language} unless \
         asked otherwise. Today is {}.",
        Utc::now().format("%Y-%m-%d")
    )
}

fn push_merged(messages: &mut Vec<Message>, message: Message) {
    if message.content.is_empty() {
        return;
    }
    match messages.last_mut() {
        Some(last) if last.role == message.role => last.content.extend(message.content),
        _ => messages.push(message),
    }
}

/// Rebuilds the model conversation from stored messages. An assistant message
/// spans several steps; each run of tool results closes a step.
pub fn to_model_messages(history: &[StoredMessage]) -> Vec<Message> {
    let mut messages = Vec::new();
    for stored in history {
        match stored.role {
            MessageRole::User => {
                let text = stored.text();
                if !text.trim().is_empty() {
                    push_merged(&mut messages, Message::user(text));
                }
            }
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                let mut results = Vec::new();
                for part in &stored.parts {
                    if let MessagePart::ToolResult {
                        tool_call_id,
                        result,
                        ..
                    } = part
                    {
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: tool_call_id.clone(),
                            content: result.to_string(),
                            is_error: result.get("status").and_then(|s| s.as_str()) == Some("error"),
                        });
                        continue;
                    }
                    if !results.is_empty() {
                        push_merged(&mut messages, Message::assistant(mem::take(&mut blocks)));
                        push_merged(&mut messages, Message::tool_results(mem::take(&mut results)));
                    }
                    match part {
                        MessagePart::Text { text } if !text.is_empty() => {
                            blocks.push(ContentBlock::Text { text: text.clone() })
                        }
                        MessagePart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => blocks.push(ContentBlock::ToolUse {
                            id: tool_call_id.clone(),
                            name: tool_name.clone(),
                            input: args.clone(),
                        }),
                        _ => {}
                    }
                }
                push_merged(&mut messages, Message::assistant(blocks));
                push_merged(&mut messages, Message::tool_results(results));
            }
        }
    }
    messages
}

pub struct ChatAgent {
    model: SharedModel,
    tools: ToolBox,
}

impl ChatAgent {
    pub fn new(model: SharedModel, tools: ToolBox) -> Self {
        Self { model, tools }
    }

    /// Runs one assistant turn. Everything the assistant produced is appended to
    /// `parts` as it happens, so a failed turn still leaves a partial record.
    pub async fn run(
        &self,
        ctx: &ChatContext,
        history: &[StoredMessage],
        events: &EventSink,
        parts: &mut Vec<MessagePart>,
    ) -> Result<(), AssistantError> {
        let mut messages = to_model_messages(history);
        let system = system_prompt(ctx);

        for step in 0..MAX_STEPS {
            let request = ModelRequest::new(messages.clone())
                .with_system(system.clone())
                .with_tools(self.tools.definitions());
            let response = self.model.complete(request).await?;

            let mut results = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => {
                        events.emit(ChatEvent::Text { text: text.clone() }).await;
                        parts.push(MessagePart::text(text.clone()));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        events
                            .emit(ChatEvent::ToolCall {
                                tool_call_id: id.clone(),
                                tool_name: name.clone(),
                                args: input.clone(),
                            })
                            .await;
                        parts.push(MessagePart::ToolCall {
                            tool_call_id: id.clone(),
                            tool_name: name.clone(),
                            args: input.clone(),
                        });

                        let (result, is_error) =
                            self.tools.execute(ctx, id, name, input.clone(), events).await;

                        events
                            .emit(ChatEvent::ToolResult {
                                tool_call_id: id.clone(),
                                tool_name: name.clone(),
                                result: result.clone(),
                            })
                            .await;
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: result.to_string(),
                            is_error,
                        });
                        parts.push(MessagePart::ToolResult {
                            tool_call_id: id.clone(),
                            tool_name: name.clone(),
                            result,
                        });
                    }
                    _ => {}
                }
            }

            if results.is_empty() {
                return Ok(());
            }
            if step + 1 == MAX_STEPS {
                warn!(chat_id = %ctx.chat_id, "Assistant stopped at the step limit");
                break;
            }
            messages.push(Message::assistant(response.content));
            messages.push(Message::tool_results(results));
        }
        Ok(())
    }
}

/// A user message that has been accepted and stored, ready to be answered.
#[derive(Debug)]
pub struct PreparedTurn {
    pub context: ChatContext,
    pub chat: Chat,
    pub history: Vec<StoredMessage>,
}

/// Chat orchestration shared by the HTTP layer: stores the user message, runs
/// the agent and stores its reply.
#[derive(Clone)]
pub struct Assistant {
    chats: ChatService,
    agent: Option<Arc<ChatAgent>>,
}

impl Assistant {
    pub fn new(chats: ChatService, agent: Option<ChatAgent>) -> Self {
        Self {
            chats,
            agent: agent.map(Arc::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.agent.is_some()
    }

    /// Checks access and stores the user's message. Errors here happen before any
    /// streaming starts.
    pub async fn prepare(
        &self,
        user: AuthenticatedUser,
        request: ChatRequest,
        default_locale: Locale,
    ) -> Result<PreparedTurn, AssistantError> {
        if !user.is_admin() {
            return Err(AssistantError::Forbidden);
        }
        if self.agent.is_none() {
            return Err(AssistantError::Disabled);
        }
        let message = request.message.trim();
        if message.is_empty() {
            let mut errors = ValidationErrors::default();
            errors.add("message", "is required");
            return Err(ChatError::Validation(errors).into());
        }

        let chat = self.chats.start_or_continue(request.id, user.id, message).await?;
        self.chats
            .save_message(chat.id, MessageRole::User, &[MessagePart::text(message)])
            .await?;
        let history = self.chats.messages(chat.id).await?;

        Ok(PreparedTurn {
            context: ChatContext {
                chat_id: chat.id,
                user,
                locale: request.locale.unwrap_or(default_locale),
            },
            chat,
            history,
        })
    }

    /// Answers a prepared turn, streaming progress into `events`. Always ends the
    /// stream with [`ChatEvent::Finish`].
    pub async fn respond(&self, turn: PreparedTurn, events: EventSink) {
        let Some(agent) = &self.agent else {
            events
                .emit(ChatEvent::Error {
                    message: AssistantError::Disabled.to_string(),
                })
                .await;
            events.emit(ChatEvent::Finish { message_id: None }).await;
            return;
        };

        let chat_id = turn.context.chat_id;
        let mut parts = Vec::new();
        if let Err(e) = agent
            .run(&turn.context, &turn.history, &events, &mut parts)
            .await
        {
            error!(chat_id = %chat_id, error = %e, "Assistant turn failed");
            events.emit(ChatEvent::Error { message: e.to_string() }).await;
        }

        let mut message_id = None;
        if !parts.is_empty() {
            match self
                .chats
                .save_message(chat_id, MessageRole::Assistant, &parts)
                .await
            {
                Ok(message) => message_id = Some(message.id),
                Err(e) => {
                    error!(chat_id = %chat_id, error = %e, "Failed to save assistant reply");
                    events.emit(ChatEvent::Error { message: e.to_string() }).await;
                }
            }
        }
        info!(chat_id = %chat_id, parts = parts.len(), "Assistant turn finished");
        events.emit(ChatEvent::Finish { message_id }).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::models::user::{CreateUser, User, UserRole};
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use tokio::sync::mpsc;

    use super::{events::ToolStatus, *};
    use crate::services::{
        claude_api::{
            Role,
            test_support::{ScriptedModel, text, tool_use},
        },
        content::{
            news::{CreateNews, NewsService},
            program::ProgramService,
            test_support::{RecordingStorage, storage, test_pool},
        },
        image_generation::test_support::FakeImageGenerator,
    };

    struct Harness {
        pool: SqlitePool,
        _dir: tempfile::TempDir,
        files: Arc<RecordingStorage>,
        model: Arc<ScriptedModel>,
        images: Arc<FakeImageGenerator>,
        assistant: Assistant,
        admin: AuthenticatedUser,
    }

    async fn harness(script: Vec<Vec<ContentBlock>>) -> Harness {
        let (pool, dir) = test_pool().await;
        let files = storage();
        let model = Arc::new(ScriptedModel::new(script));
        let images = Arc::new(FakeImageGenerator::default());
        let chats = ChatService::new(pool.clone(), None);
        let tools = ToolBox::new(
            ProgramService::new(pool.clone(), files.clone()),
            NewsService::new(pool.clone(), files.clone()),
            chats.clone(),
            model.clone(),
            Some(images.clone()),
        );
        let agent = ChatAgent::new(model.clone(), tools);
        let admin = User::create(
            &pool,
            Uuid::new_v4(),
            &CreateUser {
                name: "Admin".into(),
                email: "admin@example.org".into(),
                password_hash: None,
                role: UserRole::Admin,
                email_verified: true,
            },
        )
        .await
        .unwrap();
        Harness {
            pool,
            _dir: dir,
            files,
            model,
            images,
            assistant: Assistant::new(chats, Some(agent)),
            admin: AuthenticatedUser {
                id: admin.id,
                role: UserRole::Admin,
            },
        }
    }

    async fn converse(h: &Harness, message: &str) -> Vec<ChatEvent> {
        let turn = h
            .assistant
            .prepare(
                h.admin,
                ChatRequest {
                    id: Uuid::new_v4(),
                    message: message.to_string(),
                    locale: Some(Locale::En),
                },
                Locale::Ar,
            )
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        h.assistant.respond(turn, EventSink::new(tx)).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn tool_results(events: &[ChatEvent]) -> Vec<Value> {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolResult { result, .. } => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    fn statuses(events: &[ChatEvent]) -> Vec<ToolStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Status { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn create_news_tool_publishes_and_feeds_result_back() {
        let h = harness(vec![
            vec![
                text("Publishing it now."),
                tool_use(
                    "toolu_1",
                    "createNews",
                    json!({
                        "locale": "en",
                        "slug": "ramadan-classes",
                        "title": "Ramadan classes",
                        "content": "Evening Quran classes start next week."
                    }),
                ),
            ],
            vec![text("The article is live.")],
        ])
        .await;

        let events = converse(&h, "Announce the Ramadan classes").await;

        let results = tool_results(&events);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["status"], "created");
        assert_eq!(results[0]["slug"], "ramadan-classes");
        assert_eq!(statuses(&events), vec![ToolStatus::Saving]);
        assert!(matches!(events.last(), Some(ChatEvent::Finish { message_id: Some(_) })));

        let second = &h.model.requests.lock().unwrap()[1];
        let fed_back = second.messages.last().unwrap();
        assert_eq!(fed_back.role, Role::User);
        assert!(matches!(
            &fed_back.content[0],
            ContentBlock::ToolResult { tool_use_id, is_error: false, .. } if tool_use_id == "toolu_1"
        ));

        let news = NewsService::new(h.pool.clone(), h.files.clone())
            .get_by_slug("ramadan-classes", Locale::En)
            .await
            .unwrap();
        assert_eq!(news.news.title, "Ramadan classes");
    }

    #[tokio::test]
    async fn update_with_identical_values_reports_nothing_to_update() {
        let h = harness(vec![]).await;
        let news = NewsService::new(h.pool.clone(), h.files.clone())
            .create(
                CreateNews {
                    locale: Locale::En,
                    slug: Some("open-day".into()),
                    title: "Open day".into(),
                    content: "Visit the center on Friday.".into(),
                    ..Default::default()
                },
                Some(crate::services::image::fixtures::png(64)),
            )
            .await
            .unwrap();
        let puts_before = h.files.put_count();
        h.model.push(vec![tool_use(
            "toolu_1",
            "updateNews",
            json!({
                "id": news.news.id,
                "locale": "en",
                "title": "Open day",
                "content": "Visit the center on Friday."
            }),
        )]);
        h.model.push(vec![text("Nothing needed changing.")]);

        let events = converse(&h, "Make sure the open day post says Friday").await;

        let results = tool_results(&events);
        assert_eq!(results[0], json!({"status": "unchanged", "message": "Nothing to update"}));
        assert_eq!(h.files.put_count(), puts_before);
        assert!(h.files.deleted().is_empty());
        assert_eq!(statuses(&events), vec![ToolStatus::Saving]);
    }

    #[tokio::test]
    async fn generated_image_goes_through_storage() {
        let h = harness(vec![
            vec![tool_use(
                "toolu_1",
                "createProgram",
                json!({
                    "locale": "en",
                    "title": "Tajweed for beginners",
                    "description": "Learn the rules of recitation.",
                    "generate_image": true
                }),
            )],
            vec![text("Done.")],
        ])
        .await;

        let events = converse(&h, "Add a tajweed program with a picture").await;

        assert_eq!(
            statuses(&events),
            vec![ToolStatus::GeneratingImage, ToolStatus::Uploading, ToolStatus::Saving]
        );
        let results = tool_results(&events);
        assert_eq!(results[0]["status"], "created");
        assert_eq!(h.files.stored().len(), 1);
        let prompts = h.images.prompts.lock().unwrap().clone();
        assert!(prompts[0].contains("Tajweed for beginners"));
    }

    #[tokio::test]
    async fn tool_errors_are_returned_to_the_model() {
        let h = harness(vec![
            vec![tool_use("toolu_1", "createNews", json!({"locale": "en", "title": "", "content": "x"}))],
            vec![tool_use("toolu_2", "deleteEverything", json!({}))],
            vec![text("I could not do that.")],
        ])
        .await;

        let events = converse(&h, "Post something").await;

        let results = tool_results(&events);
        assert_eq!(results[0]["status"], "error");
        assert!(results[0]["errors"]["title"].is_string());
        assert_eq!(results[1]["status"], "error");
        assert_eq!(h.files.put_count(), 0);
        assert_eq!(h.model.request_count(), 3);
    }

    #[tokio::test]
    async fn loop_stops_after_max_steps() {
        let script = (0..MAX_STEPS + 2)
            .map(|i| vec![tool_use(&format!("toolu_{i}"), "requestSuggestions", json!({"document_id": Uuid::nil()}))])
            .collect();
        let h = harness(script).await;

        let events = converse(&h, "Keep going").await;

        assert_eq!(h.model.request_count(), MAX_STEPS);
        assert_eq!(tool_results(&events).len(), MAX_STEPS);
        assert!(matches!(events.last(), Some(ChatEvent::Finish { .. })));
    }

    #[tokio::test]
    async fn non_admins_are_turned_away() {
        let h = harness(vec![]).await;
        let member = AuthenticatedUser {
            id: h.admin.id,
            role: UserRole::User,
        };
        let err = h
            .assistant
            .prepare(
                member,
                ChatRequest {
                    id: Uuid::new_v4(),
                    message: "hi".into(),
                    locale: None,
                },
                Locale::Ar,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Forbidden));
    }

    #[test]
    fn history_splits_assistant_steps() {
        let chat_id = Uuid::new_v4();
        let stored = |role, parts| StoredMessage {
            id: Uuid::new_v4(),
            chat_id,
            role,
            parts,
            created_at: Utc::now(),
        };
        let history = vec![
            stored(MessageRole::User, vec![MessagePart::text("Post the news")]),
            stored(
                MessageRole::Assistant,
                vec![
                    MessagePart::ToolCall {
                        tool_call_id: "t1".into(),
                        tool_name: "createNews".into(),
                        args: json!({}),
                    },
                    MessagePart::ToolResult {
                        tool_call_id: "t1".into(),
                        tool_name: "createNews".into(),
                        result: json!({"status": "created"}),
                    },
                    MessagePart::text("Published."),
                ],
            ),
            stored(MessageRole::User, vec![MessagePart::text("Thanks")]),
        ];

        let messages = to_model_messages(&history);

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert!(matches!(&messages[2].content[0], ContentBlock::ToolResult { .. }));
    }
}
