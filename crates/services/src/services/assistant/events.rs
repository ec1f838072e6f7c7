use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ToolStatus {
    GeneratingImage,
    Uploading,
    Saving,
}

/// Progress of one assistant turn, streamed to the client as it happens.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[ts(type = "unknown")]
        args: Value,
    },
    Status {
        tool_call_id: String,
        status: ToolStatus,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[ts(type = "unknown")]
        result: Value,
    },
    Error {
        message: String,
    },
    Finish {
        message_id: Option<Uuid>,
    },
}

/// Sending half of the event stream. A closed receiver means the client went
/// away; the turn still runs to completion so its results are saved.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::Sender<ChatEvent>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<ChatEvent>) -> Self {
        Self { sender }
    }

    pub async fn emit(&self, event: ChatEvent) {
        if self.sender.send(event).await.is_err() {
            debug!("Chat event receiver dropped");
        }
    }

    pub async fn status(&self, tool_call_id: &str, status: ToolStatus) {
        self.emit(ChatEvent::Status {
            tool_call_id: tool_call_id.to_string(),
            status,
        })
        .await;
    }
}
