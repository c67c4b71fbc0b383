//! Clients for the two external collaborators: a chat-completion API used to
//! author tasks, and the long-running task API that executes them.

mod chat;
mod error;
mod task_api;

pub use chat::{ChatBackend, OpenAiChatClient};
pub use error::UpstreamError;
pub use task_api::{
    CreateRunRequest, HttpTaskApi, OutputSchemaSpec, TaskApi, TaskSpec, UpstreamReply,
};

use serde_json::Value;

/// Best-effort human-readable message from an upstream error body.
pub fn error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.get("error"),
        body.get("message"),
        body.get("detail"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
