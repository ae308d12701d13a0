use std::fmt;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

// ── Conversation data model ─────────────────────────────────────────────────

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A single conversation turn.
///
/// Messages are immutable once appended to history; the runner works on a
/// local copy and never mutates the caller's history in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// For `Role::Tool` messages: the id of the `ToolCall` this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For assistant messages that requested tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl AgentMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message with text only.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls alongside its raw text.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// An image attached to a message (base64 payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Base64-encoded image data.
    pub data: String,
}

/// A structured tool invocation request extracted from model output.
///
/// `id` is always generated locally (the model never supplies one), so
/// results can be correlated even if the model omits or duplicates ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of executing one `ToolCall`. Exactly one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Matches the originating `ToolCall::id`.
    pub id: String,
    pub name: String,
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final outcome of an agent run.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub message: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub iterations: usize,
    /// `false` when the iteration budget was exhausted with tool calls still
    /// pending; the caller decides whether to continue or surface a warning.
    pub finished: bool,
}

// ── Transport contract ──────────────────────────────────────────────────────

/// A message in the shape the LLM transport consumes: attachments flattened
/// to an images list, tool linkage fields forwarded as-is.
#[derive(Debug, Clone, Serialize)]
pub struct TransportMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Convert conversation history to transport-level messages.
pub fn to_transport_messages(messages: &[AgentMessage]) -> Vec<TransportMessage> {
    messages
        .iter()
        .map(|msg| TransportMessage {
            role: msg.role,
            content: msg.content.clone(),
            images: msg.attachments.iter().map(|a| a.data.clone()).collect(),
            tool_calls: msg.tool_calls.clone(),
            tool_call_id: msg.tool_call_id.clone(),
        })
        .collect()
}

/// Provider/model selection and sampling options for one run.
///
/// Credential presence is validated by the caller before `run` is invoked;
/// the loop forwards these to the transport untouched.
#[derive(Debug, Clone, Default)]
pub struct LlmOptions {
    pub provider: String,
    pub model: String,
    pub api_key: Option<secrecy::Secret<String>>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Set by the runner each iteration; a caller-supplied value is replaced.
    pub system_prompt: Option<String>,
}

/// Typed errors from the LLM transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The stream was cancelled on request. Not an error to the agent loop.
    #[error("stream cancelled")]
    Cancelled,
    /// Any other provider/network failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Incrementally-consumable stream of UTF-8 text fragments from a provider.
#[async_trait]
pub trait ChunkStream: Send {
    /// Next text fragment; `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> Option<Result<String, TransportError>>;

    /// Stop the underlying network operation server-side. Idempotent.
    async fn cancel(&mut self);
}

/// Abstraction over the network call to an LLM provider.
///
/// Implemented by the embedding application; the agent loop only relies on
/// this contract.
pub trait LlmTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Open a streaming completion for the given messages.
    fn stream(
        &self,
        messages: Vec<TransportMessage>,
        options: &LlmOptions,
    ) -> Result<Box<dyn ChunkStream>, TransportError>;
}

impl fmt::Debug for dyn LlmTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmTransport")
            .field("name", &self.name())
            .finish()
    }
}
