use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use wispbit_core::Result;

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool result fed back to the assistant.
    Tool,
}

/// A message in a chat conversation.
///
/// Assistant turns may carry tool calls instead of content; tool turns
/// carry the id of the call they answer.
///
/// # Examples
///
/// ```
/// use wispbit_llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Review this file");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content.as_deref(), Some("Review this file"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content; absent on pure tool-call turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls emitted by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Id of the tool call a tool turn answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// An assistant turn carrying tool calls.
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// A tool-result turn answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One tool call emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back in the tool result.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    /// The function being called.
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".into()
}

/// Function name and raw JSON arguments of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name.
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

/// A tool schema offered to the model.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use wispbit_llm::ToolDefinition;
///
/// let tool = ToolDefinition::function(
///     "read_file",
///     "Read a file from the workspace",
///     json!({"type": "object", "properties": {"target_file": {"type": "string"}}}),
/// );
/// let value = serde_json::to_value(&tool).unwrap();
/// assert_eq!(value["type"], "function");
/// assert_eq!(value["function"]["name"], "read_file");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Name, description, and JSON-schema parameters.
    pub function: FunctionSpec,
}

/// The function half of a tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Build a function tool definition.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".into(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// How the model is allowed to use tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Model must call some tool.
    Required,
    /// Model must call this specific tool.
    Function(String),
}

impl ToolChoice {
    /// Wire representation for the request body.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ToolChoice::Auto => serde_json::Value::String("auto".into()),
            ToolChoice::Required => serde_json::Value::String("required".into()),
            ToolChoice::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            }),
        }
    }
}

/// A response format constraint.
#[derive(Debug, Clone)]
pub struct ResponseFormat(pub serde_json::Value);

impl ResponseFormat {
    /// A `json_schema` response format with the given name and schema.
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self(serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": name.into(), "schema": schema, "strict": true },
        }))
    }

    /// `true` when this format requests schema-constrained JSON.
    pub fn is_json_schema(&self) -> bool {
        self.0.get("type").and_then(|t| t.as_str()) == Some("json_schema")
    }
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Tools offered to the model.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier.
    pub model: String,
    /// Optional tool-choice constraint.
    pub tool_choice: Option<ToolChoice>,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
    /// Optional completion token cap.
    pub max_tokens: Option<u32>,
    /// Optional response format constraint.
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    /// A plain request with no tools or constraints.
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            model: model.into(),
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }
}

/// What kind of answer the model gave.
#[derive(Debug, Clone)]
pub enum CompletionKind {
    /// Plain text content.
    Message(String),
    /// One or more tool calls.
    ToolCalls(Vec<ToolCallRequest>),
    /// Content that parsed as a JSON object under a json_schema format.
    Structured(serde_json::Value),
}

/// A classified completion with its reported cost.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The classified response.
    pub kind: CompletionKind,
    /// Dollar cost reported by the endpoint, 0 when unavailable.
    pub cost: f64,
}

/// The seam between the review loop and a chat-completion provider.
///
/// The shipped implementation is [`crate::OpenAiClient`]; tests substitute
/// scripted backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue one completion.
    async fn complete(&self, request: ChatRequest) -> Result<Completion>;
}
