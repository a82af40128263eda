//! OpenAI-compatible chat completion client for wispbit.
//!
//! [`ChatBackend`] is the seam the review loop talks through; the shipped
//! implementation is [`OpenAiClient`], which works against any provider
//! exposing `/chat/completions` with tool calling (OpenRouter, OpenAI,
//! vLLM, LiteLLM, and friends).
//!
//! Responses are classified into exactly one of three kinds: plain text,
//! tool calls, or structured JSON (when a JSON-schema response format was
//! requested). Costs reported by the endpoint are propagated so callers
//! can aggregate spend.

mod client;
mod types;

pub use client::OpenAiClient;
pub use types::{
    ChatBackend, ChatMessage, ChatRequest, Completion, CompletionKind, FunctionCall,
    FunctionSpec, ResponseFormat, Role, ToolCallRequest, ToolChoice, ToolDefinition,
};
