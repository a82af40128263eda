//! Scripted [`ChatBackend`] for exercising the review pipeline without a
//! network.
//!
//! Review-loop completions pop from one queue and validation completions
//! (requests that force `report_validation`) from another, so tests stay
//! deterministic even though validations run concurrently.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use wispbit_core::{Result, WispbitError};
use wispbit_llm::{
    ChatBackend, ChatRequest, Completion, CompletionKind, FunctionCall, ToolCallRequest,
    ToolChoice,
};

/// A backend that replays queued completions and records every request.
///
/// # Examples
///
/// ```
/// use wispbit_review::testing::ScriptedBackend;
///
/// let backend = ScriptedBackend::new()
///     .push_tool_call("list_dir", r#"{"relative_workspace_path": "."}"#)
///     .push_message("all clear");
/// assert_eq!(backend.remaining(), 2);
/// ```
#[derive(Default)]
pub struct ScriptedBackend {
    main: Mutex<VecDeque<Result<Completion>>>,
    validation: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<ChatRequest>>,
    next_call_id: Mutex<u32>,
}

impl ScriptedBackend {
    /// An empty backend; every queue starts empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text completion.
    pub fn push_message(self, content: &str) -> Self {
        self.push_completion(Ok(Completion {
            kind: CompletionKind::Message(content.to_string()),
            cost: 0.0,
        }))
    }

    /// Queue a plain-text completion with a cost.
    pub fn push_message_costing(self, content: &str, cost: f64) -> Self {
        self.push_completion(Ok(Completion {
            kind: CompletionKind::Message(content.to_string()),
            cost,
        }))
    }

    /// Queue a single tool call.
    pub fn push_tool_call(self, name: &str, arguments: &str) -> Self {
        let call = self.make_call(name, arguments);
        self.push_completion(Ok(Completion {
            kind: CompletionKind::ToolCalls(vec![call]),
            cost: 0.0,
        }))
    }

    /// Queue one assistant turn carrying several tool calls.
    pub fn push_tool_calls(self, calls: &[(&str, &str)]) -> Self {
        let calls: Vec<ToolCallRequest> = calls
            .iter()
            .map(|(name, arguments)| self.make_call(name, arguments))
            .collect();
        self.push_completion(Ok(Completion {
            kind: CompletionKind::ToolCalls(calls),
            cost: 0.0,
        }))
    }

    /// Queue a validation verdict, served to `report_validation` requests.
    pub fn push_validation(self, is_valid: bool, reasoning: &str) -> Self {
        let arguments = json!({ "is_valid": is_valid, "reasoning": reasoning }).to_string();
        let call = self.make_call("report_validation", &arguments);
        self.validation.lock().unwrap().push_back(Ok(Completion {
            kind: CompletionKind::ToolCalls(vec![call]),
            cost: 0.0,
        }));
        self
    }

    /// Queue a validation verdict with a cost.
    pub fn push_validation_costing(self, is_valid: bool, reasoning: &str, cost: f64) -> Self {
        let arguments = json!({ "is_valid": is_valid, "reasoning": reasoning }).to_string();
        let call = self.make_call("report_validation", &arguments);
        self.validation.lock().unwrap().push_back(Ok(Completion {
            kind: CompletionKind::ToolCalls(vec![call]),
            cost,
        }));
        self
    }

    /// Queue an error on the main queue.
    pub fn push_error(self, message: &str) -> Self {
        self.push_completion(Err(WispbitError::Provider(message.to_string())))
    }

    /// Completions still queued (both queues).
    pub fn remaining(&self) -> usize {
        self.main.lock().unwrap().len() + self.validation.lock().unwrap().len()
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push_completion(self, completion: Result<Completion>) -> Self {
        self.main.lock().unwrap().push_back(completion);
        self
    }

    fn make_call(&self, name: &str, arguments: &str) -> ToolCallRequest {
        let mut next = self.next_call_id.lock().unwrap();
        *next += 1;
        ToolCallRequest {
            id: format!("call_{next}"),
            kind: "function".into(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        let is_validation = matches!(
            &request.tool_choice,
            Some(ToolChoice::Function(name)) if name == "report_validation"
        );
        self.requests.lock().unwrap().push(request);

        if is_validation {
            if let Some(queued) = self.validation.lock().unwrap().pop_front() {
                return queued;
            }
        }
        self.main
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(WispbitError::Provider(
                    "scripted backend ran out of completions".into(),
                ))
            })
    }
}
