use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use wispbit_core::{
    CodebaseRule, FileAnalysis, FileChange, RejectedViolation, Result, Violation, WispbitConfig,
    WispbitError,
};
use wispbit_llm::{ChatBackend, ChatMessage, ChatRequest, CompletionKind};
use wispbit_sandbox::{CandidateViolation, ToolExecutor, ToolRequest};

use crate::prompt::{build_review_prompt, build_system_prompt, tool_definitions};
use crate::validator::validate_candidate;

/// Explanation token for files with no diff to review.
pub const NO_PATCH_FOUND: &str = "NO_PATCH_FOUND";

/// Explanation token for files no rule applies to.
pub const NO_APPLICABLE_RULES: &str = "NO_APPLICABLE_RULES";

/// Explanation token when the conversation hit the turn cap.
pub const MAX_TURNS_EXCEEDED: &str = "MAX_TURNS_EXCEEDED";

struct ToolRun {
    content: String,
    visited: Option<String>,
    candidate: Option<CandidateViolation>,
}

/// Review one file against its applicable rules.
///
/// Drives a tool-calling conversation until the model answers with plain
/// text, collects the candidate violations its `complaint` calls produce,
/// validates each candidate with a second focused completion, and
/// aggregates cost and visited files.
///
/// Within one assistant turn, tools execute concurrently but their result
/// turns are appended in the order the calls were emitted.
///
/// # Errors
///
/// Propagates provider failures (after the adapter's retries) and
/// cancellation; tool-level input errors are fed back to the model
/// instead.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use wispbit_core::{FileChange, FileStatus, WispbitConfig};
/// use wispbit_llm::{ChatBackend, OpenAiClient};
/// use wispbit_review::review_file;
///
/// # async fn demo(rules: Vec<wispbit_core::CodebaseRule>) {
/// let backend: Arc<dyn ChatBackend> = Arc::new(
///     OpenAiClient::new("https://openrouter.ai/api/v1".into(), None).unwrap(),
/// );
/// let file = FileChange::new(
///     "src/api.rs".into(),
///     FileStatus::Modified,
///     Some("@@ -1 +1 @@\n-a\n+b".into()),
///     1,
///     1,
/// );
/// let all = vec![file.clone()];
/// let analysis = review_file(
///     backend,
///     Path::new("."),
///     &file,
///     rules,
///     &all,
///     &WispbitConfig::default(),
/// )
/// .await
/// .unwrap();
/// println!("{} violation(s), ${:.4}", analysis.violations.len(), analysis.cost);
/// # }
/// ```
pub async fn review_file(
    backend: Arc<dyn ChatBackend>,
    root: &Path,
    file: &FileChange,
    rules: Vec<CodebaseRule>,
    all_files: &[FileChange],
    config: &WispbitConfig,
) -> Result<FileAnalysis> {
    if file.patch.as_deref().unwrap_or("").is_empty() {
        return Ok(FileAnalysis::empty(NO_PATCH_FOUND, rules));
    }
    if rules.is_empty() {
        return Ok(FileAnalysis::empty(NO_APPLICABLE_RULES, rules));
    }

    let executor = Arc::new(ToolExecutor::new(
        root.to_path_buf(),
        file.clone(),
        rules.clone(),
    ));
    let tools = tool_definitions();

    let mut messages = vec![
        ChatMessage::system(build_system_prompt(all_files)),
        ChatMessage::user(build_review_prompt(file, &rules)),
    ];

    let mut cost = 0.0f64;
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut candidates: Vec<CandidateViolation> = Vec::new();
    let mut explanation = MAX_TURNS_EXCEEDED.to_string();

    for _turn in 0..config.review.max_turns {
        let request = ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
            model: config.llm.model.clone(),
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            response_format: None,
        };
        let completion = backend.complete(request).await?;
        cost += completion.cost;

        match completion.kind {
            CompletionKind::ToolCalls(calls) => {
                messages.push(ChatMessage::assistant_tool_calls(calls.clone()));

                let mut handles = Vec::with_capacity(calls.len());
                for call in &calls {
                    let executor = Arc::clone(&executor);
                    let name = call.function.name.clone();
                    let arguments = call.function.arguments.clone();
                    handles.push(tokio::spawn(async move {
                        run_tool(&executor, &name, &arguments).await
                    }));
                }

                // Result turns go back in emitted-call order regardless of
                // completion order.
                for (call, handle) in calls.iter().zip(handles) {
                    let run = handle
                        .await
                        .map_err(|e| WispbitError::Provider(format!("tool task failed: {e}")))??;
                    messages.push(ChatMessage::tool_result(&call.id, run.content));
                    if let Some(path) = run.visited {
                        visited.insert(path);
                    }
                    if let Some(candidate) = run.candidate {
                        candidates.push(candidate);
                    }
                }
            }
            CompletionKind::Message(content) => {
                explanation = content;
                break;
            }
            CompletionKind::Structured(value) => {
                explanation = value.to_string();
                break;
            }
        }
    }

    let validation_model = config.llm.validation_model().to_string();
    let rules_ref = &rules;
    let verdicts = futures::future::join_all(candidates.iter().map(|candidate| {
        let backend = Arc::clone(&backend);
        let model = validation_model.clone();
        async move {
            let rule = find_rule(rules_ref, candidate);
            validate_candidate(backend.as_ref(), &model, file, rule, candidate).await
        }
    }))
    .await;

    let mut violations = Vec::new();
    let mut rejected = Vec::new();
    for (candidate, verdict) in candidates.iter().zip(verdicts) {
        let rule = find_rule(&rules, candidate);
        match verdict {
            Ok(verdict) => {
                cost += verdict.cost;
                if verdict.is_valid {
                    violations.push(Violation {
                        description: candidate.description.clone(),
                        line: candidate.line,
                        rule: rule.clone(),
                        validation_reasoning: Some(verdict.reasoning),
                        is_cached: false,
                    });
                } else {
                    rejected.push(RejectedViolation {
                        description: candidate.description.clone(),
                        line: candidate.line,
                        rule_id: candidate.rule_id.clone(),
                        reasoning: verdict.reasoning,
                    });
                }
            }
            Err(WispbitError::Aborted) => return Err(WispbitError::Aborted),
            Err(err) => {
                tracing::warn!(file = %file.filename, %err, "validation failed; dropping candidate");
                rejected.push(RejectedViolation {
                    description: candidate.description.clone(),
                    line: candidate.line,
                    rule_id: candidate.rule_id.clone(),
                    reasoning: format!("validation failed: {err}"),
                });
            }
        }
    }

    visited.remove(&file.filename);

    Ok(FileAnalysis {
        violations,
        explanation,
        rules,
        visited_files: visited.into_iter().collect(),
        rejected_violations: rejected,
        cost,
    })
}

fn find_rule<'a>(rules: &'a [CodebaseRule], candidate: &CandidateViolation) -> &'a CodebaseRule {
    rules
        .iter()
        .find(|r| r.id == candidate.rule_id)
        .unwrap_or(&rules[0])
}

/// Execute one tool call, converting recoverable failures into error
/// content the model can react to.
async fn run_tool(executor: &ToolExecutor, name: &str, arguments: &str) -> Result<ToolRun> {
    let request = match ToolRequest::parse(name, arguments) {
        Ok(request) => request,
        Err(err) if err.is_tool_recoverable() => return Ok(error_run(&err)),
        Err(err) => return Err(err),
    };
    match executor.execute(&request).await {
        Ok(outcome) => Ok(ToolRun {
            content: outcome.content,
            visited: outcome.visited_file,
            candidate: outcome.violation,
        }),
        Err(err) if err.is_tool_recoverable() => Ok(error_run(&err)),
        Err(err) => Err(err),
    }
}

fn error_run(err: &WispbitError) -> ToolRun {
    ToolRun {
        content: json!({ "error": err.to_string() }).to_string(),
        visited: None,
        candidate: None,
    }
}
