use serde::Deserialize;
use serde_json::json;

use wispbit_core::{CodebaseRule, FileChange, Result, Side, WispbitError};
use wispbit_llm::{
    ChatBackend, ChatMessage, ChatRequest, CompletionKind, ToolChoice, ToolDefinition,
};
use wispbit_patch::{add_line_numbers_to_patch, extract_diff_hunk, filter_diff, DiffMode};
use wispbit_sandbox::CandidateViolation;

/// Token cap for the validation completion; the verdict is short.
const VALIDATION_MAX_TOKENS: u32 = 300;

/// Sampling temperature for validation.
const VALIDATION_TEMPERATURE: f32 = 0.1;

/// The validator's decision about one candidate violation.
#[derive(Debug, Clone)]
pub struct Verdict {
    /// Whether the violation stands.
    pub is_valid: bool,
    /// The validator's reasoning, kept on the violation or the rejection.
    pub reasoning: String,
    /// Cost of the validation call.
    pub cost: f64,
}

#[derive(Debug, Deserialize)]
struct VerdictArgs {
    is_valid: bool,
    #[serde(default)]
    reasoning: String,
}

fn report_validation_tool() -> ToolDefinition {
    ToolDefinition::function(
        "report_validation",
        "Report whether the candidate violation is valid.",
        json!({
            "type": "object",
            "properties": {
                "is_valid": {
                    "type": "boolean",
                    "description": "true if the violation should be reported to the user"
                },
                "reasoning": {
                    "type": "string",
                    "description": "One or two sentences explaining the decision"
                }
            },
            "required": ["is_valid", "reasoning"]
        }),
    )
}

/// Check one candidate violation against the exact hunk it points at.
///
/// The prompt shows the rule, the candidate's description, and the hunk
/// split into an additions-only and a deletions-only projection (both
/// line-numbered), then forces a `report_validation` tool call for the
/// verdict.
///
/// # Errors
///
/// Returns [`WispbitError::Provider`] when the model does not produce the
/// forced tool call or its arguments do not parse.
pub async fn validate_candidate(
    backend: &dyn ChatBackend,
    model: &str,
    file: &FileChange,
    rule: &CodebaseRule,
    candidate: &CandidateViolation,
) -> Result<Verdict> {
    let patch = file.patch.as_deref().unwrap_or("");
    let hunk = extract_diff_hunk(
        patch,
        candidate.line.start,
        candidate.line.end,
        candidate.line.side,
        wispbit_patch::DEFAULT_CONTEXT,
    );

    let additions = add_line_numbers_to_patch(&filter_diff(&hunk, DiffMode::Additions));
    let deletions = add_line_numbers_to_patch(&filter_diff(&hunk, DiffMode::Deletions));

    let prompt = build_validation_prompt(file, rule, candidate, &additions, &deletions);

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        tools: vec![report_validation_tool()],
        model: model.to_string(),
        tool_choice: Some(ToolChoice::Function("report_validation".into())),
        temperature: Some(VALIDATION_TEMPERATURE),
        max_tokens: Some(VALIDATION_MAX_TOKENS),
        response_format: None,
    };

    let completion = backend.complete(request).await?;
    let verdict = match completion.kind {
        CompletionKind::ToolCalls(calls) => {
            let call = calls
                .iter()
                .find(|c| c.function.name == "report_validation")
                .ok_or_else(|| {
                    WispbitError::Provider("validator called the wrong tool".into())
                })?;
            let args: VerdictArgs = serde_json::from_str(&call.function.arguments)
                .map_err(|e| WispbitError::Provider(format!("bad validation verdict: {e}")))?;
            Verdict {
                is_valid: args.is_valid,
                reasoning: args.reasoning,
                cost: completion.cost,
            }
        }
        _ => {
            return Err(WispbitError::Provider(
                "validator did not call report_validation".into(),
            ));
        }
    };

    tracing::debug!(
        file = %file.filename,
        rule = %rule.name,
        is_valid = verdict.is_valid,
        "validated candidate violation"
    );
    Ok(verdict)
}

fn build_validation_prompt(
    file: &FileChange,
    rule: &CodebaseRule,
    candidate: &CandidateViolation,
    additions: &str,
    deletions: &str,
) -> String {
    let side_note = match candidate.line.side {
        Side::Right => "right (added) lines",
        Side::Left => "left (removed) lines",
    };
    format!(
        "A code reviewer flagged a possible rule violation. Decide whether it is valid.\n\
         \n\
         <rule name=\"{rule_name}\">\n{rule_body}\n</rule>\n\
         \n\
         <violation lines=\"{start}-{end}\" side=\"{side}\">\n{description}\n</violation>\n\
         \n\
         File: {filename}\nStatus: {status}\nThe violation points at {side_note}.\n\
         \n\
         Lines ADDED by this change (R numbers):\n```\n{additions}\n```\n\
         \n\
         Lines REMOVED by this change (L numbers):\n```\n{deletions}\n```\n\
         \n\
         Judge by these criteria:\n\
         1. The flagged code actually violates the intent of the rule.\n\
         2. The violation makes sense for the file's status ({status}).\n\
         3. The reviewer's claim is concrete, not speculative.\n\
         4. If the rule needs other files you cannot see here, assume the reviewer \
            checked them and lean VALID.\n\
         5. The original reviewer's reasoning is plausible on its face.\n\
         \n\
         Call report_validation with your verdict.",
        rule_name = rule.name,
        rule_body = rule.contents,
        start = candidate.line.start,
        end = candidate.line.end,
        side = candidate.line.side,
        description = candidate.description,
        filename = file.filename,
        status = file.status,
        additions = if additions.is_empty() { "(none)" } else { additions },
        deletions = if deletions.is_empty() { "(none)" } else { deletions },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use wispbit_core::{FileStatus, LineReference};

    const PATCH: &str = "@@ -1,5 +1,6 @@\n line1\n-line2\n+new line\n line3\n line4\n line5";

    fn fixture() -> (FileChange, CodebaseRule, CandidateViolation) {
        let file = FileChange::new(
            "src/api.rs".into(),
            FileStatus::Modified,
            Some(PATCH.into()),
            1,
            1,
        );
        let rule = CodebaseRule::new(
            "no-new-line".into(),
            "New lines are suspicious.".into(),
            String::new(),
            vec![],
        );
        let candidate = CandidateViolation {
            description: "adds a suspicious line".into(),
            line: LineReference {
                start: 2,
                end: 2,
                side: Side::Right,
            },
            rule_id: rule.id.clone(),
        };
        (file, rule, candidate)
    }

    #[tokio::test]
    async fn accepts_valid_verdict() {
        let (file, rule, candidate) = fixture();
        let backend = ScriptedBackend::new().push_validation(true, "clearly violates");

        let verdict = validate_candidate(&backend, "m", &file, &rule, &candidate)
            .await
            .unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.reasoning, "clearly violates");
    }

    #[tokio::test]
    async fn request_forces_the_validation_tool() {
        let (file, rule, candidate) = fixture();
        let backend = ScriptedBackend::new().push_validation(false, "context only");

        validate_candidate(&backend, "m", &file, &rule, &candidate)
            .await
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(
            request.tool_choice,
            Some(ToolChoice::Function("report_validation".into()))
        );
        assert_eq!(request.max_tokens, Some(300));
        assert!((request.temperature.unwrap() - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn prompt_contains_both_projections() {
        let (file, rule, candidate) = fixture();
        let backend = ScriptedBackend::new().push_validation(true, "ok");

        validate_candidate(&backend, "m", &file, &rule, &candidate)
            .await
            .unwrap();

        let requests = backend.requests();
        let prompt = requests[0].messages[0].content.as_deref().unwrap();
        assert!(prompt.contains("Lines ADDED by this change"));
        assert!(prompt.contains("Lines REMOVED by this change"));
        assert!(prompt.contains("+new line"));
        assert!(prompt.contains("-line2"));
        assert!(prompt.contains("New lines are suspicious."));
        assert!(prompt.contains("adds a suspicious line"));
    }

    #[tokio::test]
    async fn plain_message_response_is_provider_error() {
        let (file, rule, candidate) = fixture();
        let backend = ScriptedBackend::new().push_message("I think it is fine");

        let result = validate_candidate(&backend, "m", &file, &rule, &candidate).await;
        assert!(matches!(result, Err(WispbitError::Provider(_))));
    }

    #[tokio::test]
    async fn left_side_candidate_notes_removed_lines() {
        let (file, rule, _) = fixture();
        let candidate = CandidateViolation {
            description: "removes a guard clause".into(),
            line: LineReference {
                start: 2,
                end: 2,
                side: Side::Left,
            },
            rule_id: rule.id.clone(),
        };
        let backend = ScriptedBackend::new().push_validation(true, "the deletion is visible");

        let verdict = validate_candidate(&backend, "m", &file, &rule, &candidate)
            .await
            .unwrap();
        assert!(verdict.is_valid);

        let requests = backend.requests();
        let prompt = requests[0].messages[0].content.as_deref().unwrap();
        assert!(prompt.contains("left (removed) lines"));
        assert!(prompt.contains("removes a guard clause"));
    }

    #[tokio::test]
    async fn validation_model_is_the_requested_one() {
        let (file, rule, candidate) = fixture();
        let backend = ScriptedBackend::new().push_validation(false, "no");

        validate_candidate(&backend, "tiny-model", &file, &rule, &candidate)
            .await
            .unwrap();
        assert_eq!(backend.requests()[0].model, "tiny-model");
    }
}
