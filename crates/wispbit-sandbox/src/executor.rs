use std::path::PathBuf;

use serde_json::json;

use wispbit_core::{
    CodebaseRule, FileChange, LineReference, Result, Side, WispbitError,
};
use wispbit_patch::is_line_reference_valid_for_patch;

use crate::glob::glob_search;
use crate::grep::grep_search;
use crate::paths::{resolve_workspace_path, workspace_relative};
use crate::request::{ComplaintArgs, ListDirArgs, ReadFileArgs, ToolRequest};

/// A violation candidate accepted by the `complaint` tool, awaiting
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateViolation {
    /// The model's description of the violation.
    pub description: String,
    /// The diff range it applies to, already validated against the patch.
    pub line: LineReference,
    /// Identifier of the cited rule.
    pub rule_id: String,
}

/// What one tool call produced.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// Text returned to the model as the tool result.
    pub content: String,
    /// Workspace-relative path recorded for cache freshness, set by
    /// successful `read_file` calls.
    pub visited_file: Option<String>,
    /// Candidate violation, set by accepted `complaint` calls.
    pub violation: Option<CandidateViolation>,
}

impl ToolOutcome {
    fn text(content: String) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }
}

/// Executes tool calls for one file's review, confined to the workspace.
///
/// The executor is read-only with respect to the filesystem. It carries
/// the file under review and its applicable rules so `complaint` calls can
/// be checked at the boundary.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use wispbit_core::{FileChange, FileStatus};
/// use wispbit_sandbox::{ToolExecutor, ToolRequest};
///
/// # async fn demo() {
/// let file = FileChange::new("src/a.rs".into(), FileStatus::Modified, None, 0, 0);
/// let executor = ToolExecutor::new(PathBuf::from("/repo"), file, vec![]);
/// let request = ToolRequest::parse("list_dir", r#"{"relative_workspace_path": "."}"#).unwrap();
/// let outcome = executor.execute(&request).await.unwrap();
/// println!("{}", outcome.content);
/// # }
/// ```
pub struct ToolExecutor {
    root: PathBuf,
    file: FileChange,
    rules: Vec<CodebaseRule>,
}

impl ToolExecutor {
    /// Create an executor for one file's review.
    pub fn new(root: PathBuf, file: FileChange, rules: Vec<CodebaseRule>) -> Self {
        Self { root, file, rules }
    }

    /// The file under review.
    pub fn file(&self) -> &FileChange {
        &self.file
    }

    /// Execute one tool call.
    ///
    /// # Errors
    ///
    /// Input-class errors (bad arguments, escaping paths, rejected
    /// complaints) and not-found errors are meant to be surfaced to the
    /// model as tool-result content; see
    /// [`WispbitError::is_tool_recoverable`].
    pub async fn execute(&self, request: &ToolRequest) -> Result<ToolOutcome> {
        match request {
            ToolRequest::ReadFile(args) => self.read_file(args).await,
            ToolRequest::ListDir(args) => self.list_dir(args),
            ToolRequest::GrepSearch(args) => {
                let matches = grep_search(&self.root, args).await?;
                let content = if matches.is_empty() {
                    "No matches found".to_string()
                } else {
                    matches
                        .iter()
                        .map(|m| format!("{}:{}:{}", m.file, m.line, m.content))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                Ok(ToolOutcome::text(content))
            }
            ToolRequest::GlobSearch(args) => {
                let files = glob_search(&self.root, args).await?;
                let content = if files.is_empty() {
                    "No files matched the pattern".to_string()
                } else {
                    files.join("\n")
                };
                Ok(ToolOutcome::text(content))
            }
            ToolRequest::Complaint(args) => self.complaint(args),
        }
    }

    async fn read_file(&self, args: &ReadFileArgs) -> Result<ToolOutcome> {
        let resolved = resolve_workspace_path(&self.root, &args.target_file)?;
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|_| WispbitError::NotFound(PathBuf::from(&args.target_file)))?;

        let visited = Some(workspace_relative(&self.root, &resolved));

        if args.should_read_entire_file {
            return Ok(ToolOutcome {
                content,
                visited_file: visited,
                violation: None,
            });
        }

        let start = args.start_line_one_indexed.ok_or_else(|| {
            WispbitError::Input("start_line_one_indexed is required unless reading the entire file".into())
        })?;
        let end = args.end_line_one_indexed_inclusive.ok_or_else(|| {
            WispbitError::Input(
                "end_line_one_indexed_inclusive is required unless reading the entire file".into(),
            )
        })?;
        if start < 1 || start > end {
            return Err(WispbitError::Input(format!(
                "invalid line range {start}-{end}: must satisfy 1 <= start <= end"
            )));
        }

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        if start as usize > total {
            return Err(WispbitError::Input(format!(
                "start line {start} is past the end of {} ({total} lines)",
                args.target_file
            )));
        }
        let end = (end as usize).min(total);
        let start = start as usize;

        let mut out: Vec<String> = Vec::new();
        if start > 1 {
            out.push(format!("[Lines 1-{} omitted]", start - 1));
        }
        for line in &lines[start - 1..end] {
            out.push((*line).to_string());
        }
        if end < total {
            out.push(format!("[Lines {}-{} omitted]", end + 1, total));
        }

        Ok(ToolOutcome {
            content: out.join("\n"),
            visited_file: visited,
            violation: None,
        })
    }

    fn list_dir(&self, args: &ListDirArgs) -> Result<ToolOutcome> {
        let resolved = resolve_workspace_path(&self.root, &args.relative_workspace_path)?;
        if !resolved.exists() {
            return Err(WispbitError::NotFound(PathBuf::from(
                &args.relative_workspace_path,
            )));
        }
        if !resolved.is_dir() {
            return Err(WispbitError::Input(format!(
                "{} is not a directory",
                args.relative_workspace_path
            )));
        }

        let mut files: Vec<String> = Vec::new();
        let mut directories: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&resolved)?.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match entry.file_type() {
                Ok(t) if t.is_dir() => directories.push(name),
                Ok(_) => files.push(name),
                Err(_) => continue,
            }
        }
        files.sort();
        directories.sort();

        let body = json!({
            "files": files,
            "directories": directories,
            "path": workspace_relative(&self.root, &resolved),
        });
        Ok(ToolOutcome::text(body.to_string()))
    }

    fn complaint(&self, args: &ComplaintArgs) -> Result<ToolOutcome> {
        let target = args.file_path.strip_prefix("./").unwrap_or(&args.file_path);
        if target != self.file.filename {
            return Err(WispbitError::Input(format!(
                "complaint must target the file under review ({}); got {}",
                self.file.filename, args.file_path
            )));
        }

        if !self.rules.iter().any(|r| r.id == args.rule_id) {
            let known: Vec<&str> = self.rules.iter().map(|r| r.id.as_str()).collect();
            return Err(WispbitError::Input(format!(
                "unknown rule id {}; rule ids for this file: [{}]",
                args.rule_id,
                known.join(", ")
            )));
        }

        let start = integer_line(&args.line_start, "line_start")?;
        let end = integer_line(&args.line_end, "line_end")?;
        let side: Side = args
            .line_side
            .parse()
            .map_err(|e: String| WispbitError::Input(e))?;

        let line = LineReference { start, end, side };
        if !line.is_well_formed() {
            return Err(WispbitError::Input(format!(
                "line numbers must satisfy 1 <= start <= end; got {start}-{end}"
            )));
        }

        let patch = self.file.patch.as_deref().unwrap_or("");
        if !is_line_reference_valid_for_patch(&line, patch) {
            return Err(WispbitError::Input(format!(
                "line reference {line} does not point at changed lines in the diff of {}; \
                 it must fall inside one hunk and overlap at least one {} line",
                self.file.filename,
                match side {
                    Side::Right => "added",
                    Side::Left => "removed",
                },
            )));
        }

        let normalized = json!({
            "file_path": self.file.filename,
            "line_start": start,
            "line_end": end,
            "line_side": side.to_string(),
            "description": args.description,
            "rule_id": args.rule_id,
        });

        Ok(ToolOutcome {
            content: normalized.to_string(),
            visited_file: None,
            violation: Some(CandidateViolation {
                description: args.description.clone(),
                line,
                rule_id: args.rule_id.clone(),
            }),
        })
    }
}

fn integer_line(value: &Option<serde_json::Value>, name: &str) -> Result<u32> {
    let Some(value) = value else {
        return Err(WispbitError::Input(format!("{name} is required")));
    };
    let Some(n) = value.as_u64() else {
        return Err(WispbitError::Input(format!(
            "{name} must be a positive integer; got {value}"
        )));
    };
    u32::try_from(n).map_err(|_| WispbitError::Input(format!("{name} {n} is out of range")))
}
