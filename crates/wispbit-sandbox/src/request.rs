use serde::Deserialize;

use wispbit_core::{Result, WispbitError};

use crate::grep::GrepArgs;

/// Arguments for the `read_file` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadFileArgs {
    /// Workspace-relative path of the file to read.
    pub target_file: String,
    /// When `true`, return the entire file and ignore the range.
    #[serde(default)]
    pub should_read_entire_file: bool,
    /// First line to read (1-based).
    #[serde(default)]
    pub start_line_one_indexed: Option<u32>,
    /// Last line to read, inclusive.
    #[serde(default)]
    pub end_line_one_indexed_inclusive: Option<u32>,
}

/// Arguments for the `list_dir` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ListDirArgs {
    /// Workspace-relative path of the directory to list.
    pub relative_workspace_path: String,
    /// Free-text reason from the model; unused by the executor.
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Arguments for the `glob_search` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobSearchArgs {
    /// Glob pattern matched against workspace-relative paths.
    pub pattern: String,
    /// Directory to search under (defaults to the workspace root).
    #[serde(default)]
    pub path: Option<String>,
}

/// Arguments for the `complaint` tool.
///
/// Line numbers are kept as raw JSON so the executor can tell the model
/// exactly what was wrong with a non-integer value instead of failing the
/// whole call at deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ComplaintArgs {
    /// File the violation applies to; must be the file under review.
    pub file_path: String,
    /// First line of the violating range.
    #[serde(default)]
    pub line_start: Option<serde_json::Value>,
    /// Last line of the violating range, inclusive.
    #[serde(default)]
    pub line_end: Option<serde_json::Value>,
    /// `"left"` or `"right"`.
    pub line_side: String,
    /// What the violation is.
    pub description: String,
    /// Identifier of the rule being violated.
    pub rule_id: String,
}

/// One parsed tool call, dispatched by name.
///
/// # Examples
///
/// ```
/// use wispbit_sandbox::ToolRequest;
///
/// let req = ToolRequest::parse("list_dir", r#"{"relative_workspace_path": "src"}"#).unwrap();
/// assert_eq!(req.name(), "list_dir");
///
/// assert!(ToolRequest::parse("rm_rf", "{}").is_err());
/// ```
#[derive(Debug, Clone)]
pub enum ToolRequest {
    /// Read a file or a line range of it.
    ReadFile(ReadFileArgs),
    /// List a directory.
    ListDir(ListDirArgs),
    /// Regex search through the workspace via ripgrep.
    GrepSearch(GrepArgs),
    /// Find files by glob pattern.
    GlobSearch(GlobSearchArgs),
    /// Submit a candidate violation.
    Complaint(ComplaintArgs),
}

impl ToolRequest {
    /// Parse a tool call from its wire name and JSON argument string.
    ///
    /// # Errors
    ///
    /// Returns [`WispbitError::Input`] for unknown tool names or arguments
    /// that do not deserialize; the message is written for the model to
    /// read and correct.
    pub fn parse(name: &str, arguments: &str) -> Result<Self> {
        let invalid = |e: serde_json::Error| {
            WispbitError::Input(format!("invalid arguments for {name}: {e}"))
        };
        match name {
            "read_file" => Ok(Self::ReadFile(
                serde_json::from_str(arguments).map_err(invalid)?,
            )),
            "list_dir" => Ok(Self::ListDir(
                serde_json::from_str(arguments).map_err(invalid)?,
            )),
            "grep_search" => Ok(Self::GrepSearch(
                serde_json::from_str(arguments).map_err(invalid)?,
            )),
            "glob_search" => Ok(Self::GlobSearch(
                serde_json::from_str(arguments).map_err(invalid)?,
            )),
            "complaint" => Ok(Self::Complaint(
                serde_json::from_str(arguments).map_err(invalid)?,
            )),
            other => Err(WispbitError::Input(format!("unknown tool: {other}"))),
        }
    }

    /// The wire name of this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile(_) => "read_file",
            Self::ListDir(_) => "list_dir",
            Self::GrepSearch(_) => "grep_search",
            Self::GlobSearch(_) => "glob_search",
            Self::Complaint(_) => "complaint",
        }
    }
}
