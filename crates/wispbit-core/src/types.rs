use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the lowercase hex sha256 digest of a string.
///
/// Used for patch SHAs, rule identifiers, and cache freshness tokens.
///
/// # Examples
///
/// ```
/// use wispbit_core::sha256_hex;
///
/// let digest = sha256_hex("hello");
/// assert_eq!(digest.len(), 64);
/// assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Status of a changed file, matching the change classes a source-control
/// diff can report.
///
/// # Examples
///
/// ```
/// use wispbit_core::FileStatus;
///
/// let s: FileStatus = serde_json::from_str("\"modified\"").unwrap();
/// assert_eq!(s, FileStatus::Modified);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// New file.
    Added,
    /// File deleted.
    Removed,
    /// Existing file modified in place.
    Modified,
    /// File renamed from another path.
    Renamed,
    /// File copied from another path.
    Copied,
    /// Type or mode change.
    Changed,
    /// Present in the diff but textually unchanged.
    Unchanged,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Added => "added",
            FileStatus::Removed => "removed",
            FileStatus::Modified => "modified",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "added" => Ok(FileStatus::Added),
            "removed" => Ok(FileStatus::Removed),
            "modified" => Ok(FileStatus::Modified),
            "renamed" => Ok(FileStatus::Renamed),
            "copied" => Ok(FileStatus::Copied),
            "changed" => Ok(FileStatus::Changed),
            "unchanged" => Ok(FileStatus::Unchanged),
            other => Err(format!("unknown file status: {other}")),
        }
    }
}

/// One changed file in a review request.
///
/// Immutable after creation. The `sha` is a digest of the patch text, not of
/// the file content, so two identical edits to different base versions hash
/// the same way.
///
/// # Examples
///
/// ```
/// use wispbit_core::{FileChange, FileStatus};
///
/// let change = FileChange::new(
///     "src/auth.rs".into(),
///     FileStatus::Modified,
///     Some("@@ -1 +1 @@\n-old\n+new".into()),
///     1,
///     1,
/// );
/// assert_eq!(change.filename, "src/auth.rs");
/// assert_eq!(change.sha.len(), 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Workspace-relative path of the file.
    pub filename: String,
    /// Change classification.
    pub status: FileStatus,
    /// Unified diff for this file, when one exists.
    pub patch: Option<String>,
    /// Lines added.
    pub additions: u32,
    /// Lines deleted.
    pub deletions: u32,
    /// sha256 of the patch text (empty patch hashes the empty string).
    pub sha: String,
}

impl FileChange {
    /// Create a file change, deriving the content SHA from the patch text.
    pub fn new(
        filename: String,
        status: FileStatus,
        patch: Option<String>,
        additions: u32,
        deletions: u32,
    ) -> Self {
        let sha = sha256_hex(patch.as_deref().unwrap_or(""));
        Self {
            filename,
            status,
            patch,
            additions,
            deletions,
            sha,
        }
    }
}

/// Which side of a diff a line number refers to.
///
/// `Left` is pre-change (old) numbering, `Right` is post-change (new)
/// numbering.
///
/// # Examples
///
/// ```
/// use wispbit_core::Side;
///
/// assert_eq!(serde_json::to_string(&Side::Right).unwrap(), "\"right\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Pre-change (old) line numbers.
    Left,
    /// Post-change (new) line numbers.
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// An inclusive line range on one side of a diff.
///
/// Well-formed references satisfy `1 <= start <= end`; validation against a
/// concrete patch lives in `wispbit-patch`.
///
/// # Examples
///
/// ```
/// use wispbit_core::{LineReference, Side};
///
/// let r = LineReference { start: 3, end: 5, side: Side::Right };
/// assert!(r.is_well_formed());
/// let bad = LineReference { start: 5, end: 3, side: Side::Left };
/// assert!(!bad.is_well_formed());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReference {
    /// First line of the range (1-based).
    pub start: u32,
    /// Last line of the range, inclusive.
    pub end: u32,
    /// Which side the numbers refer to.
    pub side: Side,
}

impl LineReference {
    /// `true` iff `1 <= start <= end`.
    pub fn is_well_formed(&self) -> bool {
        self.start >= 1 && self.start <= self.end
    }
}

impl fmt::Display for LineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}:{}", self.side, self.start)
        } else {
            write!(f, "{}:{}-{}", self.side, self.start, self.end)
        }
    }
}

/// The five glyphs stripped from rule bodies.
const STRIPPED_GLYPHS: [char; 5] = ['\u{2705}', '\u{274C}', '\u{2713}', '\u{2717}', '\u{274E}'];

/// A user-authored review rule loaded from markdown.
///
/// The identifier is a digest of the rule's directory scope and name, so two
/// rules collide exactly when both collide. The body is normalised at
/// construction: a leading H1–H3 heading line is dropped and checkmark/X
/// glyphs are removed.
///
/// # Examples
///
/// ```
/// use wispbit_core::CodebaseRule;
///
/// let rule = CodebaseRule::new(
///     "no-println".into(),
///     "# No println\n\nUse tracing instead of println!.".into(),
///     "src".into(),
///     vec!["**/*.rs".into()],
/// );
/// assert_eq!(rule.name, "no-println");
/// assert!(rule.contents.starts_with("Use tracing"));
/// assert_eq!(rule.id.len(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodebaseRule {
    /// Stable identifier derived from directory + name.
    pub id: String,
    /// Display name (the rule file's stem).
    pub name: String,
    /// Normalised markdown body.
    pub contents: String,
    /// Workspace-relative directory scope; empty for workspace-wide rules.
    pub directory: String,
    /// Include patterns in declaration order; a leading `!` marks exclusion.
    pub include: Vec<String>,
}

impl CodebaseRule {
    /// Construct a rule, normalising the body and deriving the identifier.
    pub fn new(name: String, contents: String, directory: String, include: Vec<String>) -> Self {
        let id = sha256_hex(&format!("{directory}/{name}"))[..16].to_string();
        let contents = normalize_rule_body(&contents);
        Self {
            id,
            name,
            contents,
            directory,
            include,
        }
    }
}

/// Strip a leading H1–H3 heading (after any blank lines) and the checkmark/X
/// glyphs from a rule body.
fn normalize_rule_body(raw: &str) -> String {
    let mut lines = raw.lines().peekable();
    let mut kept: Vec<&str> = Vec::new();

    // Skip leading blank lines, then at most one recognised heading line.
    while matches!(lines.peek(), Some(l) if l.trim().is_empty()) {
        lines.next();
    }
    if let Some(first) = lines.peek() {
        let hashes = first.chars().take_while(|c| *c == '#').count();
        if (1..=3).contains(&hashes) {
            lines.next();
        }
    }
    for line in lines {
        kept.push(line);
    }

    let joined = kept.join("\n");
    let stripped: String = joined
        .chars()
        .filter(|c| !STRIPPED_GLYPHS.contains(c))
        .collect();
    stripped.trim().to_string()
}

/// A confirmed rule violation pinned to a diff line range.
///
/// Violations are created only by the `complaint` tool and only survive if
/// the validator pass accepts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// What the violation is, in the reviewer's words.
    pub description: String,
    /// Where in the diff it applies.
    pub line: LineReference,
    /// The rule that was violated.
    pub rule: CodebaseRule,
    /// Reasoning from the validation pass, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_reasoning: Option<String>,
    /// `true` when the violation was served from the review cache.
    #[serde(default)]
    pub is_cached: bool,
}

/// A candidate violation the validator rejected, kept for reporting.
///
/// # Examples
///
/// ```
/// use wispbit_core::{LineReference, RejectedViolation, Side};
///
/// let r = RejectedViolation {
///     description: "speculative".into(),
///     line: LineReference { start: 1, end: 1, side: Side::Right },
///     rule_id: "abc123".into(),
///     reasoning: "not visible in the diff".into(),
/// };
/// assert!(r.reasoning.contains("diff"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedViolation {
    /// The candidate's description.
    pub description: String,
    /// The candidate's line reference.
    pub line: LineReference,
    /// Identifier of the rule the candidate cited.
    pub rule_id: String,
    /// Why the validator rejected it.
    pub reasoning: String,
}

/// The outcome of reviewing one file.
///
/// `visited_files` excludes the file under review, is sorted, and is
/// de-duplicated; it is the set recorded for cache invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    /// Violations that survived validation.
    pub violations: Vec<Violation>,
    /// The reviewer's closing message, or a canonical skip token.
    pub explanation: String,
    /// Rules that applied to this file.
    pub rules: Vec<CodebaseRule>,
    /// Other files read during the review, sorted and de-duplicated.
    pub visited_files: Vec<String>,
    /// Candidates the validator rejected.
    #[serde(default)]
    pub rejected_violations: Vec<RejectedViolation>,
    /// Total LLM spend for this file in dollars.
    pub cost: f64,
}

impl FileAnalysis {
    /// An analysis with no violations and a canonical explanation token.
    pub fn empty(explanation: &str, rules: Vec<CodebaseRule>) -> Self {
        Self {
            violations: Vec::new(),
            explanation: explanation.to_string(),
            rules,
            visited_files: Vec::new(),
            rejected_violations: Vec::new(),
            cost: 0.0,
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument
/// parsing.
///
/// # Examples
///
/// ```
/// use wispbit_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable report.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
