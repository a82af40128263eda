use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use wispbit_core::{Result, WispbitError};

use crate::paths::workspace_relative;

/// Wall-clock budget for one ripgrep invocation.
const GREP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum matches returned to the model.
const MAX_MATCHES: usize = 50;

/// Arguments for the `grep_search` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct GrepArgs {
    /// Regex to search for.
    pub query: String,
    /// Glob restricting which files are searched.
    #[serde(default)]
    pub include_pattern: Option<String>,
    /// Glob excluding files from the search.
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    /// Match case-sensitively; defaults to insensitive.
    #[serde(default)]
    pub case_sensitive: Option<bool>,
}

/// One parsed ripgrep match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrepMatch {
    /// Workspace-relative file path.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Matched line content.
    pub content: String,
}

/// Run ripgrep over the workspace.
///
/// The child is spawned with an argv vector (never a shell), a sanitised
/// environment, and a 30-second kill timeout. Exit code 1 with empty
/// stderr means no matches; matches are parsed as `file:line:content`,
/// re-relativized to the workspace, and capped at 50.
///
/// # Errors
///
/// Returns [`WispbitError::ExternalTool`] when ripgrep is missing, exits
/// with an error, or times out.
pub async fn grep_search(root: &Path, args: &GrepArgs) -> Result<Vec<GrepMatch>> {
    let rg = which::which("rg").map_err(|_| {
        WispbitError::ExternalTool("ripgrep (rg) is not installed or not on PATH".into())
    })?;

    let mut command = Command::new(rg);
    command
        .arg("--no-config")
        .arg("--line-number")
        .arg("--color=never")
        .arg("--max-columns=300")
        .arg("--max-filesize=1M")
        .arg("--max-count=50");

    if args.case_sensitive != Some(true) {
        command.arg("-i");
    }
    if let Some(include) = &args.include_pattern {
        command.arg("-g").arg(include);
    }
    if let Some(exclude) = &args.exclude_pattern {
        command.arg("-g").arg(format!("!{exclude}"));
    }
    command.arg("--").arg(&args.query).arg(".");

    command
        .current_dir(root)
        .env_remove("RIPGREP_CONFIG_PATH")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(query = %args.query, "running grep_search");

    let child = command
        .spawn()
        .map_err(|e| WispbitError::ExternalTool(format!("failed to spawn ripgrep: {e}")))?;

    // Dropping the in-flight future on timeout kills the child.
    let output = match tokio::time::timeout(GREP_TIMEOUT, child.wait_with_output()).await {
        Ok(result) => {
            result.map_err(|e| WispbitError::ExternalTool(format!("ripgrep failed: {e}")))?
        }
        Err(_) => {
            return Err(WispbitError::ExternalTool(format!(
                "grep_search timed out after {}s",
                GREP_TIMEOUT.as_secs()
            )));
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    match output.status.code() {
        Some(0) => {}
        Some(1) if stderr.trim().is_empty() => return Ok(Vec::new()),
        _ => {
            let detail = if stderr.trim().is_empty() {
                "ripgrep returned an error".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(WispbitError::ExternalTool(detail));
        }
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_matches(root, &stdout))
}

fn parse_matches(root: &Path, stdout: &str) -> Vec<GrepMatch> {
    let mut matches = Vec::new();
    for line in stdout.lines() {
        if matches.len() >= MAX_MATCHES {
            break;
        }
        let Some((file, rest)) = line.split_once(':') else {
            continue;
        };
        let Some((number, content)) = rest.split_once(':') else {
            continue;
        };
        let Ok(number) = number.parse::<u32>() else {
            continue;
        };
        let file = file.strip_prefix("./").unwrap_or(file);
        matches.push(GrepMatch {
            file: workspace_relative(root, Path::new(file)),
            line: number,
            content: content.to_string(),
        });
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn have_rg() -> bool {
        which::which("rg").is_ok()
    }

    #[test]
    fn parses_file_line_content() {
        let root = Path::new("/w");
        let parsed = parse_matches(root, "./src/a.rs:12:    let x = 1;\nb.rs:3:fn main() {}");
        assert_eq!(
            parsed[0],
            GrepMatch {
                file: "src/a.rs".into(),
                line: 12,
                content: "    let x = 1;".into()
            }
        );
        assert_eq!(parsed[1].file, "b.rs");
        assert_eq!(parsed[1].line, 3);
    }

    #[test]
    fn content_with_colons_survives() {
        let parsed = parse_matches(Path::new("/w"), "a.rs:1:let url = \"http://x\";");
        assert_eq!(parsed[0].content, "let url = \"http://x\";");
    }

    #[test]
    fn caps_at_fifty_matches() {
        let stdout: String = (1..=80)
            .map(|i| format!("f.rs:{i}:line {i}\n"))
            .collect();
        let parsed = parse_matches(Path::new("/w"), &stdout);
        assert_eq!(parsed.len(), 50);
    }

    #[test]
    fn unparseable_lines_skipped() {
        let parsed = parse_matches(Path::new("/w"), "garbage\nf.rs:nan:content\nf.rs:2:ok");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].line, 2);
    }

    #[tokio::test]
    async fn finds_matches_in_real_tree() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("code.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();

        let args = GrepArgs {
            query: "alpha".into(),
            include_pattern: None,
            exclude_pattern: None,
            case_sensitive: None,
        };
        let matches = grep_search(tmp.path(), &args).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file, "code.rs");
        assert_eq!(matches[0].line, 1);
    }

    #[tokio::test]
    async fn no_matches_is_empty_not_error() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("code.rs"), "nothing here\n").unwrap();

        let args = GrepArgs {
            query: "zebra_pattern_absent".into(),
            include_pattern: None,
            exclude_pattern: None,
            case_sensitive: None,
        };
        let matches = grep_search(tmp.path(), &args).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn case_insensitive_by_default() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("code.rs"), "const ALPHA: u8 = 1;\n").unwrap();

        let args = GrepArgs {
            query: "alpha".into(),
            include_pattern: None,
            exclude_pattern: None,
            case_sensitive: None,
        };
        assert_eq!(grep_search(tmp.path(), &args).await.unwrap().len(), 1);

        let sensitive = GrepArgs {
            case_sensitive: Some(true),
            ..args
        };
        assert!(grep_search(tmp.path(), &sensitive).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn include_pattern_limits_files() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.rs"), "needle\n").unwrap();
        fs::write(tmp.path().join("b.py"), "needle\n").unwrap();

        let args = GrepArgs {
            query: "needle".into(),
            include_pattern: Some("*.rs".into()),
            exclude_pattern: None,
            case_sensitive: None,
        };
        let matches = grep_search(tmp.path(), &args).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file, "a.rs");
    }

    #[tokio::test]
    async fn exclude_pattern_removes_files() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.rs"), "needle\n").unwrap();
        fs::write(tmp.path().join("a_test.rs"), "needle\n").unwrap();

        let args = GrepArgs {
            query: "needle".into(),
            include_pattern: None,
            exclude_pattern: Some("*_test.rs".into()),
            case_sensitive: None,
        };
        let matches = grep_search(tmp.path(), &args).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file, "a.rs");
    }

    #[tokio::test]
    async fn dash_leading_query_is_not_a_flag() {
        if !have_rg() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.rs"), "x --version y\n").unwrap();

        let args = GrepArgs {
            query: "--version".into(),
            include_pattern: None,
            exclude_pattern: None,
            case_sensitive: None,
        };
        let matches = grep_search(tmp.path(), &args).await.unwrap();
        assert_eq!(matches.len(), 1);
    }
}
