use std::path::Path;
use std::time::SystemTime;

use globset::GlobBuilder;

use wispbit_core::{Result, WispbitError};

use crate::paths::{resolve_workspace_path, workspace_relative};
use crate::request::GlobSearchArgs;

/// Directories skipped during glob walks.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".cache", "__pycache__"];

/// Find files matching a glob pattern, newest first.
///
/// The optional search path goes through the same workspace confinement as
/// every other tool path. `node_modules`, `.git`, and cache directories
/// are skipped. Results are workspace-relative and sorted by modification
/// time, most recently modified first.
///
/// # Errors
///
/// Returns [`WispbitError::Input`] for an escaping path or an unparseable
/// pattern, [`WispbitError::NotFound`] when the search path does not
/// exist.
pub async fn glob_search(root: &Path, args: &GlobSearchArgs) -> Result<Vec<String>> {
    let base = match &args.path {
        Some(p) => resolve_workspace_path(root, p)?,
        None => root.to_path_buf(),
    };
    if !base.exists() {
        return Err(WispbitError::NotFound(
            args.path.clone().unwrap_or_default().into(),
        ));
    }

    let glob = GlobBuilder::new(&args.pattern)
        .literal_separator(false)
        .build()
        .map_err(|e| WispbitError::Input(format!("invalid glob pattern: {e}")))?;
    let matcher = glob.compile_matcher();

    let root = root.to_path_buf();
    let pattern = args.pattern.clone();
    let matches = tokio::task::spawn_blocking(move || {
        let walker = ignore::WalkBuilder::new(&base)
            .standard_filters(false)
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(name) = entry.file_name().to_str() else {
                    return false;
                };
                !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&name))
            })
            .build();

        let mut found: Vec<(String, SystemTime)> = Vec::new();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let relative_to_base = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or(entry.path());
            if !matcher.is_match(relative_to_base) {
                continue;
            }
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((workspace_relative(&root, entry.path()), mtime));
        }

        found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        found.into_iter().map(|(path, _)| path).collect::<Vec<_>>()
    })
    .await
    .map_err(|e| WispbitError::ExternalTool(format!("glob walk for {pattern} failed: {e}")))?;

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(pattern: &str, path: Option<&str>) -> GlobSearchArgs {
        GlobSearchArgs {
            pattern: pattern.into(),
            path: path.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn matches_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/a.rs"), "a").unwrap();
        fs::write(tmp.path().join("src/b.py"), "b").unwrap();

        let found = glob_search(tmp.path(), &args("**/*.rs", None)).await.unwrap();
        assert_eq!(found, vec!["src/a.rs"]);
    }

    #[tokio::test]
    async fn search_path_scopes_the_walk() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();
        fs::write(tmp.path().join("a/x.ts"), "x").unwrap();
        fs::write(tmp.path().join("b/y.ts"), "y").unwrap();

        let found = glob_search(tmp.path(), &args("*.ts", Some("a"))).await.unwrap();
        assert_eq!(found, vec!["a/x.ts"]);
    }

    #[tokio::test]
    async fn node_modules_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        fs::write(tmp.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(tmp.path().join("app.js"), "y").unwrap();

        let found = glob_search(tmp.path(), &args("**/*.js", None)).await.unwrap();
        assert_eq!(found, vec!["app.js"]);
    }

    #[tokio::test]
    async fn escaping_path_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = glob_search(tmp.path(), &args("*", Some("../outside"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let result = glob_search(tmp.path(), &args("*", Some("nope"))).await;
        assert!(matches!(result, Err(WispbitError::NotFound(_))));
    }

    #[tokio::test]
    async fn newest_first_ordering() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("old.log"), "o").unwrap();
        fs::write(tmp.path().join("new.log"), "n").unwrap();

        // Make the ordering unambiguous regardless of filesystem timestamp
        // granularity.
        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        let file = fs::File::options()
            .write(true)
            .open(tmp.path().join("old.log"))
            .unwrap();
        file.set_modified(old_time).unwrap();

        let found = glob_search(tmp.path(), &args("*.log", None)).await.unwrap();
        assert_eq!(found, vec!["new.log", "old.log"]);
    }
}
