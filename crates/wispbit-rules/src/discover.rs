use std::path::{Path, PathBuf};

use wispbit_core::{CodebaseRule, Result, WispbitError};

use crate::frontmatter::parse_rule_markdown;

/// Directory names never descended into during rule discovery.
const DEPENDENCY_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    "venv",
];

/// Discover every rule under the workspace root.
///
/// Walks the tree looking for `.wispbit/rules` directories, pruning hidden
/// directories (other than `.wispbit` itself) and dependency directories.
/// Each rule's `directory` scope is the workspace-relative path of the
/// directory containing `.wispbit` — empty for the root. Results are
/// sorted by (directory, name) so discovery order is stable.
///
/// # Errors
///
/// Returns [`WispbitError::Io`] only if the root itself cannot be walked;
/// unreadable individual rule files are skipped.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use wispbit_rules::discover_rules;
///
/// let rules = discover_rules(Path::new(".")).unwrap();
/// for rule in &rules {
///     println!("{} ({})", rule.name, rule.directory);
/// }
/// ```
pub fn discover_rules(root: &Path) -> Result<Vec<CodebaseRule>> {
    if !root.is_dir() {
        return Err(WispbitError::NotFound(root.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Some(name) = entry.file_name().to_str() else {
                return false;
            };
            if entry.file_type().is_some_and(|t| t.is_dir()) {
                if name == ".wispbit" {
                    return true;
                }
                if name.starts_with('.') {
                    return false;
                }
                if DEPENDENCY_DIRS.contains(&name) {
                    return false;
                }
            }
            true
        })
        .build();

    let mut rules = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) != Some("rules") {
            continue;
        }
        let Some(wispbit_dir) = path.parent() else {
            continue;
        };
        if wispbit_dir.file_name().and_then(|n| n.to_str()) != Some(".wispbit") {
            continue;
        }

        let scope_dir = wispbit_dir.parent().unwrap_or(root);
        let directory = relative_directory(root, scope_dir);
        rules.extend(load_rules_dir(path, &directory));
    }

    rules.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));
    Ok(rules)
}

/// Load every `.md` file in one rules directory (non-recursive).
fn load_rules_dir(dir: &Path, directory: &str) -> Vec<CodebaseRule> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), %err, "cannot read rules directory");
            return Vec::new();
        }
    };

    let mut rules = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        match load_rule_file(&path, directory) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                tracing::warn!(file = %path.display(), %err, "skipping unreadable rule file");
            }
        }
    }
    rules
}

/// Load a single rule markdown file with the given directory scope.
///
/// # Errors
///
/// Returns [`WispbitError::Io`] if the file cannot be read.
pub fn load_rule_file(path: &Path, directory: &str) -> Result<CodebaseRule> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let parsed = parse_rule_markdown(&content);
    Ok(CodebaseRule::new(
        name,
        parsed.body,
        directory.to_string(),
        parsed.include,
    ))
}

fn relative_directory(root: &Path, dir: &Path) -> String {
    let relative: PathBuf = match dir.strip_prefix(root) {
        Ok(r) => r.to_path_buf(),
        Err(_) => dir.to_path_buf(),
    };
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_rule(root: &Path, scope: &str, name: &str, content: &str) {
        let dir = if scope.is_empty() {
            root.join(".wispbit/rules")
        } else {
            root.join(scope).join(".wispbit/rules")
        };
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.md")), content).unwrap();
    }

    #[test]
    fn discovers_root_rules() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(
            tmp.path(),
            "",
            "no-todo",
            "---\ninclude: **/*.rs\n---\nNo TODO comments.",
        );

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "no-todo");
        assert_eq!(rules[0].directory, "");
        assert_eq!(rules[0].include, vec!["**/*.rs"]);
        assert_eq!(rules[0].contents, "No TODO comments.");
    }

    #[test]
    fn discovers_nested_rules_with_scope() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), "packages/api", "auth", "Check auth.");

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].directory, "packages/api");
    }

    #[test]
    fn hidden_directories_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), ".hidden/sub", "ghost", "Should not be found.");

        let rules = discover_rules(tmp.path()).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn dependency_directories_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), "node_modules/pkg", "dep", "Should not be found.");
        write_rule(tmp.path(), "src", "real", "Found.");

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "real");
    }

    #[test]
    fn non_markdown_files_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".wispbit/rules");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("rule.md"), "A rule.").unwrap();
        fs::write(dir.join("notes.txt"), "Not a rule.").unwrap();

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "rule");
    }

    #[test]
    fn results_sorted_by_directory_then_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), "zeta", "a-rule", "z");
        write_rule(tmp.path(), "", "b-rule", "r");
        write_rule(tmp.path(), "", "a-rule", "r");

        let rules = discover_rules(tmp.path()).unwrap();
        let keys: Vec<(&str, &str)> = rules
            .iter()
            .map(|r| (r.directory.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(keys, vec![("", "a-rule"), ("", "b-rule"), ("zeta", "a-rule")]);
    }

    #[test]
    fn missing_root_errors() {
        let result = discover_rules(Path::new("/nonexistent/wispbit/root"));
        assert!(result.is_err());
    }

    #[test]
    fn multiple_rules_directories_coexist() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), "", "global", "Applies everywhere.");
        write_rule(tmp.path(), "services/api", "api-only", "API rules.");
        write_rule(tmp.path(), "services/web", "web-only", "Web rules.");

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules.len(), 3);
        let scopes: Vec<&str> = rules.iter().map(|r| r.directory.as_str()).collect();
        assert_eq!(scopes, vec!["", "services/api", "services/web"]);
    }

    #[test]
    fn rule_ids_are_stable_across_discoveries() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(tmp.path(), "src", "naming", "Name things well.");

        let first = discover_rules(tmp.path()).unwrap();
        let second = discover_rules(tmp.path()).unwrap();
        assert_eq!(first[0].id, second[0].id);

        // The id depends on directory + name, not on the body.
        fs::write(
            tmp.path().join("src/.wispbit/rules/naming.md"),
            "Completely new body.",
        )
        .unwrap();
        let third = discover_rules(tmp.path()).unwrap();
        assert_eq!(first[0].id, third[0].id);
    }

    #[test]
    fn frontmatter_include_flows_into_discovered_rule() {
        let tmp = tempfile::tempdir().unwrap();
        write_rule(
            tmp.path(),
            "",
            "scoped",
            "---\ninclude: **/*.go, !**/*_test.go\n---\nGo conventions.",
        );

        let rules = discover_rules(tmp.path()).unwrap();
        assert_eq!(rules[0].include, vec!["**/*.go", "!**/*_test.go"]);
        assert_eq!(rules[0].contents, "Go conventions.");
    }

    #[test]
    fn rules_not_loaded_from_unrelated_rules_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("config/rules");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("style.md"), "Not a wispbit rule.").unwrap();

        let rules = discover_rules(tmp.path()).unwrap();
        assert!(rules.is_empty());
    }
}
