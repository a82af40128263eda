use globset::GlobBuilder;
use wispbit_core::CodebaseRule;

/// Decide whether a rule applies to a workspace-relative file path.
///
/// Patterns are glob-matched case-insensitively with `**`, brace
/// expansion, and dotfile matching; a pattern without `**` still crosses
/// directory separators with a bare `*`. Patterns on a directory-scoped
/// rule are anchored under that directory first. A rule whose patterns are
/// all exclusions matches every file the exclusions do not hit.
///
/// # Examples
///
/// ```
/// use wispbit_core::CodebaseRule;
/// use wispbit_rules::matches_include;
///
/// let rule = CodebaseRule::new(
///     "style".into(),
///     "body".into(),
///     "src".into(),
///     vec!["**/*.js".into(), "!**/*.test.js".into()],
/// );
/// assert!(matches_include(&rule, "src/a/b.js"));
/// assert!(!matches_include(&rule, "src/a/b.test.js"));
/// assert!(!matches_include(&rule, "lib/a.js"));
/// ```
pub fn matches_include(rule: &CodebaseRule, filepath: &str) -> bool {
    let scoped: Vec<String> = rule
        .include
        .iter()
        .map(|p| scope_pattern(p, &rule.directory))
        .collect();

    let mut positive: Vec<&str> = Vec::new();
    let mut negative: Vec<&str> = Vec::new();
    for pattern in &scoped {
        match pattern.strip_prefix('!') {
            Some(rest) => negative.push(rest),
            None => positive.push(pattern),
        }
    }

    let included = if positive.is_empty() {
        true
    } else {
        positive.iter().any(|p| glob_matches(p, filepath))
    };
    if !included {
        return false;
    }

    !negative.iter().any(|p| glob_matches(p, filepath))
}

/// Filter a rule set down to the rules applying to one file.
///
/// # Examples
///
/// ```
/// use wispbit_core::CodebaseRule;
/// use wispbit_rules::rules_for_file;
///
/// let rules = vec![
///     CodebaseRule::new("rust".into(), "b".into(), String::new(), vec!["*.rs".into()]),
///     CodebaseRule::new("go".into(), "b".into(), String::new(), vec!["*.go".into()]),
/// ];
/// let matched = rules_for_file(&rules, "src/main.rs");
/// assert_eq!(matched.len(), 1);
/// assert_eq!(matched[0].name, "rust");
/// ```
pub fn rules_for_file<'a>(rules: &'a [CodebaseRule], filepath: &str) -> Vec<&'a CodebaseRule> {
    rules
        .iter()
        .filter(|r| matches_include(r, filepath))
        .collect()
}

/// Anchor a pattern under the rule's directory scope.
///
/// Exclusions keep their `!` marker. Patterns that are already absolute or
/// already anchored under the directory pass through unchanged.
fn scope_pattern(pattern: &str, directory: &str) -> String {
    if directory.is_empty() || directory == "." {
        return pattern.to_string();
    }

    let (bang, body) = match pattern.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", pattern),
    };

    if body.starts_with('/') || body == directory || body.starts_with(&format!("{directory}/")) {
        return pattern.to_string();
    }

    format!("{bang}{directory}/{body}")
}

/// Match one glob pattern against a path, case-insensitively, with
/// base-name fallback for bare patterns.
fn glob_matches(pattern: &str, filepath: &str) -> bool {
    let Ok(glob) = GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .build()
    else {
        tracing::debug!(pattern, "skipping unparseable include pattern");
        return false;
    };
    let matcher = glob.compile_matcher();

    if matcher.is_match(filepath) {
        return true;
    }

    // A pattern with no separator may match on the file name alone.
    if !pattern.contains('/') {
        if let Some(name) = filepath.rsplit('/').next() {
            return matcher.is_match(name);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(directory: &str, include: &[&str]) -> CodebaseRule {
        CodebaseRule::new(
            "test-rule".into(),
            "body".into(),
            directory.into(),
            include.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn directory_scope_anchors_patterns() {
        let r = rule("src", &["**/*.js", "!**/*.test.js"]);
        assert!(matches_include(&r, "src/a/b.js"));
        assert!(!matches_include(&r, "src/a/b.test.js"));
        assert!(!matches_include(&r, "lib/a.js"));
    }

    #[test]
    fn dot_directory_is_unscoped() {
        let r = rule(".", &["*.rs"]);
        assert!(matches_include(&r, "main.rs"));
        assert!(matches_include(&r, "deep/nested/main.rs"));
    }

    #[test]
    fn pattern_already_anchored_is_not_doubled() {
        let r = rule("src", &["src/**/*.rs"]);
        assert!(matches_include(&r, "src/a/lib.rs"));
        assert!(!matches_include(&r, "lib/a/lib.rs"));
    }

    #[test]
    fn exclusion_only_rule_matches_everything_else() {
        let r = rule("", &["!**/*.lock"]);
        assert!(matches_include(&r, "src/main.rs"));
        assert!(matches_include(&r, "README.md"));
        assert!(!matches_include(&r, "Cargo.lock"));
    }

    #[test]
    fn empty_include_matches_all() {
        let r = rule("", &[]);
        assert!(matches_include(&r, "anything/at/all.txt"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let r = rule("", &["**/*.Md"]);
        assert!(matches_include(&r, "docs/README.MD"));
        assert!(matches_include(&r, "docs/readme.md"));
    }

    #[test]
    fn matching_is_independent_of_filename_case() {
        let r = rule("src", &["**/*.js", "!**/*.test.js"]);
        for path in ["src/a/b.js", "SRC/A/B.JS", "Src/a/B.js"] {
            assert!(matches_include(&r, path), "expected match for {path}");
        }
        for path in ["src/a/b.test.js", "SRC/A/B.TEST.JS"] {
            assert!(!matches_include(&r, path), "expected exclusion for {path}");
        }
    }

    #[test]
    fn bare_star_crosses_directories() {
        let r = rule("", &["*.test.ts"]);
        assert!(matches_include(&r, "src/deep/auth.test.ts"));
    }

    #[test]
    fn brace_expansion() {
        let r = rule("", &["**/*.{ts,tsx}"]);
        assert!(matches_include(&r, "src/app.tsx"));
        assert!(matches_include(&r, "src/app.ts"));
        assert!(!matches_include(&r, "src/app.js"));
    }

    #[test]
    fn dotfiles_match() {
        let r = rule("", &["**/*.yml"]);
        assert!(matches_include(&r, ".github/workflows/ci.yml"));
    }

    #[test]
    fn basename_match_for_bare_pattern() {
        let r = rule("", &["Dockerfile"]);
        assert!(matches_include(&r, "services/api/Dockerfile"));
        assert!(!matches_include(&r, "services/api/Dockerfile.md"));
    }

    #[test]
    fn exclusion_applies_after_inclusion() {
        let r = rule("", &["**/*.go", "!**/vendor/**"]);
        assert!(matches_include(&r, "pkg/server.go"));
        assert!(!matches_include(&r, "pkg/vendor/dep.go"));
    }

    #[test]
    fn scoped_exclusion_keeps_bang() {
        assert_eq!(scope_pattern("!**/*.test.js", "src"), "!src/**/*.test.js");
        assert_eq!(scope_pattern("**/*.js", "src"), "src/**/*.js");
        assert_eq!(scope_pattern("src/x.js", "src"), "src/x.js");
        assert_eq!(scope_pattern("/abs/x.js", "src"), "/abs/x.js");
    }

    #[test]
    fn invalid_pattern_never_matches() {
        // An unparseable positive pattern means nothing is included.
        let r = rule("", &["["]);
        assert!(!matches_include(&r, "anything"));
    }

    #[test]
    fn rules_for_file_filters() {
        let rules = vec![
            rule("src", &["**/*.rs"]),
            rule("", &["**/*.rs"]),
            rule("", &["**/*.py"]),
        ];
        let matched = rules_for_file(&rules, "src/main.rs");
        assert_eq!(matched.len(), 2);
        let matched = rules_for_file(&rules, "scripts/run.py");
        assert_eq!(matched.len(), 1);
    }
}
