use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use wispbit_core::{
    sha256_hex, CodebaseRule, FileAnalysis, FileChange, LineReference, Result, Violation,
};

/// Cache file location relative to the workspace root.
pub const CACHE_FILE: &str = ".wispbit/cache.json";

/// Opaque freshness token for a workspace file.
///
/// The token hashes the file's modification time, so touching the file
/// invalidates any cached review that visited it. Missing files get a
/// sentinel token that never matches a stored one computed while the file
/// existed.
///
/// # Examples
///
/// ```
/// use wispbit_cache::freshness_token;
///
/// let tmp = tempfile::tempdir().unwrap();
/// std::fs::write(tmp.path().join("a.rs"), "fn a() {}").unwrap();
///
/// let token = freshness_token(tmp.path(), "a.rs");
/// assert_eq!(token, freshness_token(tmp.path(), "a.rs"));
/// assert_eq!(freshness_token(tmp.path(), "missing.rs"), "absent");
/// ```
pub fn freshness_token(root: &Path, filename: &str) -> String {
    let modified = std::fs::metadata(root.join(filename)).and_then(|m| m.modified());
    match modified {
        Ok(mtime) => {
            let stamp = mtime
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| format!("{}.{}", d.as_secs(), d.subsec_nanos()))
                .unwrap_or_else(|_| "pre-epoch".into());
            sha256_hex(&stamp)[..16].to_string()
        }
        Err(_) => "absent".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheDocument {
    rules: Vec<RuleRow>,
    review_files: Vec<ReviewFileRow>,
    review_violations: Vec<ViolationRow>,
    visited_files: Vec<VisitedFileRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleRow {
    id: String,
    name: String,
    contents: String,
    directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewFileRow {
    id: u64,
    filename: String,
    sha: String,
    /// Sorted rule-id set this review ran with.
    rule_ids: Vec<String>,
    cost: f64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViolationRow {
    id: u64,
    filename: String,
    file_sha: String,
    description: String,
    line: LineReference,
    rule_id: String,
    validation_reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitedFileRow {
    review_file_id: u64,
    filename: String,
    freshness_token: String,
}

/// The on-disk review cache.
///
/// One instance is shared by all file tasks of a run; the interior lock
/// serialises writes while lookups see consistent snapshots.
///
/// # Examples
///
/// ```
/// use wispbit_cache::ReviewCache;
///
/// let tmp = tempfile::tempdir().unwrap();
/// let cache = ReviewCache::open(tmp.path()).unwrap();
/// drop(cache);
/// ```
pub struct ReviewCache {
    root: PathBuf,
    path: PathBuf,
    state: Mutex<CacheDocument>,
}

impl ReviewCache {
    /// Open (or initialise) the cache for a workspace.
    ///
    /// A missing or unreadable cache file starts empty rather than
    /// failing; the cache is best-effort by design.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(CACHE_FILE);
        let document = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!(%err, "cache file is corrupt; starting empty");
                CacheDocument::default()
            }),
            Err(_) => CacheDocument::default(),
        };
        Ok(Self {
            root: root.to_path_buf(),
            path,
            state: Mutex::new(document),
        })
    }

    /// Return the cached violations for `(filename, sha, rules)`, or
    /// `None` on a miss.
    ///
    /// A hit requires a recorded review with the same filename, patch
    /// hash, and rule-id set, and an unchanged freshness token for every
    /// file that review visited. Returned violations are marked cached.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wispbit_cache::ReviewCache;
    ///
    /// # async fn demo() {
    /// let cache = ReviewCache::open(std::path::Path::new(".")).unwrap();
    /// match cache.cached_violations("src/api.rs", "abc123", &[]).await {
    ///     Some(violations) => println!("cache hit: {} violation(s)", violations.len()),
    ///     None => println!("cache miss; a fresh review is needed"),
    /// }
    /// # }
    /// ```
    pub async fn cached_violations(
        &self,
        filename: &str,
        sha: &str,
        rules: &[CodebaseRule],
    ) -> Option<Vec<Violation>> {
        let mut rule_ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();
        rule_ids.sort();

        let state = self.state.lock().await;
        let review = state.review_files.iter().find(|row| {
            row.filename == filename && row.sha == sha && row.rule_ids == rule_ids
        })?;

        for visited in state
            .visited_files
            .iter()
            .filter(|v| v.review_file_id == review.id)
        {
            let current = freshness_token(&self.root, &visited.filename);
            if current != visited.freshness_token {
                tracing::debug!(
                    file = filename,
                    visited = %visited.filename,
                    "cache miss: visited file changed"
                );
                return None;
            }
        }

        let violations = state
            .review_violations
            .iter()
            .filter(|v| v.filename == filename && v.file_sha == sha)
            .map(|row| Violation {
                description: row.description.clone(),
                line: row.line,
                rule: resolve_rule(&state, rules, &row.rule_id),
                validation_reasoning: row.validation_reasoning.clone(),
                is_cached: true,
            })
            .collect();
        Some(violations)
    }

    /// Record one completed (non-cached) review.
    ///
    /// Inserts a review row, one violation row per violation, and one
    /// visited row per visited file not already present in the visited
    /// set. Rows are never mutated in place; a re-review writes new ones.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be persisted; callers
    /// treat that as degraded caching, not review failure.
    pub async fn record(&self, file: &FileChange, analysis: &FileAnalysis) -> Result<()> {
        let mut state = self.state.lock().await;

        let review_id = state.review_files.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let mut rule_ids: Vec<String> = analysis.rules.iter().map(|r| r.id.clone()).collect();
        rule_ids.sort();

        for rule in &analysis.rules {
            if !state.rules.iter().any(|r| r.id == rule.id) {
                state.rules.push(RuleRow {
                    id: rule.id.clone(),
                    name: rule.name.clone(),
                    contents: rule.contents.clone(),
                    directory: rule.directory.clone(),
                });
            }
        }

        state.review_files.push(ReviewFileRow {
            id: review_id,
            filename: file.filename.clone(),
            sha: file.sha.clone(),
            rule_ids,
            cost: analysis.cost,
            created_at: Utc::now(),
        });

        let violation_base = state
            .review_violations
            .iter()
            .map(|v| v.id)
            .max()
            .unwrap_or(0);
        for (offset, violation) in analysis.violations.iter().enumerate() {
            state.review_violations.push(ViolationRow {
                id: violation_base + offset as u64 + 1,
                filename: file.filename.clone(),
                file_sha: file.sha.clone(),
                description: violation.description.clone(),
                line: violation.line,
                rule_id: violation.rule.id.clone(),
                validation_reasoning: violation.validation_reasoning.clone(),
            });
        }

        for visited in &analysis.visited_files {
            if state.visited_files.iter().any(|v| &v.filename == visited) {
                continue;
            }
            let token = freshness_token(&self.root, visited);
            state.visited_files.push(VisitedFileRow {
                review_file_id: review_id,
                filename: visited.clone(),
                freshness_token: token,
            });
        }

        self.persist(&state)
    }

    /// Drop every row and persist the empty document.
    pub async fn purge(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = CacheDocument::default();
        self.persist(&state)
    }

    fn persist(&self, state: &CacheDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Resolve a violation's rule from the live rule set, falling back to the
/// stored rule row.
fn resolve_rule(state: &CacheDocument, rules: &[CodebaseRule], rule_id: &str) -> CodebaseRule {
    if let Some(rule) = rules.iter().find(|r| r.id == rule_id) {
        return rule.clone();
    }
    state
        .rules
        .iter()
        .find(|r| r.id == rule_id)
        .map(|row| {
            CodebaseRule::new(
                row.name.clone(),
                row.contents.clone(),
                row.directory.clone(),
                Vec::new(),
            )
        })
        .unwrap_or_else(|| {
            CodebaseRule::new(rule_id.to_string(), String::new(), String::new(), Vec::new())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use wispbit_core::{FileStatus, Side};

    fn rule(name: &str) -> CodebaseRule {
        CodebaseRule::new(name.into(), format!("Rule {name}."), String::new(), vec![])
    }

    fn file_change() -> FileChange {
        FileChange::new(
            "src/api.rs".into(),
            FileStatus::Modified,
            Some("@@ -1 +1 @@\n-a\n+b".into()),
            1,
            1,
        )
    }

    fn analysis(rules: Vec<CodebaseRule>, visited: Vec<String>) -> FileAnalysis {
        let violation = Violation {
            description: "uses a banned call".into(),
            line: LineReference {
                start: 1,
                end: 1,
                side: Side::Right,
            },
            rule: rules[0].clone(),
            validation_reasoning: Some("clearly visible in the diff".into()),
            is_cached: false,
        };
        FileAnalysis {
            violations: vec![violation],
            explanation: "done".into(),
            rules,
            visited_files: visited,
            rejected_violations: vec![],
            cost: 0.01,
        }
    }

    #[tokio::test]
    async fn hit_returns_cached_violations() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();

        let hit = cache
            .cached_violations(&file.filename, &file.sha, &rules)
            .await
            .unwrap();
        assert_eq!(hit.len(), 1);
        assert!(hit[0].is_cached);
        assert_eq!(hit[0].rule.id, rules[0].id);
        assert_eq!(
            hit[0].validation_reasoning.as_deref(),
            Some("clearly visible in the diff")
        );
    }

    #[tokio::test]
    async fn different_sha_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();

        let miss = cache
            .cached_violations(&file.filename, "deadbeef", &rules)
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn different_rule_set_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();

        let other_rules = vec![rule("no-banned"), rule("extra")];
        let miss = cache
            .cached_violations(&file.filename, &file.sha, &other_rules)
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn touched_visited_file_invalidates() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("helper.rs"), "fn help() {}").unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache
            .record(&file, &analysis(rules.clone(), vec!["helper.rs".into()]))
            .await
            .unwrap();
        assert!(cache
            .cached_violations(&file.filename, &file.sha, &rules)
            .await
            .is_some());

        // Touch the visited file far enough in the past that the mtime
        // definitely changes.
        let f = fs::File::options()
            .write(true)
            .open(tmp.path().join("helper.rs"))
            .unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        let miss = cache
            .cached_violations(&file.filename, &file.sha, &rules)
            .await;
        assert!(miss.is_none(), "touching a visited file must invalidate");
    }

    #[tokio::test]
    async fn deleted_visited_file_invalidates() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("helper.rs"), "fn help() {}").unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache
            .record(&file, &analysis(rules.clone(), vec!["helper.rs".into()]))
            .await
            .unwrap();
        fs::remove_file(tmp.path().join("helper.rs")).unwrap();

        assert!(cache
            .cached_violations(&file.filename, &file.sha, &rules)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];
        {
            let cache = ReviewCache::open(tmp.path()).unwrap();
            cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();
        }

        let reopened = ReviewCache::open(tmp.path()).unwrap();
        let hit = reopened
            .cached_violations(&file.filename, &file.sha, &rules)
            .await;
        assert!(hit.is_some());
        assert!(tmp.path().join(CACHE_FILE).exists());
    }

    #[tokio::test]
    async fn purge_drops_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];

        cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();
        cache.purge().await.unwrap();

        assert!(cache
            .cached_violations(&file.filename, &file.sha, &rules)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn visited_filenames_not_duplicated() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("shared.rs"), "x").unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let rules = vec![rule("no-banned")];

        let first = file_change();
        cache
            .record(&first, &analysis(rules.clone(), vec!["shared.rs".into()]))
            .await
            .unwrap();

        let second = FileChange::new(
            "src/other.rs".into(),
            FileStatus::Modified,
            Some("@@ -1 +1 @@\n-x\n+y".into()),
            1,
            1,
        );
        cache
            .record(&second, &analysis(rules.clone(), vec!["shared.rs".into()]))
            .await
            .unwrap();

        let state = cache.state.lock().await;
        let shared_rows = state
            .visited_files
            .iter()
            .filter(|v| v.filename == "shared.rs")
            .count();
        assert_eq!(shared_rows, 1);
    }

    #[tokio::test]
    async fn newest_matching_review_not_required_rows_accumulate() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let rules = vec![rule("no-banned")];

        // Two reviews of the same filename at different patch hashes both
        // stay resident; each sha hits its own row.
        let old = file_change();
        cache.record(&old, &analysis(rules.clone(), vec![])).await.unwrap();

        let new = FileChange::new(
            old.filename.clone(),
            FileStatus::Modified,
            Some("@@ -1 +1 @@\n-a\n+c".into()),
            1,
            1,
        );
        cache.record(&new, &analysis(rules.clone(), vec![])).await.unwrap();

        assert!(cache
            .cached_violations(&old.filename, &old.sha, &rules)
            .await
            .is_some());
        assert!(cache
            .cached_violations(&new.filename, &new.sha, &rules)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn rule_order_does_not_affect_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let a = rule("alpha");
        let b = rule("beta");
        let file = file_change();

        cache
            .record(&file, &analysis(vec![a.clone(), b.clone()], vec![]))
            .await
            .unwrap();

        // Same set, reversed order: the sorted id comparison still hits.
        let hit = cache
            .cached_violations(&file.filename, &file.sha, &[b, a])
            .await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn purge_persists_an_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let file = file_change();
        let rules = vec![rule("no-banned")];
        {
            let cache = ReviewCache::open(tmp.path()).unwrap();
            cache.record(&file, &analysis(rules.clone(), vec![])).await.unwrap();
            cache.purge().await.unwrap();
        }

        let reopened = ReviewCache::open(tmp.path()).unwrap();
        assert!(reopened
            .cached_violations(&file.filename, &file.sha, &rules)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_file_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".wispbit")).unwrap();
        fs::write(tmp.path().join(CACHE_FILE), "{ not json").unwrap();

        let cache = ReviewCache::open(tmp.path()).unwrap();
        let rules = vec![rule("no-banned")];
        assert!(cache.cached_violations("x", "y", &rules).await.is_none());
    }
}
