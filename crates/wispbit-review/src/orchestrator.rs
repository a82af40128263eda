use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wispbit_cache::ReviewCache;
use wispbit_core::{CodebaseRule, FileAnalysis, FileChange, Violation, WispbitConfig};
use wispbit_llm::ChatBackend;
use wispbit_rules::rules_for_file;

use crate::reviewer::review_file;

/// Why a file was skipped instead of reviewed.
///
/// # Examples
///
/// ```
/// use wispbit_review::SkipReason;
///
/// assert_eq!(SkipReason::NoMatchingRules.to_string(), "no matching rules");
/// assert_eq!(SkipReason::Cached.to_string(), "cached");
/// assert_eq!(SkipReason::Error("boom".into()).to_string(), "error");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No rule's include patterns matched the file.
    NoMatchingRules,
    /// An unchanged review was served from the cache.
    Cached,
    /// The file's review task failed; the run continues.
    Error(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoMatchingRules => write!(f, "no matching rules"),
            SkipReason::Cached => write!(f, "cached"),
            SkipReason::Error(_) => write!(f, "error"),
        }
    }
}

/// Outcome of one file's pass through the orchestrator.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// A fresh review ran to completion.
    Completed(FileAnalysis),
    /// The file was skipped; cached skips still carry violations.
    Skipped {
        /// Why it was skipped.
        reason: SkipReason,
        /// Cached violations, empty for other skip reasons.
        violations: Vec<Violation>,
    },
}

/// One file's result in a review run.
#[derive(Debug, Clone)]
pub struct FileReviewResult {
    /// Workspace-relative filename.
    pub file_name: String,
    /// What happened.
    pub outcome: FileOutcome,
}

impl FileReviewResult {
    /// The violations this file contributes to the run, cached or fresh.
    pub fn violations(&self) -> &[Violation] {
        match &self.outcome {
            FileOutcome::Completed(analysis) => &analysis.violations,
            FileOutcome::Skipped { violations, .. } => violations,
        }
    }
}

/// A per-file lifecycle update delivered through the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUpdate {
    /// The file is waiting for a worker slot.
    Queued,
    /// A worker picked the file up.
    Processing,
    /// The review completed with this many violations.
    Completed {
        /// Violations that survived validation.
        violations: usize,
    },
    /// The file was skipped.
    Skipped {
        /// Rendered skip reason: `no matching rules`, `cached`, `error`.
        reason: String,
    },
}

/// Observer hooks, always invoked from the orchestrator task so observer
/// state needs no synchronisation beyond `Send + Sync`.
pub trait ReviewObserver: Send + Sync {
    /// The run is starting with this many files.
    fn on_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// One file changed lifecycle state.
    fn on_update_file(&self, filename: &str, update: &FileUpdate) {
        let _ = (filename, update);
    }

    /// Every file has a result.
    fn on_complete(&self, results: &[FileReviewResult]) {
        let _ = results;
    }

    /// The run was cancelled; in-flight files still finish naturally.
    fn on_abort(&self) {}
}

/// An observer that ignores everything.
pub struct NoopObserver;

impl ReviewObserver for NoopObserver {}

/// Dispatches per-file review loops under a concurrency cap.
///
/// Files are pulled work-stealing style: up to the cap run at once and a
/// finishing task immediately frees its slot for the next file, with no
/// batching. Per-file failures isolate to a `skipped(error)` result.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use wispbit_core::WispbitConfig;
/// use wispbit_llm::OpenAiClient;
/// use wispbit_review::{NoopObserver, ReviewOrchestrator};
///
/// # async fn demo(files: Vec<wispbit_core::FileChange>) {
/// let backend = OpenAiClient::new("https://openrouter.ai/api/v1".into(), None).unwrap();
/// let orchestrator = ReviewOrchestrator::new(
///     Arc::new(backend),
///     PathBuf::from("."),
///     WispbitConfig::default(),
/// );
/// let results = orchestrator.run(&files, &[], None, &NoopObserver).await;
/// # let _ = results;
/// # }
/// ```
pub struct ReviewOrchestrator {
    backend: Arc<dyn ChatBackend>,
    root: PathBuf,
    config: WispbitConfig,
    cancel: CancellationToken,
}

impl ReviewOrchestrator {
    /// Create an orchestrator for one workspace.
    pub fn new(backend: Arc<dyn ChatBackend>, root: PathBuf, config: WispbitConfig) -> Self {
        Self {
            backend,
            root,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that cancels this orchestrator's run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Share an externally owned cancellation token (for wiring the same
    /// token into the LLM client and a ctrl-c handler).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Review every file and return one result per file.
    ///
    /// Results arrive in completion order; no inter-file ordering is
    /// guaranteed.
    pub async fn run(
        &self,
        files: &[FileChange],
        rules: &[CodebaseRule],
        cache: Option<&ReviewCache>,
        observer: &dyn ReviewObserver,
    ) -> Vec<FileReviewResult> {
        observer.on_start(files.len());
        for file in files {
            observer.on_update_file(&file.filename, &FileUpdate::Queued);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let concurrency = self.config.review.concurrency.max(1);

        let mut stream = futures::stream::iter(files.iter().map(|file| {
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return FileReviewResult {
                        file_name: file.filename.clone(),
                        outcome: FileOutcome::Skipped {
                            reason: SkipReason::Error("aborted".into()),
                            violations: Vec::new(),
                        },
                    };
                }
                let _ = tx.send(file.filename.clone());
                let outcome = self.review_one(file, files, rules, cache).await;
                FileReviewResult {
                    file_name: file.filename.clone(),
                    outcome,
                }
            }
        }))
        .buffer_unordered(concurrency);

        let mut results: Vec<FileReviewResult> = Vec::with_capacity(files.len());
        let mut aborted = false;
        loop {
            if self.cancel.is_cancelled() && !aborted {
                aborted = true;
                observer.on_abort();
            }
            tokio::select! {
                Some(filename) = rx.recv() => {
                    observer.on_update_file(&filename, &FileUpdate::Processing);
                }
                item = stream.next() => match item {
                    Some(result) => {
                        observer.on_update_file(&result.file_name, &final_update(&result));
                        results.push(result);
                    }
                    None => break,
                },
            }
        }
        while let Ok(filename) = rx.try_recv() {
            observer.on_update_file(&filename, &FileUpdate::Processing);
        }

        if self.cancel.is_cancelled() && !aborted {
            observer.on_abort();
        }
        observer.on_complete(&results);
        results
    }

    async fn review_one(
        &self,
        file: &FileChange,
        all_files: &[FileChange],
        rules: &[CodebaseRule],
        cache: Option<&ReviewCache>,
    ) -> FileOutcome {
        let applicable: Vec<CodebaseRule> = rules_for_file(rules, &file.filename)
            .into_iter()
            .cloned()
            .collect();
        if applicable.is_empty() {
            return FileOutcome::Skipped {
                reason: SkipReason::NoMatchingRules,
                violations: Vec::new(),
            };
        }

        if let Some(cache) = cache {
            if let Some(violations) = cache
                .cached_violations(&file.filename, &file.sha, &applicable)
                .await
            {
                tracing::debug!(file = %file.filename, "serving review from cache");
                return FileOutcome::Skipped {
                    reason: SkipReason::Cached,
                    violations,
                };
            }
        }

        match review_file(
            Arc::clone(&self.backend),
            &self.root,
            file,
            applicable,
            all_files,
            &self.config,
        )
        .await
        {
            Ok(analysis) => {
                if let Some(cache) = cache {
                    if let Err(err) = cache.record(file, &analysis).await {
                        tracing::warn!(file = %file.filename, %err,
                            "cache write failed; review continues uncached");
                    }
                }
                FileOutcome::Completed(analysis)
            }
            Err(err) => {
                tracing::warn!(file = %file.filename, %err, "file review failed");
                FileOutcome::Skipped {
                    reason: SkipReason::Error(err.to_string()),
                    violations: Vec::new(),
                }
            }
        }
    }
}

fn final_update(result: &FileReviewResult) -> FileUpdate {
    match &result.outcome {
        FileOutcome::Completed(analysis) => FileUpdate::Completed {
            violations: analysis.violations.len(),
        },
        FileOutcome::Skipped { reason, .. } => FileUpdate::Skipped {
            reason: reason.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;
    use std::sync::Mutex;
    use wispbit_core::FileStatus;

    const PATCH: &str = "@@ -1,2 +1,2 @@\n ctx\n-old\n+new";

    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ReviewObserver for RecordingObserver {
        fn on_start(&self, total_files: usize) {
            self.events.lock().unwrap().push(format!("start:{total_files}"));
        }

        fn on_update_file(&self, filename: &str, update: &FileUpdate) {
            let label = match update {
                FileUpdate::Queued => "queued".to_string(),
                FileUpdate::Processing => "processing".to_string(),
                FileUpdate::Completed { violations } => format!("completed:{violations}"),
                FileUpdate::Skipped { reason } => format!("skipped:{reason}"),
            };
            self.events
                .lock()
                .unwrap()
                .push(format!("{filename}:{label}"));
        }

        fn on_complete(&self, results: &[FileReviewResult]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete:{}", results.len()));
        }

        fn on_abort(&self) {
            self.events.lock().unwrap().push("abort".to_string());
        }
    }

    fn rule_for(pattern: &str) -> CodebaseRule {
        CodebaseRule::new(
            "style".into(),
            "Follow the style guide.".into(),
            String::new(),
            vec![pattern.into()],
        )
    }

    fn change(name: &str) -> FileChange {
        FileChange::new(name.into(), FileStatus::Modified, Some(PATCH.into()), 1, 1)
    }

    fn orchestrator(backend: ScriptedBackend, root: &std::path::Path) -> ReviewOrchestrator {
        let mut config = WispbitConfig::default();
        config.review.concurrency = 1;
        ReviewOrchestrator::new(Arc::new(backend), root.to_path_buf(), config)
    }

    #[tokio::test]
    async fn reviews_every_matching_file() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new()
            .push_message("clean")
            .push_message("clean");
        let orch = orchestrator(backend, tmp.path());
        let files = vec![change("a.rs"), change("b.rs")];
        let rules = vec![rule_for("**/*.rs")];

        let observer = RecordingObserver::new();
        let results = orch.run(&files, &rules, None, &observer).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(result.outcome, FileOutcome::Completed(_)));
        }

        let events = observer.events();
        assert_eq!(events[0], "start:2");
        assert!(events.contains(&"a.rs:queued".to_string()));
        assert!(events.contains(&"b.rs:queued".to_string()));
        assert!(events.contains(&"a.rs:processing".to_string()));
        assert!(events.contains(&"a.rs:completed:0".to_string()));
        assert_eq!(events.last().unwrap(), "complete:2");
    }

    #[tokio::test]
    async fn file_without_matching_rules_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new().push_message("clean");
        let orch = orchestrator(backend, tmp.path());
        let files = vec![change("a.rs"), change("README.md")];
        let rules = vec![rule_for("**/*.rs")];

        let results = orch.run(&files, &rules, None, &NoopObserver).await;
        let md = results.iter().find(|r| r.file_name == "README.md").unwrap();
        assert!(matches!(
            md.outcome,
            FileOutcome::Skipped {
                reason: SkipReason::NoMatchingRules,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cache_hit_skips_the_llm() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ReviewCache::open(tmp.path()).unwrap();
        let rules = vec![rule_for("**/*.rs")];
        let file = change("a.rs");

        // First run performs a review that reports one violation.
        let complaint = json!({
            "file_path": "a.rs",
            "line_start": 2,
            "line_end": 2,
            "line_side": "right",
            "description": "style drift",
            "rule_id": rules[0].id,
        })
        .to_string();
        let backend = ScriptedBackend::new()
            .push_tool_call("complaint", &complaint)
            .push_message("one finding")
            .push_validation(true, "visible in the diff");
        let orch = orchestrator(backend, tmp.path());
        let first = orch
            .run(std::slice::from_ref(&file), &rules, Some(&cache), &NoopObserver)
            .await;
        assert_eq!(first[0].violations().len(), 1);

        // Second run with an empty backend: any LLM call would error.
        let orch = orchestrator(ScriptedBackend::new(), tmp.path());
        let observer = RecordingObserver::new();
        let second = orch
            .run(std::slice::from_ref(&file), &rules, Some(&cache), &observer)
            .await;

        match &second[0].outcome {
            FileOutcome::Skipped { reason, violations } => {
                assert_eq!(*reason, SkipReason::Cached);
                assert_eq!(violations.len(), 1);
                assert!(violations[0].is_cached);
            }
            other => panic!("expected cached skip, got {other:?}"),
        }
        assert!(observer
            .events()
            .contains(&"a.rs:skipped:cached".to_string()));
    }

    #[tokio::test]
    async fn per_file_errors_do_not_stop_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        // Sequential: first file hits a provider error, second succeeds.
        let backend = ScriptedBackend::new()
            .push_error("boom")
            .push_message("clean");
        let orch = orchestrator(backend, tmp.path());
        let files = vec![change("a.rs"), change("b.rs")];
        let rules = vec![rule_for("**/*.rs")];

        let results = orch.run(&files, &rules, None, &NoopObserver).await;
        let a = results.iter().find(|r| r.file_name == "a.rs").unwrap();
        let b = results.iter().find(|r| r.file_name == "b.rs").unwrap();
        assert!(matches!(
            &a.outcome,
            FileOutcome::Skipped {
                reason: SkipReason::Error(e),
                ..
            } if e.contains("boom")
        ));
        assert!(matches!(b.outcome, FileOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn cancelled_run_skips_pending_files_and_notifies() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(ScriptedBackend::new(), tmp.path());
        orch.cancellation_token().cancel();

        let files = vec![change("a.rs"), change("b.rs")];
        let rules = vec![rule_for("**/*.rs")];
        let observer = RecordingObserver::new();
        let results = orch.run(&files, &rules, None, &observer).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(
                &result.outcome,
                FileOutcome::Skipped {
                    reason: SkipReason::Error(e),
                    ..
                } if e == "aborted"
            ));
        }
        assert!(observer.events().contains(&"abort".to_string()));
    }

    #[tokio::test]
    async fn concurrent_runs_produce_one_result_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut backend = ScriptedBackend::new();
        for _ in 0..12 {
            backend = backend.push_message("clean");
        }
        let mut config = WispbitConfig::default();
        config.review.concurrency = 4;
        let orch =
            ReviewOrchestrator::new(Arc::new(backend), tmp.path().to_path_buf(), config);

        let files: Vec<FileChange> = (0..12).map(|i| change(&format!("f{i}.rs"))).collect();
        let rules = vec![rule_for("**/*.rs")];

        let results = orch.run(&files, &rules, None, &NoopObserver).await;
        assert_eq!(results.len(), 12);
        let mut names: Vec<&str> = results.iter().map(|r| r.file_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 12, "every file gets exactly one result");
    }

    #[tokio::test]
    async fn empty_file_list_completes_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(ScriptedBackend::new(), tmp.path());
        let observer = RecordingObserver::new();
        let results = orch.run(&[], &[], None, &observer).await;
        assert!(results.is_empty());
        assert_eq!(observer.events(), vec!["start:0", "complete:0"]);
    }
}
