use std::fmt;

use serde::Serialize;

use wispbit_core::Violation;

use crate::orchestrator::{FileOutcome, FileReviewResult, SkipReason};

/// Aggregated result of a review run.
///
/// # Examples
///
/// ```
/// use wispbit_review::ReviewReport;
///
/// let report = ReviewReport::from_results(vec![]);
/// assert_eq!(report.stats.files_total, 0);
/// assert!(report.to_markdown().contains("No violations found"));
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// Per-file entries in filename order.
    pub files: Vec<FileReport>,
    /// Run-level statistics.
    pub stats: ReviewStats,
}

/// One file's entry in the report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    /// Workspace-relative filename.
    pub file_name: String,
    /// `completed` or `skipped`.
    pub status: String,
    /// Skip reason when skipped: `no matching rules`, `cached`, `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Violations for this file, cached or fresh.
    pub violations: Vec<Violation>,
}

/// Statistics about a review run.
///
/// # Examples
///
/// ```
/// use wispbit_review::ReviewStats;
///
/// let stats = ReviewStats {
///     files_total: 4,
///     files_reviewed: 2,
///     files_cached: 1,
///     files_skipped: 1,
///     files_failed: 0,
///     violations: 3,
///     cost: 0.08,
/// };
/// assert_eq!(stats.files_total, 4);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    /// Files the run looked at.
    pub files_total: usize,
    /// Files that went through a fresh review.
    pub files_reviewed: usize,
    /// Files served from the cache.
    pub files_cached: usize,
    /// Files skipped because no rules matched.
    pub files_skipped: usize,
    /// Files whose review failed.
    pub files_failed: usize,
    /// Total violations, cached and fresh.
    pub violations: usize,
    /// Total LLM spend in dollars.
    pub cost: f64,
}

impl ReviewReport {
    /// Build a report from orchestrator results, sorted by filename.
    pub fn from_results(mut results: Vec<FileReviewResult>) -> Self {
        results.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let mut stats = ReviewStats {
            files_total: results.len(),
            files_reviewed: 0,
            files_cached: 0,
            files_skipped: 0,
            files_failed: 0,
            violations: 0,
            cost: 0.0,
        };

        let files = results
            .into_iter()
            .map(|result| {
                let (status, skip_reason) = match &result.outcome {
                    FileOutcome::Completed(analysis) => {
                        stats.files_reviewed += 1;
                        stats.cost += analysis.cost;
                        ("completed".to_string(), None)
                    }
                    FileOutcome::Skipped { reason, .. } => {
                        match reason {
                            SkipReason::Cached => stats.files_cached += 1,
                            SkipReason::NoMatchingRules => stats.files_skipped += 1,
                            SkipReason::Error(_) => stats.files_failed += 1,
                        }
                        ("skipped".to_string(), Some(reason.to_string()))
                    }
                };
                let violations = result.violations().to_vec();
                stats.violations += violations.len();
                FileReport {
                    file_name: result.file_name,
                    status,
                    skip_reason,
                    violations,
                }
            })
            .collect();

        Self { files, stats }
    }

    /// Render the report as markdown, one section per violating file.
    ///
    /// # Examples
    ///
    /// ```
    /// use wispbit_review::ReviewReport;
    ///
    /// let md = ReviewReport::from_results(vec![]).to_markdown();
    /// assert!(md.starts_with("# Review"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Review\n\n");
        out.push_str(&format!(
            "**Files:** {} | **Violations:** {} | **Cached:** {} | **Failed:** {} | **Cost:** ${:.4}\n\n",
            self.stats.files_total,
            self.stats.violations,
            self.stats.files_cached,
            self.stats.files_failed,
            self.stats.cost,
        ));

        if self.stats.violations == 0 {
            out.push_str("No violations found.\n");
            return out;
        }

        for file in &self.files {
            if file.violations.is_empty() {
                continue;
            }
            out.push_str(&format!("## {}\n\n", file.file_name));
            for violation in &file.violations {
                let cached = if violation.is_cached { " (cached)" } else { "" };
                out.push_str(&format!(
                    "- `{}` **{}**{}: {}\n",
                    violation.line, violation.rule.name, cached, violation.description,
                ));
                if let Some(reasoning) = &violation.validation_reasoning {
                    out.push_str(&format!("  - validator: {reasoning}\n"));
                }
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            if let Some(reason) = &file.skip_reason {
                if reason == "error" {
                    writeln!(f, "{}: review failed", file.file_name)?;
                    continue;
                }
            }
            for violation in &file.violations {
                let cached = if violation.is_cached { " (cached)" } else { "" };
                writeln!(
                    f,
                    "{}:{} [{}]{}",
                    file.file_name, violation.line, violation.rule.name, cached,
                )?;
                writeln!(f, "  {}", violation.description)?;
                if let Some(reasoning) = &violation.validation_reasoning {
                    writeln!(f, "  validator: {reasoning}")?;
                }
                writeln!(f)?;
            }
        }

        if self.stats.violations == 0 {
            writeln!(f, "No violations found.")?;
        }
        write!(
            f,
            "\n{} file(s) | {} violation(s) | {} cached | {} failed | ${:.4}",
            self.stats.files_total,
            self.stats.violations,
            self.stats.files_cached,
            self.stats.files_failed,
            self.stats.cost,
        )
    }
}
