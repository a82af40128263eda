//! Change extraction from a git workspace.
//!
//! A thin adapter around git2 that turns "what changed since the base
//! revision" into the [`FileChange`] records the review pipeline consumes.
//! The diff runs from the merge base of the base revision and HEAD to the
//! working tree, so uncommitted work is reviewed too.

use std::path::Path;

use git2::{Delta, DiffOptions, Repository};

use wispbit_core::{FileChange, FileStatus, Result, WispbitError};

/// Base revisions tried, in order, when none is given.
const DEFAULT_BASES: &[&str] = &["origin/main", "origin/master", "main", "master"];

/// The changes to review plus the revisions they were computed against.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// One record per changed file.
    pub files: Vec<FileChange>,
    /// Current branch shorthand, or `HEAD` when detached.
    pub current_branch: String,
    /// Commit id of HEAD.
    pub current_commit: String,
    /// The base revspec the diff was taken against.
    pub diff_branch: String,
    /// Commit id of the merge base actually used.
    pub diff_commit: String,
}

/// Collect the file changes between the base revision and the working
/// tree.
///
/// The diff base is the merge base of `base` (or the first resolvable
/// default branch) and HEAD. Deleted files are materialised from their
/// merge-base blob as fully-`-`-prefixed pseudo-patches so downstream
/// analysis sees their content as changed lines. Each change's SHA hashes
/// the patch text, not the file content.
///
/// # Errors
///
/// Returns [`WispbitError::Git`] when the workspace is not a repository,
/// the base cannot be resolved, or diffing fails.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use wispbit_git::collect_changes;
///
/// let changes = collect_changes(Path::new("."), Some("origin/main")).unwrap();
/// for file in &changes.files {
///     println!("{} ({}) +{} -{}", file.filename, file.status, file.additions, file.deletions);
/// }
/// ```
pub fn collect_changes(root: &Path, base: Option<&str>) -> Result<ChangeSet> {
    let repo = Repository::discover(root).map_err(git_err)?;

    let head = repo.head().map_err(git_err)?;
    let current_branch = head.shorthand().unwrap_or("HEAD").to_string();
    let head_commit = head.peel_to_commit().map_err(git_err)?;
    let current_commit = head_commit.id().to_string();

    let (diff_branch, base_commit) = resolve_base(&repo, base)?;
    let merge_base = repo
        .merge_base(base_commit, head_commit.id())
        .map_err(git_err)?;
    let diff_commit = merge_base.to_string();

    let base_tree = repo
        .find_commit(merge_base)
        .and_then(|c| c.tree())
        .map_err(git_err)?;

    let mut options = DiffOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .context_lines(3);
    let mut diff = repo
        .diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut options))
        .map_err(git_err)?;
    diff.find_similar(None).map_err(git_err)?;

    tracing::debug!(
        base = %diff_branch,
        merge_base = %diff_commit,
        deltas = diff.deltas().count(),
        "diffing workspace against merge base"
    );

    let mut files = Vec::new();
    for (index, delta) in diff.deltas().enumerate() {
        let status = map_status(delta.status());
        let filename = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        if filename.is_empty() {
            continue;
        }

        let (patch, additions, deletions) = if status == FileStatus::Removed {
            deleted_pseudo_patch(&repo, &base_tree, &filename)
        } else {
            patch_for_delta(&diff, index)
        };

        files.push(FileChange::new(
            filename, status, patch, additions, deletions,
        ));
    }

    Ok(ChangeSet {
        files,
        current_branch,
        current_commit,
        diff_branch,
        diff_commit,
    })
}

fn resolve_base(repo: &Repository, base: Option<&str>) -> Result<(String, git2::Oid)> {
    let candidates: Vec<&str> = match base {
        Some(spec) => vec![spec],
        None => DEFAULT_BASES.to_vec(),
    };

    for candidate in &candidates {
        if let Ok(object) = repo.revparse_single(candidate) {
            if let Ok(commit) = object.peel_to_commit() {
                return Ok((candidate.to_string(), commit.id()));
            }
        }
    }

    Err(WispbitError::Git(match base {
        Some(spec) => format!("cannot resolve base revision {spec:?}"),
        None => format!(
            "cannot resolve a default base; tried {}",
            DEFAULT_BASES.join(", ")
        ),
    }))
}

fn map_status(delta: Delta) -> FileStatus {
    match delta {
        Delta::Added | Delta::Untracked => FileStatus::Added,
        Delta::Deleted => FileStatus::Removed,
        Delta::Modified => FileStatus::Modified,
        Delta::Renamed => FileStatus::Renamed,
        Delta::Copied => FileStatus::Copied,
        Delta::Typechange => FileStatus::Changed,
        _ => FileStatus::Unchanged,
    }
}

/// Render one delta's hunks, dropping the `diff --git` header block.
fn patch_for_delta(diff: &git2::Diff<'_>, index: usize) -> (Option<String>, u32, u32) {
    let Ok(Some(mut patch)) = git2::Patch::from_diff(diff, index) else {
        return (None, 0, 0);
    };
    let (_, additions, deletions) = patch.line_stats().unwrap_or((0, 0, 0));

    let Ok(buf) = patch.to_buf() else {
        return (None, additions as u32, deletions as u32);
    };
    let text = buf.as_str().unwrap_or_default();

    let hunks = match text.find("\n@@ ") {
        Some(pos) => &text[pos + 1..],
        None if text.starts_with("@@ ") => text,
        None => return (None, additions as u32, deletions as u32),
    };
    (
        Some(hunks.trim_end_matches('\n').to_string()),
        additions as u32,
        deletions as u32,
    )
}

/// Rebuild a deleted file's content from the merge-base blob as an
/// all-deletions patch.
fn deleted_pseudo_patch(
    repo: &Repository,
    base_tree: &git2::Tree<'_>,
    filename: &str,
) -> (Option<String>, u32, u32) {
    let entry = match base_tree.get_path(Path::new(filename)) {
        Ok(entry) => entry,
        Err(_) => return (None, 0, 0),
    };
    let blob = match entry.to_object(repo).and_then(|o| o.peel_to_blob()) {
        Ok(blob) => blob,
        Err(_) => return (None, 0, 0),
    };
    if blob.is_binary() {
        return (None, 0, 0);
    }
    let content = String::from_utf8_lossy(blob.content()).to_string();
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return (None, 0, 0);
    }

    let mut patch = format!("@@ -1,{} +0,0 @@", lines.len());
    for line in &lines {
        patch.push('\n');
        patch.push('-');
        patch.push_str(line);
    }
    let deletions = lines.len() as u32;
    (Some(patch), 0, deletions)
}

fn git_err(err: git2::Error) -> WispbitError {
    WispbitError::Git(err.message().to_string())
}
