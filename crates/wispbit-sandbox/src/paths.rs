use std::path::{Component, Path, PathBuf};

use wispbit_core::{Result, WispbitError};

/// Resolve a user-supplied path against the workspace root, rejecting
/// anything that escapes it.
///
/// Resolution is lexical: `.` segments are dropped and `..` pops, so the
/// target does not need to exist. Containment is checked component-wise
/// against the root, never by substring comparison.
///
/// # Errors
///
/// Returns [`WispbitError::Input`] when the resolved path is outside the
/// workspace root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use wispbit_sandbox::resolve_workspace_path;
///
/// let root = Path::new("/workspace");
/// let ok = resolve_workspace_path(root, "src/main.rs").unwrap();
/// assert_eq!(ok, Path::new("/workspace/src/main.rs"));
///
/// assert!(resolve_workspace_path(root, "../etc/passwd").is_err());
/// assert!(resolve_workspace_path(root, "/etc/passwd").is_err());
/// ```
pub fn resolve_workspace_path(root: &Path, user_path: &str) -> Result<PathBuf> {
    let candidate = Path::new(user_path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let normalized = normalize(&joined);
    if !normalized.starts_with(root) {
        return Err(WispbitError::Input(format!(
            "path {user_path:?} is outside the workspace"
        )));
    }
    Ok(normalized)
}

/// Lexically normalize a path: drop `.`, apply `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a resolved path back as a workspace-relative string with
/// forward slashes.
pub(crate) fn workspace_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
