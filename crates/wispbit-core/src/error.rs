use std::path::PathBuf;

/// Everything that can go wrong inside the review pipeline.
///
/// One variant per failure domain: filesystem and git access, malformed
/// inputs, missing files, external tools, the LLM endpoint, and
/// cancellation. Recoverability decisions (what gets fed back to the model
/// versus what fails the file task) key off the variant, so callers match
/// on it rather than on message text.
///
/// # Examples
///
/// ```
/// use wispbit_core::WispbitError;
///
/// let err = WispbitError::Git("no merge base for the requested revisions".into());
/// assert_eq!(
///     err.to_string(),
///     "git failure: no merge base for the requested revisions"
/// );
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WispbitError {
    /// An underlying filesystem operation failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// `.wispbit.toml` or an environment setting is unusable.
    #[error("bad configuration: {0}")]
    Config(String),

    /// A git operation could not complete.
    #[error("git failure: {0}")]
    Git(String),

    /// A diff or rule file did not have the expected shape.
    #[error("failed to parse: {0}")]
    Parse(String),

    /// A rejected input: bad line references, out-of-workspace paths,
    /// missing tool arguments, unknown rule ids.
    #[error("invalid input: {0}")]
    Input(String),

    /// A file or directory requested by a tool call does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An external tool (ripgrep) is missing, failed, or timed out.
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// LLM endpoint error: 4xx/5xx, malformed completion, bad tool-call JSON.
    #[error("provider error: {0}")]
    Provider(String),

    /// The operation was cancelled while in flight.
    #[error("aborted")]
    Aborted,

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration file is not valid TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl WispbitError {
    /// Returns `true` for errors that should be surfaced to the LLM as
    /// tool-result content instead of failing the file task.
    ///
    /// # Examples
    ///
    /// ```
    /// use wispbit_core::WispbitError;
    ///
    /// assert!(WispbitError::Input("bad line ref".into()).is_tool_recoverable());
    /// assert!(!WispbitError::Aborted.is_tool_recoverable());
    /// ```
    pub fn is_tool_recoverable(&self) -> bool {
        matches!(
            self,
            WispbitError::Input(_)
                | WispbitError::NotFound(_)
                | WispbitError::ExternalTool(_)
                | WispbitError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_wrap_transparently() {
        let err: WispbitError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only mount").into();
        assert!(matches!(err, WispbitError::Io(_)));
        assert_eq!(err.to_string(), "filesystem error: read-only mount");
    }

    #[test]
    fn message_variants_render_their_domain() {
        assert_eq!(
            WispbitError::Config("no model configured".into()).to_string(),
            "bad configuration: no model configured"
        );
        assert_eq!(
            WispbitError::Git("merge base not found".into()).to_string(),
            "git failure: merge base not found"
        );
        assert_eq!(
            WispbitError::Parse("truncated hunk header".into()).to_string(),
            "failed to parse: truncated hunk header"
        );
    }

    #[test]
    fn not_found_shows_path() {
        let err = WispbitError::NotFound(PathBuf::from("src/missing.rs"));
        assert!(err.to_string().contains("src/missing.rs"));
    }

    #[test]
    fn aborted_is_not_tool_recoverable() {
        assert!(!WispbitError::Aborted.is_tool_recoverable());
        assert!(!WispbitError::Provider("500".into()).is_tool_recoverable());
    }

    #[test]
    fn tool_facing_errors_are_recoverable() {
        assert!(WispbitError::NotFound(PathBuf::from("x")).is_tool_recoverable());
        assert!(WispbitError::ExternalTool("rg timed out".into()).is_tool_recoverable());
    }
}
