use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WispbitError;

/// Top-level configuration loaded from `.wispbit.toml`.
///
/// Every field has a default so an absent or empty file is valid.
///
/// # Examples
///
/// ```
/// use wispbit_core::WispbitConfig;
///
/// let config = WispbitConfig::default();
/// assert_eq!(config.review.concurrency, 10);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WispbitConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

impl WispbitConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WispbitError::Io`] if the file cannot be read, or
    /// [`WispbitError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use wispbit_core::WispbitConfig;
    ///
    /// let config = WispbitConfig::from_file(Path::new(".wispbit.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, WispbitError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`WispbitError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use wispbit_core::WispbitConfig;
    ///
    /// let config = WispbitConfig::from_toml("[review]\nconcurrency = 4\n").unwrap();
    /// assert_eq!(config.review.concurrency, 4);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, WispbitError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `.wispbit.toml` from `root` if present, otherwise defaults.
    pub fn load_or_default(root: &Path) -> Result<Self, WispbitError> {
        let path = root.join(".wispbit.toml");
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// LLM provider configuration.
///
/// The API key is never stored here; only the name of the environment
/// variable that holds it.
///
/// # Examples
///
/// ```
/// use wispbit_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.api_key_env, "OPENROUTER_API_KEY");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model used for the review conversation.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for the validation pass (defaults to `model`).
    pub validation_model: Option<String>,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            validation_model: None,
        }
    }
}

impl LlmConfig {
    /// The model used for validation calls.
    pub fn validation_model(&self) -> &str {
        self.validation_model.as_deref().unwrap_or(&self.model)
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use wispbit_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.concurrency, 10);
/// assert_eq!(config.max_turns, 24);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Maximum number of files reviewed concurrently (default: 10).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum assistant turns per file conversation (default: 24).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_concurrency() -> usize {
    10
}

fn default_max_turns() -> usize {
    24
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_turns: default_max_turns(),
        }
    }
}
