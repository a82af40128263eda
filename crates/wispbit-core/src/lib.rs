//! Core types, configuration, and error handling for the wispbit platform.
//!
//! This crate provides the shared foundation used by all other wispbit crates:
//! - [`WispbitError`] — unified error type using `thiserror`
//! - [`WispbitConfig`] — configuration loaded from `.wispbit.toml`
//! - Shared types: [`FileChange`], [`FileStatus`], [`LineReference`], [`Side`],
//!   [`CodebaseRule`], [`Violation`], [`FileAnalysis`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{LlmConfig, ReviewConfig, WispbitConfig};
pub use error::WispbitError;
pub use types::{
    sha256_hex, CodebaseRule, FileAnalysis, FileChange, FileStatus, LineReference, OutputFormat,
    RejectedViolation, Side, Violation,
};

/// A convenience `Result` type for wispbit operations.
pub type Result<T> = std::result::Result<T, WispbitError>;
