//! Workspace-confined tool execution for wispbit reviews.
//!
//! Every tool the review LLM can call runs through [`ToolExecutor`]: paths
//! are resolved against the workspace root and rejected when they escape
//! it, searches run an external ripgrep with a sanitised argv, and the
//! `complaint` sink validates candidate violations against the file's
//! patch before they reach the validator.
//!
//! The executor never writes to the workspace.

mod executor;
mod glob;
mod grep;
mod paths;
mod request;

pub use executor::{CandidateViolation, ToolExecutor, ToolOutcome};
pub use glob::glob_search;
pub use grep::{grep_search, GrepArgs, GrepMatch};
pub use paths::resolve_workspace_path;
pub use request::{
    ComplaintArgs, GlobSearchArgs, ListDirArgs, ReadFileArgs, ToolRequest,
};
