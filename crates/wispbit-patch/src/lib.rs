//! Unified-diff analysis for wispbit.
//!
//! Everything here is pure: parsing a patch into per-line old/new mappings,
//! validating line references against it, extracting hunks with context,
//! rendering line-numbered patches, and projecting a diff down to only its
//! additions or only its deletions.
//!
//! Line numbers follow the two-sided convention used by review comments:
//! `left` is pre-change (old) numbering, `right` is post-change (new)
//! numbering.

mod extract;
mod parser;
mod project;
mod render;

pub use extract::{extract_diff_hunk, DEFAULT_CONTEXT};
pub use parser::{
    changed_lines, hunk_ranges, is_line_reference_valid_for_patch, parse_patch, ChangedLines,
    HunkRanges, LineKind, LineRange, PatchLine,
};
pub use project::{filter_diff, DiffMode};
pub use render::add_line_numbers_to_patch;
