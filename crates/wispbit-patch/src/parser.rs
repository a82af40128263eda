use std::collections::BTreeSet;

use wispbit_core::{LineReference, Side};

/// Classification of one patch line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Unchanged line present on both sides.
    Context,
    /// Line added on the right side.
    Addition,
    /// Line removed from the left side.
    Deletion,
}

/// One content line of a parsed patch with its per-side line numbers.
///
/// Additions carry only a new-side number, deletions only an old-side
/// number, context lines both.
///
/// # Examples
///
/// ```
/// use wispbit_patch::{parse_patch, LineKind};
///
/// let lines = parse_patch("@@ -1,2 +1,2 @@\n line1\n-old\n+new");
/// assert_eq!(lines.len(), 3);
/// assert_eq!(lines[0].kind, LineKind::Context);
/// assert_eq!((lines[0].old_line, lines[0].new_line), (Some(1), Some(1)));
/// assert_eq!((lines[1].old_line, lines[1].new_line), (Some(2), None));
/// assert_eq!((lines[2].old_line, lines[2].new_line), (None, Some(2)));
/// assert_eq!(lines[2].content, "new");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    /// Old-side line number, absent for additions.
    pub old_line: Option<u32>,
    /// New-side line number, absent for deletions.
    pub new_line: Option<u32>,
    /// Line content without the leading `+`/`-`/space marker.
    pub content: String,
    /// What kind of line this is.
    pub kind: LineKind,
}

/// An inclusive line span on one side of a diff.
///
/// # Examples
///
/// ```
/// use wispbit_patch::LineRange;
///
/// let r = LineRange { start: 3, end: 7 };
/// assert!(r.contains_span(4, 6));
/// assert!(!r.contains_span(6, 8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    /// First line of the span.
    pub start: u32,
    /// Last line of the span, inclusive.
    pub end: u32,
}

impl LineRange {
    /// `true` when the span covers no lines (a zero-count hunk side).
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `true` iff `[start, end]` lies entirely inside this span.
    pub fn contains_span(&self, start: u32, end: u32) -> bool {
        !self.is_empty() && start >= self.start && end <= self.end
    }
}

/// Per-hunk spans for both sides of a patch, in file order.
#[derive(Debug, Clone, Default)]
pub struct HunkRanges {
    /// Old-side span of each hunk.
    pub old: Vec<LineRange>,
    /// New-side span of each hunk.
    pub new: Vec<LineRange>,
}

/// The sets of changed line numbers on each side of a patch.
#[derive(Debug, Clone, Default)]
pub struct ChangedLines {
    /// New-side numbers of added lines.
    pub added: BTreeSet<u32>,
    /// Old-side numbers of removed lines.
    pub removed: BTreeSet<u32>,
}

/// A raw line kept with its original text so emitters can reproduce the
/// patch byte-for-byte.
#[derive(Debug, Clone)]
pub(crate) struct RawLine {
    pub raw: String,
    pub kind: LineKind,
    pub old: Option<u32>,
    pub new: Option<u32>,
}

/// One `@@`-delimited hunk with header-declared spans and classified lines.
#[derive(Debug, Clone)]
pub(crate) struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub lines: Vec<RawLine>,
}

impl Hunk {
    pub fn old_range(&self) -> LineRange {
        span_range(self.old_start, self.old_count)
    }

    pub fn new_range(&self) -> LineRange {
        span_range(self.new_start, self.new_count)
    }

    pub fn side_range(&self, side: Side) -> LineRange {
        match side {
            Side::Left => self.old_range(),
            Side::Right => self.new_range(),
        }
    }
}

fn span_range(start: u32, count: u32) -> LineRange {
    LineRange {
        start,
        end: (start + count).saturating_sub(1),
    }
}

/// Parse a hunk header of the form `@@ -old[,count] +new[,count] @@ ...`.
///
/// Returns `(old_start, old_count, new_start, new_count)`, with missing
/// counts defaulting to 1. Returns `None` for anything malformed.
pub(crate) fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let inner = line.strip_prefix("@@ ")?;
    let end = inner.find(" @@")?;
    let inner = &inner[..end];

    let mut parts = inner.split(' ');
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    if parts.next().is_some() {
        return None;
    }

    let (old_start, old_count) = parse_span(old)?;
    let (new_start, new_count) = parse_span(new)?;
    Some((old_start, old_count, new_start, new_count))
}

fn parse_span(span: &str) -> Option<(u32, u32)> {
    match span.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((span.parse().ok()?, 1)),
    }
}

/// Split a single-file patch into classified hunks.
///
/// Lines before the first `@@` are ignored, `\ No newline at end of file`
/// markers are dropped, and a bare empty line inside a hunk counts as a
/// context line (git emits those for blank context).
pub(crate) fn split_hunks(patch: &str) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut old_cursor = 0u32;
    let mut new_cursor = 0u32;

    for line in patch.lines() {
        if line.starts_with("@@ ") {
            if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
                if let Some(done) = current.take() {
                    hunks.push(done);
                }
                old_cursor = old_start;
                new_cursor = new_start;
                current = Some(Hunk {
                    old_start,
                    old_count,
                    new_start,
                    new_count,
                    lines: Vec::new(),
                });
            }
            continue;
        }

        let Some(hunk) = current.as_mut() else {
            continue;
        };

        if line.starts_with('\\') {
            continue;
        }

        let (kind, old, new) = if line.starts_with('+') {
            let n = new_cursor;
            new_cursor += 1;
            (LineKind::Addition, None, Some(n))
        } else if line.starts_with('-') {
            let o = old_cursor;
            old_cursor += 1;
            (LineKind::Deletion, Some(o), None)
        } else if line.starts_with(' ') || line.is_empty() {
            let o = old_cursor;
            let n = new_cursor;
            old_cursor += 1;
            new_cursor += 1;
            (LineKind::Context, Some(o), Some(n))
        } else {
            // Metadata that leaked between hunks; not part of any side.
            continue;
        };

        hunk.lines.push(RawLine {
            raw: line.to_string(),
            kind,
            old,
            new,
        });
    }

    if let Some(done) = current.take() {
        hunks.push(done);
    }
    hunks
}

pub(crate) fn strip_marker(raw: &str) -> &str {
    if raw.is_empty() {
        raw
    } else {
        &raw[1..]
    }
}

/// Parse a unified diff into its content lines with per-side numbering.
///
/// Walking each hunk: an addition yields `(None, new, content)` and
/// advances the new cursor, a deletion yields `(old, None, content)` and
/// advances the old cursor, and a context line yields both numbers and
/// advances both. `\ No newline at end of file` is skipped, and anything
/// before the first hunk header is ignored.
///
/// # Examples
///
/// ```
/// use wispbit_patch::parse_patch;
///
/// assert!(parse_patch("").is_empty());
/// assert!(parse_patch("no hunks here").is_empty());
/// ```
pub fn parse_patch(patch: &str) -> Vec<PatchLine> {
    split_hunks(patch)
        .into_iter()
        .flat_map(|hunk| hunk.lines)
        .map(|line| PatchLine {
            old_line: line.old,
            new_line: line.new,
            content: strip_marker(&line.raw).to_string(),
            kind: line.kind,
        })
        .collect()
}

/// Collect the changed line numbers on each side of a patch.
///
/// # Examples
///
/// ```
/// use wispbit_patch::changed_lines;
///
/// let changed = changed_lines("@@ -1,2 +1,2 @@\n line1\n-old\n+new");
/// assert!(changed.removed.contains(&2));
/// assert!(changed.added.contains(&2));
/// assert_eq!(changed.added.len(), 1);
/// ```
pub fn changed_lines(patch: &str) -> ChangedLines {
    let mut changed = ChangedLines::default();
    for line in parse_patch(patch) {
        match line.kind {
            LineKind::Addition => {
                if let Some(n) = line.new_line {
                    changed.added.insert(n);
                }
            }
            LineKind::Deletion => {
                if let Some(o) = line.old_line {
                    changed.removed.insert(o);
                }
            }
            LineKind::Context => {}
        }
    }
    changed
}

/// Compute the header-declared span of every hunk on both sides.
///
/// A missing count defaults to 1; a zero count produces an empty span.
///
/// # Examples
///
/// ```
/// use wispbit_patch::hunk_ranges;
///
/// let ranges = hunk_ranges("@@ -1,5 +1,6 @@\n line1");
/// assert_eq!(ranges.old[0].start, 1);
/// assert_eq!(ranges.old[0].end, 5);
/// assert_eq!(ranges.new[0].end, 6);
/// ```
pub fn hunk_ranges(patch: &str) -> HunkRanges {
    let mut ranges = HunkRanges::default();
    for hunk in split_hunks(patch) {
        ranges.old.push(hunk.old_range());
        ranges.new.push(hunk.new_range());
    }
    ranges
}

/// Validate a line reference against a patch.
///
/// A reference is valid iff it is fully contained in at least one hunk span
/// on its side and at least one line in the range is a changed line on that
/// side (added for `right`, removed for `left`). References touching only
/// context lines are rejected, as are empty and header-less patches.
///
/// # Examples
///
/// ```
/// use wispbit_core::{LineReference, Side};
/// use wispbit_patch::is_line_reference_valid_for_patch;
///
/// let patch = "@@ -1,5 +1,6 @@\n line1\n-line2\n+new line\n line3\n line4\n line5";
/// let valid = LineReference { start: 2, end: 2, side: Side::Right };
/// let outside = LineReference { start: 10, end: 10, side: Side::Right };
/// let context_only = LineReference { start: 3, end: 5, side: Side::Right };
/// assert!(is_line_reference_valid_for_patch(&valid, patch));
/// assert!(!is_line_reference_valid_for_patch(&outside, patch));
/// assert!(!is_line_reference_valid_for_patch(&context_only, patch));
/// ```
pub fn is_line_reference_valid_for_patch(reference: &LineReference, patch: &str) -> bool {
    if !reference.is_well_formed() {
        return false;
    }

    let hunks = split_hunks(patch);
    if hunks.is_empty() {
        return false;
    }

    let contained = hunks
        .iter()
        .any(|h| h.side_range(reference.side).contains_span(reference.start, reference.end));
    if !contained {
        return false;
    }

    let changed = changed_lines(patch);
    let set = match reference.side {
        Side::Left => &changed.removed,
        Side::Right => &changed.added,
    };
    set.range(reference.start..=reference.end).next().is_some()
}
