use crate::parser::{split_hunks, LineKind, RawLine};

/// Which change class `filter_diff` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Keep context and added lines; drop deletions.
    Additions,
    /// Keep context and deleted lines; drop additions.
    Deletions,
}

/// Project a unified diff down to context plus one change class.
///
/// Hunk counts are recomputed from the kept lines (old = context +
/// deletions, new = context + additions). Hunks left with no change lines
/// are dropped, and files whose hunks are all dropped disappear entirely,
/// including their metadata lines.
///
/// # Examples
///
/// ```
/// use wispbit_patch::{filter_diff, DiffMode};
///
/// let patch = "@@ -1,5 +1,5 @@\n line1\n-old1\n-old2\n+new1\n+new2\n line6";
/// let additions = filter_diff(patch, DiffMode::Additions);
/// assert_eq!(additions, "@@ -1,2 +1,4 @@\n line1\n+new1\n+new2\n line6");
/// ```
pub fn filter_diff(patch: &str, mode: DiffMode) -> String {
    let mut out: Vec<String> = Vec::new();

    for section in split_file_sections(patch) {
        let mut hunks_out: Vec<String> = Vec::new();

        for hunk in split_hunks(&section.body) {
            if let Some(rendered) = project_hunk(&hunk.lines, mode) {
                hunks_out.push(rendered);
            }
        }

        if hunks_out.is_empty() {
            continue;
        }
        out.extend(section.preamble);
        out.extend(hunks_out);
    }

    out.join("\n")
}

/// Render one hunk with only context plus the selected change class, or
/// `None` when no change line of that class survives.
fn project_hunk(lines: &[RawLine], mode: DiffMode) -> Option<String> {
    let wanted = match mode {
        DiffMode::Additions => LineKind::Addition,
        DiffMode::Deletions => LineKind::Deletion,
    };

    let kept: Vec<&RawLine> = lines
        .iter()
        .filter(|l| l.kind == LineKind::Context || l.kind == wanted)
        .collect();

    if !kept.iter().any(|l| l.kind == wanted) {
        return None;
    }

    let (old_start, old_count) = span_of(kept.iter().filter_map(|l| l.old));
    let (new_start, new_count) = span_of(kept.iter().filter_map(|l| l.new));

    let mut rendered = format!(
        "@@ -{} +{} @@",
        render_span(old_start, old_count),
        render_span(new_start, new_count)
    );
    for line in kept {
        rendered.push('\n');
        rendered.push_str(&line.raw);
    }
    Some(rendered)
}

fn span_of(numbers: impl Iterator<Item = u32>) -> (u32, u32) {
    let mut start = None;
    let mut count = 0u32;
    for n in numbers {
        if start.is_none() {
            start = Some(n);
        }
        count += 1;
    }
    (start.unwrap_or(0), count)
}

fn render_span(start: u32, count: u32) -> String {
    match count {
        0 => "0,0".to_string(),
        1 => start.to_string(),
        _ => format!("{start},{count}"),
    }
}

struct FileSection {
    preamble: Vec<String>,
    body: String,
}

/// Split a possibly multi-file diff into per-file sections, each with its
/// metadata preamble and hunk body.
///
/// A `diff --git` line always opens a new section; a `--- ` line opens one
/// when the current section already contains hunks (the start of the next
/// file in headerless concatenated diffs).
fn split_file_sections(patch: &str) -> Vec<FileSection> {
    let mut sections: Vec<FileSection> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut seen_hunk = false;

    let flush = |sections: &mut Vec<FileSection>,
                 preamble: &mut Vec<String>,
                 body: &mut Vec<&str>,
                 seen_hunk: &mut bool| {
        if !preamble.is_empty() || !body.is_empty() {
            sections.push(FileSection {
                preamble: std::mem::take(preamble),
                body: std::mem::take(body).join("\n"),
            });
        }
        *seen_hunk = false;
    };

    for line in patch.lines() {
        let opens_section = line.starts_with("diff --git ")
            || (line.starts_with("--- ") && seen_hunk);
        if opens_section {
            flush(&mut sections, &mut preamble, &mut body, &mut seen_hunk);
            preamble.push(line.to_string());
            continue;
        }

        if line.starts_with("@@ ") {
            seen_hunk = true;
        }

        if seen_hunk {
            body.push(line);
        } else {
            preamble.push(line.to_string());
        }
    }
    flush(&mut sections, &mut preamble, &mut body, &mut seen_hunk);

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "@@ -1,5 +1,5 @@\n line1\n-old1\n-old2\n+new1\n+new2\n line6";

    #[test]
    fn additions_projection_recomputes_counts() {
        let out = filter_diff(MIXED, DiffMode::Additions);
        assert_eq!(out, "@@ -1,2 +1,4 @@\n line1\n+new1\n+new2\n line6");
    }

    #[test]
    fn deletions_projection_recomputes_counts() {
        let out = filter_diff(MIXED, DiffMode::Deletions);
        assert_eq!(out, "@@ -1,4 +1,2 @@\n line1\n-old1\n-old2\n line6");
    }

    #[test]
    fn projection_is_idempotent() {
        let once = filter_diff(MIXED, DiffMode::Additions);
        let twice = filter_diff(&once, DiffMode::Additions);
        assert_eq!(once, twice);
    }

    #[test]
    fn hunk_without_wanted_class_is_dropped() {
        let patch = "@@ -1,3 +1,2 @@\n a\n-b\n c\n@@ -10,2 +9,3 @@\n x\n+y\n z";
        let additions = filter_diff(patch, DiffMode::Additions);
        assert!(!additions.contains("-b"));
        assert!(additions.contains("+y"));
        assert_eq!(additions.lines().filter(|l| l.starts_with("@@")).count(), 1);
    }

    #[test]
    fn file_with_no_remaining_hunks_is_dropped() {
        let patch = "\
diff --git a/del.rs b/del.rs
--- a/del.rs
+++ b/del.rs
@@ -1,2 +1 @@
 keep
-gone
diff --git a/add.rs b/add.rs
--- a/add.rs
+++ b/add.rs
@@ -1 +1,2 @@
 keep
+fresh";
        let additions = filter_diff(patch, DiffMode::Additions);
        assert!(!additions.contains("del.rs"));
        assert!(additions.contains("add.rs"));
        assert!(additions.contains("+fresh"));
    }

    #[test]
    fn metadata_preserved_for_kept_files() {
        let patch = "\
diff --git a/a.rs b/a.rs
index 111..222 100644
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 ctx
+added";
        let out = filter_diff(patch, DiffMode::Additions);
        assert!(out.starts_with("diff --git a/a.rs b/a.rs"));
        assert!(out.contains("index 111..222 100644"));
        assert!(out.contains("@@ -1 +1,2 @@"));
    }

    #[test]
    fn pure_addition_hunk_in_deletions_mode_vanishes() {
        let patch = "@@ -5,0 +6,3 @@\n+a\n+b\n+c";
        assert_eq!(filter_diff(patch, DiffMode::Deletions), "");
        let additions = filter_diff(patch, DiffMode::Additions);
        assert_eq!(additions, "@@ -0,0 +6,3 @@\n+a\n+b\n+c");
    }

    #[test]
    fn empty_patch_filters_to_empty() {
        assert_eq!(filter_diff("", DiffMode::Additions), "");
    }

    #[test]
    fn single_line_spans_omit_count() {
        let patch = "@@ -1,2 +1,2 @@\n ctx\n-x\n+y";
        let deletions = filter_diff(patch, DiffMode::Deletions);
        assert_eq!(deletions, "@@ -1,2 +1 @@\n ctx\n-x");
    }

    #[test]
    fn headerless_concatenated_files_split_on_minus_header() {
        let patch = "\
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 ctx
+x
--- a/b.rs
+++ b/b.rs
@@ -1,2 +1 @@
 ctx
-y";
        let additions = filter_diff(patch, DiffMode::Additions);
        assert!(additions.contains("+++ b/a.rs"));
        assert!(additions.contains("+x"));
        assert!(!additions.contains("b.rs\n"));
        assert!(!additions.contains("-y"));

        let deletions = filter_diff(patch, DiffMode::Deletions);
        assert!(deletions.contains("+++ b/b.rs"));
        assert!(!deletions.contains("+x"));
    }

    #[test]
    fn bare_empty_context_line_survives_projection() {
        let patch = "@@ -1,3 +1,3 @@\n a\n\n-x\n+y";
        let additions = filter_diff(patch, DiffMode::Additions);
        assert_eq!(additions, "@@ -1,2 +1,3 @@\n a\n\n+y");
    }
}
