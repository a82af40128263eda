use wispbit_core::Side;

use crate::parser::{split_hunks, Hunk};

/// Context lines kept on each side of an extracted range.
pub const DEFAULT_CONTEXT: u32 = 3;

/// Extract the hunk containing `[start, end]` on `side`, trimmed to the
/// target range plus `context` lines, with a rebuilt header.
///
/// The first hunk (in file order) whose header span fully contains the
/// range is used. Change lines that only exist on the opposite side are
/// kept when they sit inside or adjacent to the kept window, so deletions
/// remain visible around a right-side target and vice versa. The rebuilt
/// header's spans are recomputed from the kept lines: a one-line span is
/// written without the count, an empty side as `0,0`.
///
/// Returns the empty string when no hunk contains the range.
///
/// # Examples
///
/// ```
/// use wispbit_core::Side;
/// use wispbit_patch::extract_diff_hunk;
///
/// let patch = "@@ -1,5 +1,6 @@\n line1\n-line2\n+new line\n line3\n line4\n line5";
/// let hunk = extract_diff_hunk(patch, 2, 2, Side::Right, 1);
/// assert_eq!(hunk, "@@ -1,3 +1,3 @@\n line1\n-line2\n+new line\n line3");
///
/// assert_eq!(extract_diff_hunk(patch, 40, 41, Side::Right, 3), "");
/// ```
pub fn extract_diff_hunk(patch: &str, start: u32, end: u32, side: Side, context: u32) -> String {
    let hunks = split_hunks(patch);
    let Some(hunk) = hunks
        .iter()
        .find(|h| h.side_range(side).contains_span(start, end))
    else {
        return String::new();
    };

    let window_start = start.saturating_sub(context);
    let window_end = end.saturating_add(context);

    let kept = keep_window(hunk, side, window_start, window_end);
    if kept.is_empty() {
        return String::new();
    }

    let (old_start, old_count) = side_span(kept.iter().filter_map(|l| l.0));
    let (new_start, new_count) = side_span(kept.iter().filter_map(|l| l.1));

    let mut out = format!(
        "@@ -{} +{} @@",
        render_span(old_start, old_count),
        render_span(new_start, new_count)
    );
    for (_, _, raw) in kept {
        out.push('\n');
        out.push_str(raw);
    }
    out
}

/// Select the hunk lines inside `[window_start, window_end]` on `side`.
///
/// Returns `(old, new, raw)` triples in hunk order. A line with no number
/// on the requested side occupies the gap before the next same-side line;
/// it is kept when that gap touches the window.
fn keep_window(
    hunk: &Hunk,
    side: Side,
    window_start: u32,
    window_end: u32,
) -> Vec<(Option<u32>, Option<u32>, &str)> {
    let mut kept = Vec::new();
    let mut next_cursor = match side {
        Side::Left => hunk.old_start,
        Side::Right => hunk.new_start,
    };

    for line in &hunk.lines {
        let side_number = match side {
            Side::Left => line.old,
            Side::Right => line.new,
        };
        let keep = match side_number {
            Some(n) => {
                next_cursor = n + 1;
                n >= window_start && n <= window_end
            }
            None => next_cursor >= window_start && next_cursor <= window_end.saturating_add(1),
        };
        if keep {
            kept.push((line.old, line.new, line.raw.as_str()));
        }
    }
    kept
}

fn side_span(numbers: impl Iterator<Item = u32>) -> (u32, u32) {
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
