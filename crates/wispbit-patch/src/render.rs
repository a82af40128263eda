use crate::parser::parse_hunk_header;

/// Prefix every content line of a patch with its actual file line numbers.
///
/// Deletions are labeled `L<old>`, additions `    R<new>`, context lines
/// `L<old> R<new>`. Hunk headers and metadata lines pass through
/// unmodified. The output is a pure function of the input, so repeated
/// calls produce identical text.
///
/// # Examples
///
/// ```
/// use wispbit_patch::add_line_numbers_to_patch;
///
/// let numbered = add_line_numbers_to_patch("@@ -1,2 +1,2 @@\n ctx\n-old\n+new");
/// assert_eq!(
///     numbered,
///     "@@ -1,2 +1,2 @@\nL1 R1  ctx\nL2 -old\n    R2 +new"
/// );
/// ```
pub fn add_line_numbers_to_patch(patch: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_hunk = false;
    let mut old_cursor = 0u32;
    let mut new_cursor = 0u32;

    for line in patch.lines() {
        if line.starts_with("@@ ") {
            if let Some((old_start, _, new_start, _)) = parse_hunk_header(line) {
                in_hunk = true;
                old_cursor = old_start;
                new_cursor = new_start;
                out.push(line.to_string());
                continue;
            }
        }

        if !in_hunk {
            out.push(line.to_string());
            continue;
        }

        if line.starts_with('\\') {
            out.push(line.to_string());
            continue;
        }

        if line.starts_with('+') {
            out.push(format!("    R{new_cursor} {line}"));
            new_cursor += 1;
        } else if line.starts_with('-') {
            out.push(format!("L{old_cursor} {line}"));
            old_cursor += 1;
        } else if line.starts_with(' ') || line.is_empty() {
            out.push(format!("L{old_cursor} R{new_cursor} {line}"));
            old_cursor += 1;
            new_cursor += 1;
        } else {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}
