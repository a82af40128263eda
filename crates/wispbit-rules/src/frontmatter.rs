/// The parsed pieces of a rule markdown file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRule {
    /// Patterns from the frontmatter `include` key, in declaration order.
    pub include: Vec<String>,
    /// Everything after the frontmatter block (or the whole file).
    pub body: String,
}

/// Split a rule file into its frontmatter `include` list and markdown body.
///
/// Frontmatter is an optional leading `---`…`---` block; only the `include`
/// key is read. Its value is comma-separated, but commas inside `{…}` brace
/// expansions and inside quoted segments do not split. Each pattern is
/// trimmed and has surrounding quotes stripped.
///
/// # Examples
///
/// ```
/// use wispbit_rules::parse_rule_markdown;
///
/// let parsed = parse_rule_markdown(
///     "---\ninclude: *.{ts,tsx}, \"src/**/*.js\"\n---\nNo console.log calls.",
/// );
/// assert_eq!(parsed.include, vec!["*.{ts,tsx}", "src/**/*.js"]);
/// assert_eq!(parsed.body, "No console.log calls.");
/// ```
pub fn parse_rule_markdown(content: &str) -> ParsedRule {
    let mut lines = content.lines();

    let Some(first) = lines.next() else {
        return ParsedRule::default();
    };
    if first.trim() != "---" {
        return ParsedRule {
            include: Vec::new(),
            body: content.to_string(),
        };
    }

    let mut include = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_frontmatter = true;

    for line in lines {
        if in_frontmatter {
            if line.trim() == "---" {
                in_frontmatter = false;
                continue;
            }
            if let Some(value) = line.trim().strip_prefix("include:") {
                include = split_patterns(value);
            }
            continue;
        }
        body_lines.push(line);
    }

    if in_frontmatter {
        // No closing fence: the whole file is body, not frontmatter.
        return ParsedRule {
            include: Vec::new(),
            body: content.to_string(),
        };
    }

    ParsedRule {
        include,
        body: body_lines.join("\n"),
    }
}

/// Split a comma-separated pattern list, protecting commas inside braces
/// and quoted segments.
fn split_patterns(value: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    let mut current = String::new();
    let mut brace_depth = 0usize;
    let mut quote: Option<char> = None;

    for c in value.chars() {
        match c {
            '"' | '\'' => {
                match quote {
                    Some(q) if q == c => quote = None,
                    None => quote = Some(c),
                    _ => {}
                }
                current.push(c);
            }
            '{' if quote.is_none() => {
                brace_depth += 1;
                current.push(c);
            }
            '}' if quote.is_none() => {
                brace_depth = brace_depth.saturating_sub(1);
                current.push(c);
            }
            ',' if brace_depth == 0 && quote.is_none() => {
                push_pattern(&mut patterns, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_pattern(&mut patterns, &current);

    patterns
}

fn push_pattern(patterns: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let unquoted = strip_quotes(trimmed);
    if !unquoted.is_empty() {
        patterns.push(unquoted.to_string());
    }
}

fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
