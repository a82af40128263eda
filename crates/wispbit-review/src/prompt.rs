use serde_json::json;

use wispbit_core::{CodebaseRule, FileChange};
use wispbit_llm::ToolDefinition;
use wispbit_patch::add_line_numbers_to_patch;

/// The tool schemas offered to the review model.
///
/// Five tools: four inspection tools and the `complaint` sink that submits
/// candidate violations.
///
/// # Examples
///
/// ```
/// use wispbit_review::tool_definitions;
///
/// let tools = tool_definitions();
/// let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
/// assert_eq!(
///     names,
///     ["read_file", "grep_search", "glob_search", "list_dir", "complaint"]
/// );
/// ```
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "read_file",
            "Read a file from the workspace, either entirely or a 1-indexed inclusive line range.",
            json!({
                "type": "object",
                "properties": {
                    "target_file": {
                        "type": "string",
                        "description": "Workspace-relative path of the file to read"
                    },
                    "should_read_entire_file": {
                        "type": "boolean",
                        "description": "Read the whole file, ignoring the line range"
                    },
                    "start_line_one_indexed": {
                        "type": "integer",
                        "description": "First line to read (1-indexed)"
                    },
                    "end_line_one_indexed_inclusive": {
                        "type": "integer",
                        "description": "Last line to read, inclusive"
                    }
                },
                "required": ["target_file", "should_read_entire_file"]
            }),
        ),
        ToolDefinition::function(
            "grep_search",
            "Regex search across the workspace. Returns at most 50 matches as file:line:content.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Regex to search for" },
                    "include_pattern": {
                        "type": "string",
                        "description": "Glob limiting which files are searched"
                    },
                    "exclude_pattern": {
                        "type": "string",
                        "description": "Glob excluding files from the search"
                    },
                    "case_sensitive": {
                        "type": "boolean",
                        "description": "Match case-sensitively (default: insensitive)"
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::function(
            "glob_search",
            "Find files matching a glob pattern, most recently modified first.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Glob pattern to match" },
                    "path": {
                        "type": "string",
                        "description": "Directory to search under (default: workspace root)"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        ToolDefinition::function(
            "list_dir",
            "List the files and subdirectories of a workspace directory.",
            json!({
                "type": "object",
                "properties": {
                    "relative_workspace_path": {
                        "type": "string",
                        "description": "Workspace-relative directory to list"
                    },
                    "explanation": {
                        "type": "string",
                        "description": "Why this listing helps the review"
                    }
                },
                "required": ["relative_workspace_path"]
            }),
        ),
        ToolDefinition::function(
            "complaint",
            "Report a rule violation in the file under review. Only call this for violations \
             you are certain about; the line range must point at changed lines in the diff.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The file under review"
                    },
                    "line_start": {
                        "type": "integer",
                        "description": "First line of the violating range"
                    },
                    "line_end": {
                        "type": "integer",
                        "description": "Last line of the violating range, inclusive"
                    },
                    "line_side": {
                        "type": "string",
                        "enum": ["right", "left"],
                        "description": "right for added/new line numbers, left for removed/old"
                    },
                    "description": {
                        "type": "string",
                        "description": "What the violation is and why it violates the rule"
                    },
                    "rule_id": {
                        "type": "string",
                        "description": "Id of the violated rule, as given in the rules list"
                    }
                },
                "required": ["file_path", "line_start", "line_end", "line_side",
                             "description", "rule_id"]
            }),
        ),
    ]
}

/// Build the system prompt for a file review conversation.
///
/// Carries the reviewer persona, the rule-reasoning policies, the full
/// list of changed files (so cross-file rules can be reasoned about), and
/// the tool-use policy.
pub fn build_system_prompt(all_files: &[FileChange]) -> String {
    let mut prompt = String::from(
        "You are wispbit, a code reviewer that checks changed files against the \
         codebase rules supplied by the user.\n\
         \n\
         HOW TO REASON ABOUT RULES:\n\
         1. Check the diff against every rule you are given, and only those rules. \
            Do not invent your own standards.\n\
         2. A violation must be concretely visible in the changed lines. Do not \
            speculate about code you have not read.\n\
         3. Use the tools to read surrounding code, search the workspace, and confirm \
            or rule out a suspected violation before reporting it.\n\
         4. Some rules reference other files (naming consistency, missing updates, \
            required registrations). The full list of changed files in this review is \
            below; read the other files when a rule needs them.\n\
         5. Respect the file's status. For an added file every line is new; for a \
            removed file the rules apply to what the deletion breaks, not to the \
            deleted style; for a renamed file check that references were updated.\n\
         6. A rule that clearly cannot apply to this file costs nothing: move on \
            without commentary.\n\
         7. Report a violation by calling the complaint tool once per violation with \
            exact line numbers from the labeled diff: R numbers are right-side (added) \
            lines, L numbers are left-side (removed) lines. The range must stay \
            inside one hunk and touch at least one changed line.\n\
         8. If the complaint tool rejects a call, fix the arguments it complains about \
            and try again, or drop the violation.\n\
         9. When you are done, reply with a short plain-text summary of what you \
            checked instead of calling more tools. Do not restate violations you \
            already reported.\n\
         \n\
         Changed files in this review:\n",
    );
    for file in all_files {
        prompt.push_str(&format!("- {} ({})\n", file.filename, file.status));
    }
    prompt.push_str(
        "\nTOOL POLICY: prefer reading the specific line ranges you need over entire \
         files; search before reading when you do not know where something lives; \
         never guess at file contents.",
    );
    prompt
}

/// Build the user prompt carrying the rules and the numbered diff.
///
/// Each rule is tagged with its id so `complaint` calls can cite it.
pub fn build_review_prompt(file: &FileChange, rules: &[CodebaseRule]) -> String {
    let mut prompt = String::from("Review this file change against the following rules.\n\n");

    for rule in rules {
        prompt.push_str(&format!(
            "<rule id=\"{}\" name=\"{}\">\n{}\n</rule>\n\n",
            rule.id, rule.name, rule.contents
        ));
    }

    let numbered = file
        .patch
        .as_deref()
        .map(add_line_numbers_to_patch)
        .unwrap_or_default();

    prompt.push_str(&format!(
        "File: {}\nStatus: {}\n\nDiff with line numbers (L = old side, R = new side):\n\
         ```\n{}\n```\n",
        file.filename, file.status, numbered
    ));
    prompt
}
