//! Prompt rendering for the three kinds of run.
//!
//! Directive text and diff context are embedded verbatim. The model is the
//! only interpreter of intent, so nothing here rewrites, reorders or
//! summarizes what the reviewer wrote.

use super::blocks::{COMMANDS_END, COMMANDS_OPEN, FILE_END, FILE_OPEN, MARKER_CLOSE};
use super::diff_context::DiffContext;
use super::directive::DirectiveKind;

/// Output contract shared by every prompt. Built from the same markers the
/// response parser matches on.
pub fn output_format() -> String {
    format!(
        "Return files in EXACT format:\n\
         {FILE_OPEN}relative/path{MARKER_CLOSE}\n\
         ...full file content...\n\
         {FILE_END}\n\
         \n\
         (Repeat per file)\n\
         \n\
         Optionally, finish with shell commands to run afterwards:\n\
         {COMMANDS_OPEN}\n\
         one shell command per line\n\
         {COMMANDS_END}"
    )
}

fn diff_heading(diff: &DiffContext) -> String {
    if diff.is_truncated() {
        format!(
            "DIFF (base..head, unified=0, truncated to the first {} of {} characters):",
            diff.cap(),
            diff.original_chars()
        )
    } else {
        "DIFF (base..head, unified=0):".to_string()
    }
}

/// Prompt asking the model to act on exactly one directive section.
pub fn directive_prompt(
    kind: DirectiveKind,
    pr_number: u64,
    directive_text: &str,
    diff: &DiffContext,
) -> String {
    let preamble = match kind {
        DirectiveKind::Blockers => format!(
            "You are a senior engineer. FIX ONLY the BLOCKERS listed below for PR #{pr_number}, \
             and return files in blocks.\n\
             \n\
             Constraints:\n\
             - Modify only what's needed to resolve the blockers.\n\
             - Keep structure & conventions.\n\
             - Do NOT include explanations. Return only files in blocks."
        ),
        DirectiveKind::Suggestions => format!(
            "You are a senior engineer. APPLY ONLY the SUGGESTIONS listed below for PR #{pr_number}.\n\
             Do not change behavior beyond the suggestions.\n\
             Return only the changed files in exact block format."
        ),
    };

    format!(
        "{preamble}\n\n{keyword}:\n{directive_text}\n\n{heading}\n{diff_text}\n\n{format}",
        keyword = kind.keyword(),
        heading = diff_heading(diff),
        diff_text = diff.text(),
        format = output_format(),
    )
}

/// Prompt for implementing an issue body as a spec card.
pub fn issue_prompt(issue_number: u64, title: &str, body: &str) -> String {
    format!(
        "Implement the SPEC CARD from issue #{issue_number} ({title}) by returning a set of files.\n\
         Return complete file contents, NO explanations.\n\
         \n\
         {format}\n\
         \n\
         SPEC:\n\
         \n\
         {body}",
        format = output_format(),
    )
}
