//! Locates the requested directive section in the review conversation.
//!
//! A directive is a heading-led section of a review comment, e.g.
//!
//! ```text
//! ## BLOCKERS
//! - null check missing in parse()
//! ## SUGGESTIONS
//! - rename X to Y
//! ```
//!
//! The section runs from the requested keyword up to the next heading of a
//! different section (the other directive kind, `TESTS` or `SUMMARY`) or to
//! the end of the comment.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::data::ReviewComment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Blockers,
    Suggestions,
}

impl DirectiveKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DirectiveKind::Blockers => "BLOCKERS",
            DirectiveKind::Suggestions => "SUGGESTIONS",
        }
    }

    /// Headings that close a section of this kind.
    fn terminators(self) -> [&'static str; 3] {
        match self {
            DirectiveKind::Blockers => ["SUGGESTIONS", "TESTS", "SUMMARY"],
            DirectiveKind::Suggestions => ["BLOCKERS", "TESTS", "SUMMARY"],
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A non-empty directive section taken from a single comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDirective {
    pub kind: DirectiveKind,
    pub text: String,
    pub comment_id: u64,
}

fn heading_re(kind: DirectiveKind) -> &'static Regex {
    static BLOCKERS: OnceLock<Regex> = OnceLock::new();
    static SUGGESTIONS: OnceLock<Regex> = OnceLock::new();
    let cell = match kind {
        DirectiveKind::Blockers => &BLOCKERS,
        DirectiveKind::Suggestions => &SUGGESTIONS,
    };
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?i)(?:#{{1,3}}[ \t]*)?{}", kind.keyword()))
            .expect("valid directive heading regex")
    })
}

fn terminator_re(kind: DirectiveKind) -> &'static Regex {
    static BLOCKERS: OnceLock<Regex> = OnceLock::new();
    static SUGGESTIONS: OnceLock<Regex> = OnceLock::new();
    let cell = match kind {
        DirectiveKind::Blockers => &BLOCKERS,
        DirectiveKind::Suggestions => &SUGGESTIONS,
    };
    cell.get_or_init(|| {
        let alternatives = kind.terminators().join("|");
        Regex::new(&format!(r"(?im)^[ \t]*#{{0,3}}[ \t]*(?:{})", alternatives))
            .expect("valid directive terminator regex")
    })
}

/// Returns the most recently created comment mentioning `kind` anywhere in
/// its body, matched case-insensitively.
///
/// Comments are ordered by creation time (ties broken by id), so the input
/// order does not matter.
pub fn select_latest(comments: &[ReviewComment], kind: DirectiveKind) -> Option<&ReviewComment> {
    let mut ordered: Vec<&ReviewComment> = comments.iter().collect();
    ordered.sort_by_key(|c| (c.created_at, c.id));

    ordered
        .into_iter()
        .rev()
        .find(|c| heading_re(kind).is_match(&c.body))
}

/// Slices the `kind` section out of a comment body.
///
/// Returns `None` when the keyword does not occur. The returned text is
/// trimmed at both ends only.
pub fn extract_section(body: &str, kind: DirectiveKind) -> Option<String> {
    let start = heading_re(kind).find(body)?;
    // find_at keeps the line-start anchor honest: a terminator must begin a line.
    let end = terminator_re(kind)
        .find_at(body, start.end())
        .map(|m| m.start())
        .unwrap_or(body.len());

    Some(body[start.start()..end].trim().to_string())
}

/// Finds the latest comment carrying `kind` and extracts its section.
///
/// `None` means there is nothing to do: no comment matched, or the
/// matched section was empty after trimming.
pub fn extract_directive(comments: &[ReviewComment], kind: DirectiveKind) -> Option<ExtractedDirective> {
    let comment = select_latest(comments, kind)?;
    let text = extract_section(&comment.body, kind)?;
    if text.is_empty() {
        return None;
    }

    Some(ExtractedDirective {
        kind,
        text,
        comment_id: comment.id,
    })
}
