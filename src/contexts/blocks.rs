//! Parser for the file/commands block grammar used in model responses.
//!
//! ```text
//! <<<file:relative/path>>>
//! ...full file content...
//! <<<endfile>>>
//!
//! <<<commands>>>
//! one shell command per line
//! <<<endcommands>>>
//! ```
//!
//! Parsing is pure: text in, blocks out. A file block whose closing marker is
//! missing is dropped, and the blocks around it are unaffected.
//!
//! Content cannot contain a line that starts with `<<<file:`. Such a line is
//! read as the opening of a new block: the enclosing block loses its close
//! and is dropped, and the parse resumes from the inner marker. The marker
//! elsewhere on a line is plain content.

use regex::Regex;
use std::sync::OnceLock;

pub const FILE_OPEN: &str = "<<<file:";
pub const MARKER_CLOSE: &str = ">>>";
pub const FILE_END: &str = "<<<endfile>>>";
pub const COMMANDS_OPEN: &str = "<<<commands>>>";
pub const COMMANDS_END: &str = "<<<endcommands>>>";

/// Full replacement content for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResponse {
    /// In order of appearance. Duplicate paths are kept; the later one wins on disk.
    pub files: Vec<FileBlock>,
    pub commands: Option<String>,
}

impl ParsedResponse {
    /// Commands text, or empty when the response had no commands block.
    pub fn commands_text(&self) -> &str {
        self.commands.as_deref().unwrap_or("")
    }
}

fn commands_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<<<commands>>>\n(.*?)\n<<<endcommands>>>").expect("valid commands regex")
    })
}

pub fn parse_response(text: &str) -> ParsedResponse {
    ParsedResponse {
        files: parse_file_blocks(text),
        commands: commands_re()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// Extracts every well-formed file block, in order.
pub fn parse_file_blocks(text: &str) -> Vec<FileBlock> {
    let close = format!("\n{FILE_END}");
    let next_open = format!("\n{FILE_OPEN}");
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(FILE_OPEN) {
        let header_start = cursor + found + FILE_OPEN.len();
        let Some(line_len) = text[header_start..].find('\n') else {
            break;
        };
        let header_nl = header_start + line_len;

        let header = text[header_start..header_nl].trim_end_matches('\r');
        let path = header.strip_suffix(MARKER_CLOSE).map(str::trim).unwrap_or("");
        if path.is_empty() {
            cursor = header_start;
            continue;
        }

        // Searching from the header newline lets an empty body close immediately.
        let body = &text[header_nl..];
        let closing = body.find(&close);
        let interrupted = body.find(&next_open);

        match closing {
            Some(end) if interrupted.is_none_or(|open| end < open) => {
                let content = if end == 0 { "" } else { &body[1..end] };
                blocks.push(FileBlock {
                    path: path.to_string(),
                    content: content.to_string(),
                });
                cursor = header_nl + end + close.len();
            }
            _ => {
                // Unclosed before the next block starts: skip it.
                cursor = header_start;
            }
        }
    }

    blocks
}
