use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::data::{PullRequestRef, VcsClient};
use crate::error::Result;

pub const DEFAULT_DIFF_CAP: usize = 150_000;

/// Size-bounded change context handed to the model.
///
/// The text is always an exact prefix of the full diff. Whether a cut happened
/// is tracked here rather than embedded in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffContext {
    text: String,
    original_chars: usize,
    cap: usize,
}

impl DiffContext {
    pub fn new(full_diff: &str, cap: usize) -> Self {
        Self {
            text: truncate_chars(full_diff, cap).to_string(),
            original_chars: full_diff.chars().count(),
            cap,
        }
    }

    /// Context for runs that have no base/head pair, such as issue work.
    pub fn empty() -> Self {
        Self::new("", DEFAULT_DIFF_CAP)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_truncated(&self) -> bool {
        self.original_chars > self.cap
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn original_chars(&self) -> usize {
        self.original_chars
    }
}

/// First `cap` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, cap: usize) -> &str {
    match text.char_indices().nth(cap) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Generates the zero-context diff for `pr`, persists it in full to
/// `artifact`, and returns the capped context.
pub fn collect_diff<V: VcsClient>(
    vcs: &V,
    pr: &PullRequestRef,
    cap: usize,
    artifact: &Path,
) -> Result<DiffContext> {
    let diff = vcs.diff(&pr.base_revision, &pr.head_revision, 0)?;

    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(artifact, &diff)?;

    let context = DiffContext::new(&diff, cap);
    if context.is_truncated() {
        warn!(
            original_chars = context.original_chars(),
            cap,
            "Diff context truncated for the prompt"
        );
    } else {
        debug!(chars = context.original_chars(), "Diff context collected");
    }

    Ok(context)
}
