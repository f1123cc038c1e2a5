use std::path::PathBuf;

use crate::error::Result;

/// Version-control operations the pipeline needs against its working tree.
///
/// Any failing operation aborts the run. Nothing already done in the same
/// run is rolled back.
pub trait VcsClient {
    /// Fetches a single revision (commit or branch name) at depth 1.
    fn shallow_fetch(&self, revision: &str) -> Result<()>;

    /// Creates `name` at `at_revision`, or resets it there if it already exists.
    ///
    /// Any local state of a branch with the same name is discarded.
    fn checkout_branch(&self, name: &str, at_revision: &str) -> Result<()>;

    /// Unified diff between two revisions with `context_lines` of context.
    fn diff(&self, base: &str, head: &str, context_lines: u32) -> Result<String>;

    fn configure_identity(&self, name: &str, email: &str) -> Result<()>;

    /// Stages every change in the working tree except the `exclude` paths.
    fn stage_all(&self, exclude: &[PathBuf]) -> Result<()>;

    fn commit(&self, message: &str) -> Result<()>;

    /// Pushes `branch` to the remote, optionally recording it as upstream.
    fn push(&self, branch: &str, set_upstream: bool) -> Result<()>;

    /// Creates `name` from the current HEAD and switches to it.
    fn create_branch(&self, name: &str) -> Result<()>;
}
