use chrono::{DateTime, Utc};

use crate::error::Result;

/// The pull request a run operates on. Resolved once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub number: u64,
    pub base_revision: String,
    pub head_revision: String,
    pub head_branch: String,
    pub base_branch: String,
}

/// A comment on the pull request conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub id: u64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMetadata {
    pub default_branch: String,
}

/// Read/write access to the code host's pull request API.
///
/// Every non-success response is an error; implementations never retry.
pub trait HostApi {
    /// Fetches the pull request with the given number.
    fn get_pull_request(&self, number: u64) -> Result<PullRequestRef>;

    /// Returns the first page of conversation comments.
    ///
    /// Only one page is ever requested. Callers must not assume the list
    /// is exhaustive for very long conversations.
    fn list_comments(&self, number: u64) -> Result<Vec<ReviewComment>>;

    fn post_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Opens a pull request from `head` into `base`.
    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedPullRequest>;

    fn repository_metadata(&self) -> Result<RepositoryMetadata>;
}
