mod host;
mod llm;
mod vcs;

pub use host::{CreatedPullRequest, HostApi, PullRequestRef, RepositoryMetadata, ReviewComment};
pub use llm::{LlmRequest, MessageTransport, TransportReply};
pub use vcs::VcsClient;
