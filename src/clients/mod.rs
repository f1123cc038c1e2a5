pub mod anthropic;
pub mod fakes;
pub mod git;
pub mod github;

pub use anthropic::AnthropicTransport;
pub use git::GitCli;
pub use github::GitHubClient;
