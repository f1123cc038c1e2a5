//! `HostApi` over the GitHub REST API.

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::Repository;
use crate::data::{CreatedPullRequest, HostApi, PullRequestRef, RepositoryMetadata, ReviewComment};
use crate::error::{PipelineError, Result};

/// Comments requested in the single page that is read.
pub const COMMENTS_PAGE_SIZE: u32 = 100;

const USER_AGENT: &str = concat!("prfix/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    head: BranchPayload,
    base: BranchPayload,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    sha: String,
    #[serde(rename = "ref", default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CreatedPayload {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    default_branch: String,
}

pub fn parse_pull_request(body: &str) -> Result<PullRequestRef> {
    let payload: PullRequestPayload = serde_json::from_str(body)?;
    Ok(PullRequestRef {
        number: payload.number,
        base_revision: payload.base.sha,
        head_revision: payload.head.sha,
        head_branch: payload.head.name,
        base_branch: payload.base.name,
    })
}

/// Comments in the order the API returned them (oldest first).
pub fn parse_comments(body: &str) -> Result<Vec<ReviewComment>> {
    let payload: Vec<CommentPayload> = serde_json::from_str(body)?;
    Ok(payload
        .into_iter()
        .map(|c| ReviewComment {
            id: c.id,
            body: c.body.unwrap_or_default(),
            created_at: c.created_at,
        })
        .collect())
}

/// Blocking GitHub client with bearer-token auth. Never retries.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
    repository: Repository,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: &str, repository: Repository) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repository,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url, self.repository.owner, self.repository.name, path
        )
    }

    /// Sends the request; any non-2xx status becomes an `UpstreamApi` error.
    fn execute(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), bytes = body.len(), "GitHub response");

        if !status.is_success() {
            return Err(PipelineError::UpstreamApi {
                service: "GitHub",
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl HostApi for GitHubClient {
    fn get_pull_request(&self, number: u64) -> Result<PullRequestRef> {
        let url = self.repo_url(&format!("/pulls/{}", number));
        let body = self.execute(self.client.get(&url))?;
        parse_pull_request(&body)
    }

    fn list_comments(&self, number: u64) -> Result<Vec<ReviewComment>> {
        let url = self.repo_url(&format!(
            "/issues/{}/comments?per_page={}",
            number, COMMENTS_PAGE_SIZE
        ));
        let body = self.execute(self.client.get(&url))?;
        parse_comments(&body)
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&format!("/issues/{}/comments", number));
        self.execute(self.client.post(&url).json(&json!({ "body": body })))?;
        Ok(())
    }

    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedPullRequest> {
        let url = self.repo_url("/pulls");
        let payload = json!({
            "title": title,
            "head": head,
            "base": base,
            "body": body,
        });
        let response = self.execute(self.client.post(&url).json(&payload))?;
        let created: CreatedPayload = serde_json::from_str(&response)?;
        Ok(CreatedPullRequest {
            number: created.number,
            html_url: created.html_url,
        })
    }

    fn repository_metadata(&self) -> Result<RepositoryMetadata> {
        let body = self.execute(self.client.get(self.repo_url("")))?;
        let payload: RepositoryPayload = serde_json::from_str(&body)?;
        Ok(RepositoryMetadata {
            default_branch: payload.default_branch,
        })
    }
}
