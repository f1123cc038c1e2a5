//! In-memory fakes for the client traits (testing only)
//!
//! `RecordingVcs`, `FakeHost` and `ScriptedTransport` satisfy the trait
//! contracts without a repository, a network or credentials, and record
//! every call so tests can assert on what a run did.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use crate::data::{
    CreatedPullRequest, HostApi, LlmRequest, MessageTransport, PullRequestRef, RepositoryMetadata,
    ReviewComment, TransportReply, VcsClient,
};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// RecordingVcs
// ---------------------------------------------------------------------------

/// One recorded version-control call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsOp {
    Fetch(String),
    Checkout { name: String, at: String },
    Diff { base: String, head: String, context_lines: u32 },
    Identity { name: String, email: String },
    StageAll { exclude: Vec<PathBuf> },
    Commit(String),
    Push { branch: String, set_upstream: bool },
    CreateBranch(String),
}

impl VcsOp {
    fn name(&self) -> &'static str {
        match self {
            VcsOp::Fetch(_) => "fetch",
            VcsOp::Checkout { .. } => "checkout",
            VcsOp::Diff { .. } => "diff",
            VcsOp::Identity { .. } => "config",
            VcsOp::StageAll { .. } => "add",
            VcsOp::Commit(_) => "commit",
            VcsOp::Push { .. } => "push",
            VcsOp::CreateBranch(_) => "branch",
        }
    }
}

/// Records every call; returns a fixed diff. Can be told to fail one
/// operation by name (`fetch`, `checkout`, `diff`, `config`, `add`,
/// `commit`, `push`, `branch`).
#[derive(Debug, Default)]
pub struct RecordingVcs {
    diff: String,
    fail_on: Option<&'static str>,
    ops: Mutex<Vec<VcsOp>>,
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = diff.into();
        self
    }

    pub fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn ops(&self) -> Vec<VcsOp> {
        self.ops.lock().unwrap().clone()
    }

    /// True when any mutating call (commit, push, branch creation) was made.
    pub fn mutated(&self) -> bool {
        self.ops().iter().any(|op| {
            matches!(
                op,
                VcsOp::StageAll { .. } | VcsOp::Commit(_) | VcsOp::Push { .. } | VcsOp::CreateBranch(_)
            )
        })
    }

    fn record(&self, op: VcsOp) -> Result<()> {
        let name = op.name();
        self.ops.lock().unwrap().push(op);
        if self.fail_on == Some(name) {
            return Err(PipelineError::Vcs {
                command: name.to_string(),
                stderr: format!("injected {} failure", name),
            });
        }
        Ok(())
    }
}

impl VcsClient for RecordingVcs {
    fn shallow_fetch(&self, revision: &str) -> Result<()> {
        self.record(VcsOp::Fetch(revision.to_string()))
    }

    fn checkout_branch(&self, name: &str, at_revision: &str) -> Result<()> {
        self.record(VcsOp::Checkout {
            name: name.to_string(),
            at: at_revision.to_string(),
        })
    }

    fn diff(&self, base: &str, head: &str, context_lines: u32) -> Result<String> {
        self.record(VcsOp::Diff {
            base: base.to_string(),
            head: head.to_string(),
            context_lines,
        })?;
        Ok(self.diff.clone())
    }

    fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.record(VcsOp::Identity {
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    fn stage_all(&self, exclude: &[PathBuf]) -> Result<()> {
        self.record(VcsOp::StageAll {
            exclude: exclude.to_vec(),
        })
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.record(VcsOp::Commit(message.to_string()))
    }

    fn push(&self, branch: &str, set_upstream: bool) -> Result<()> {
        self.record(VcsOp::Push {
            branch: branch.to_string(),
            set_upstream,
        })
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.record(VcsOp::CreateBranch(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// A pull request opened through [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// Pull request with fixed revisions: `base000` on `main`, `head111` on
/// `feature/work`.
pub fn sample_pull_request(number: u64) -> PullRequestRef {
    PullRequestRef {
        number,
        base_revision: "base000".to_string(),
        head_revision: "head111".to_string(),
        head_branch: "feature/work".to_string(),
        base_branch: "main".to_string(),
    }
}

/// Host holding a single pull request and its comments.
#[derive(Debug)]
pub struct FakeHost {
    pull_request: Option<PullRequestRef>,
    comments: Vec<ReviewComment>,
    default_branch: String,
    next_number: u64,
    posted: Mutex<Vec<(u64, String)>>,
    opened: Mutex<Vec<OpenedPullRequest>>,
    metadata_reads: Mutex<usize>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            pull_request: None,
            comments: Vec::new(),
            default_branch: "main".to_string(),
            next_number: 100,
            posted: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            metadata_reads: Mutex::new(0),
        }
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pull_request(mut self, pr: PullRequestRef) -> Self {
        self.pull_request = Some(pr);
        self
    }

    /// Appends a comment created one minute after the previous one.
    pub fn with_comment(mut self, body: impl Into<String>) -> Self {
        let index = self.comments.len() as i64;
        self.comments.push(ReviewComment {
            id: 1000 + index as u64,
            body: body.into(),
            created_at: epoch() + Duration::minutes(index),
        });
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn posted_comments(&self) -> Vec<(u64, String)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn opened_pull_requests(&self) -> Vec<OpenedPullRequest> {
        self.opened.lock().unwrap().clone()
    }

    pub fn metadata_reads(&self) -> usize {
        *self.metadata_reads.lock().unwrap()
    }
}

impl HostApi for FakeHost {
    fn get_pull_request(&self, number: u64) -> Result<PullRequestRef> {
        self.pull_request
            .clone()
            .filter(|pr| pr.number == number)
            .ok_or_else(|| PipelineError::UpstreamApi {
                service: "GitHub",
                status: 404,
                body: r#"{"message":"Not Found"}"#.to_string(),
            })
    }

    fn list_comments(&self, _number: u64) -> Result<Vec<ReviewComment>> {
        Ok(self.comments.clone())
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        self.posted.lock().unwrap().push((number, body.to_string()));
        Ok(())
    }

    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedPullRequest> {
        let mut opened = self.opened.lock().unwrap();
        opened.push(OpenedPullRequest {
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        let number = self.next_number + opened.len() as u64 - 1;
        Ok(CreatedPullRequest {
            number,
            html_url: format!("https://github.com/acme/widgets/pull/{}", number),
        })
    }

    fn repository_metadata(&self) -> Result<RepositoryMetadata> {
        *self.metadata_reads.lock().unwrap() += 1;
        Ok(RepositoryMetadata {
            default_branch: self.default_branch.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// Replies with a fixed sequence of `(status, body)` pairs, one per request.
/// Once the script is exhausted every request gets a 500.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<(u16, String)>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One successful reply whose text is `text`.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![(200, anthropic_body(&[text]))])
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MessageTransport for ScriptedTransport {
    fn send(&self, request: &LlmRequest) -> Result<TransportReply> {
        self.requests.lock().unwrap().push(request.clone());
        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, "no scripted reply left".to_string()));
        Ok(TransportReply { status, body })
    }
}

/// A messages-API success body with one text segment per entry.
pub fn anthropic_body(texts: &[&str]) -> String {
    let content: Vec<_> = texts
        .iter()
        .map(|text| json!({ "type": "text", "text": text }))
        .collect();
    json!({
        "id": "msg_fake",
        "type": "message",
        "role": "assistant",
        "content": content,
        "stop_reason": "end_turn",
    })
    .to_string()
}
