//! Works out what a run targets from explicit input and the triggering
//! event payload.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// The subset of a webhook event payload the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub pull_request: Option<EventPullRequest>,
    #[serde(default)]
    pub issue: Option<EventIssue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPullRequest {
    pub number: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Present only when the issue is a pull request conversation.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl EventPayload {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read event payload {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// An issue to implement, taken from an issue event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
}

/// Resolves the pull request number.
///
/// An explicit value wins and must be all digits. Otherwise the event's
/// `pull_request.number` is used, then `issue.number` when that issue is a
/// pull request conversation.
pub fn resolve_pr_number(explicit: Option<&str>, event: Option<&EventPayload>) -> Result<u64> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(PipelineError::Resolution(format!(
                "PR number '{}' is not a positive integer",
                raw
            )));
        }
        return raw
            .parse::<u64>()
            .map_err(|e| PipelineError::Resolution(format!("PR number '{}': {}", raw, e)));
    }

    let from_event = event.and_then(|event| {
        event.pull_request.as_ref().map(|pr| pr.number).or_else(|| {
            event
                .issue
                .as_ref()
                .filter(|issue| issue.pull_request.is_some())
                .map(|issue| issue.number)
        })
    });

    from_event.ok_or_else(|| {
        PipelineError::Resolution(
            "no PR number given and none found in the event payload; pass --pr-number or run on a \
             pull_request / issue_comment event"
                .to_string(),
        )
    })
}

/// Reads the issue to implement from an issue event.
///
/// A missing body is treated as empty; the pipeline turns that into a no-op.
pub fn resolve_issue(event: &EventPayload) -> Result<IssueRequest> {
    let issue = event.issue.as_ref().ok_or_else(|| {
        PipelineError::Resolution("event payload has no issue; run on an issues event".to_string())
    })?;

    Ok(IssueRequest {
        number: issue.number,
        title: issue.title.clone(),
        body: issue.body.clone().unwrap_or_default(),
    })
}
