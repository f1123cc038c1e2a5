//! Run configuration, validated once at startup and passed down explicitly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::contexts::{DEFAULT_DIFF_CAP, DEFAULT_MAX_TOKENS, DirectiveKind};
use crate::error::{PipelineError, Result};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_ARTIFACTS_DIR: &str = ".prfix";
pub const DEFAULT_MODELS_FILE: &str = ".github/prfix-models.yml";
pub const DEFAULT_REMOTE: &str = "origin";
pub const BOT_EMAIL: &str = "bot@users.noreply.github.com";

/// The automation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    FixBlockers,
    ApplySuggestions,
    ImplementIssue,
}

impl Task {
    pub fn directive_kind(self) -> Option<DirectiveKind> {
        match self {
            Task::FixBlockers => Some(DirectiveKind::Blockers),
            Task::ApplySuggestions => Some(DirectiveKind::Suggestions),
            Task::ImplementIssue => None,
        }
    }

    /// Key used in the model registry file.
    pub fn registry_key(self) -> &'static str {
        match self {
            Task::FixBlockers => "fix_blockers",
            Task::ApplySuggestions => "apply_suggestions",
            Task::ImplementIssue => "implement_issue",
        }
    }

    pub fn default_identity(self) -> CommitIdentity {
        let name = match self {
            Task::FixBlockers => "ai-fixer",
            Task::ApplySuggestions => "ai-suggester",
            Task::ImplementIssue => "ai-implementer",
        };
        CommitIdentity {
            name: name.to_string(),
            email: BOT_EMAIL.to_string(),
        }
    }

    /// Commit message, also used as the follow-up PR title.
    pub fn commit_message(self, number: u64) -> String {
        match self {
            Task::FixBlockers => format!("AI: fix BLOCKERS for PR #{}", number),
            Task::ApplySuggestions => format!("AI: apply SUGGESTIONS for PR #{}", number),
            Task::ImplementIssue => format!("AI: implement issue #{}", number),
        }
    }

    /// Branch created when changes go out as a separate pull request.
    pub fn branch_name(self, number: u64) -> String {
        match self {
            Task::FixBlockers => format!("auto/fix-blockers-{}", number),
            Task::ApplySuggestions => format!("auto/sugg-sc-{}", number),
            Task::ImplementIssue => format!("auto/issue-{}", number),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.registry_key())
    }
}

/// How committed changes leave the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationMode {
    /// Push onto the branch the changes were made on.
    DirectPush,
    /// Push a new branch and open a pull request for it.
    BranchAndPr,
}

impl PublicationMode {
    pub fn from_separate_pr(separate_pr: bool) -> Self {
        if separate_pr {
            PublicationMode::BranchAndPr
        } else {
            PublicationMode::DirectPush
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// `owner/name` repository slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repository {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(PipelineError::Configuration(format!(
                "repository '{}' is not of the form owner/name",
                s
            ))),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Locations of the files a run leaves behind for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full base..head diff, before truncation.
    pub fn diff(&self) -> PathBuf {
        self.dir.join("diff.patch")
    }

    /// Raw model output, written only when it contained no file blocks.
    pub fn raw_response(&self) -> PathBuf {
        self.dir.join("llm_out.txt")
    }

    pub fn commands(&self) -> PathBuf {
        self.dir.join("commands.txt")
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub anthropic_api_key: String,
    pub repository: Repository,
    pub event_path: Option<PathBuf>,
    pub pr_number: Option<String>,
    pub model_override: Option<String>,
    pub models_file: PathBuf,
    pub github_api_url: String,
    pub anthropic_api_url: String,
    pub workdir: PathBuf,
    pub artifacts: ArtifactPaths,
    pub remote: String,
    pub diff_cap: usize,
    pub max_tokens: u32,
    /// Limit on one model call. `None` waits for as long as the call takes.
    pub llm_timeout: Option<Duration>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Config {
    pub fn identity_for(&self, task: Task) -> CommitIdentity {
        let default = task.default_identity();
        CommitIdentity {
            name: self.committer_name.clone().unwrap_or(default.name),
            email: self.committer_email.clone().unwrap_or(default.email),
        }
    }
}

/// Unvalidated configuration as collected from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigInput {
    pub github_token: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub repository: Option<String>,
    pub event_path: Option<PathBuf>,
    pub pr_number: Option<String>,
    pub model_override: Option<String>,
    pub models_file: Option<PathBuf>,
    pub github_api_url: Option<String>,
    pub anthropic_api_url: Option<String>,
    pub workdir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub remote: Option<String>,
    pub diff_cap: Option<usize>,
    pub max_tokens: Option<u32>,
    /// Seconds; zero or absent means no limit.
    pub llm_timeout_secs: Option<u64>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub verbose: bool,
    pub dry_run: bool,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ConfigInput {
    /// Checks required values and fills defaults. Reports every missing
    /// required value at once.
    pub fn validate(self) -> Result<Config> {
        let github_token = present(self.github_token);
        let anthropic_api_key = present(self.anthropic_api_key);
        let repository = present(self.repository);

        let mut missing = Vec::new();
        if github_token.is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if anthropic_api_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if repository.is_none() {
            missing.push("GITHUB_REPOSITORY");
        }
        let (Some(github_token), Some(anthropic_api_key), Some(repository)) =
            (github_token, anthropic_api_key, repository)
        else {
            return Err(PipelineError::Configuration(format!(
                "Missing {}",
                missing.join(", ")
            )));
        };

        let repository: Repository = repository.parse()?;

        let diff_cap = self.diff_cap.unwrap_or(DEFAULT_DIFF_CAP);
        if diff_cap == 0 {
            return Err(PipelineError::Configuration(
                "diff cap must be greater than zero".to_string(),
            ));
        }

        let workdir = self.workdir.unwrap_or_else(|| PathBuf::from("."));
        let artifacts_dir = self
            .artifacts_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        let artifacts = ArtifactPaths::new(if artifacts_dir.is_absolute() {
            artifacts_dir
        } else {
            workdir.join(artifacts_dir)
        });

        Ok(Config {
            github_token,
            anthropic_api_key,
            repository,
            event_path: self.event_path,
            pr_number: present(self.pr_number),
            model_override: present(self.model_override),
            models_file: self
                .models_file
                .unwrap_or_else(|| workdir.join(DEFAULT_MODELS_FILE)),
            github_api_url: present(self.github_api_url)
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            anthropic_api_url: present(self.anthropic_api_url)
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string()),
            artifacts,
            remote: present(self.remote).unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            diff_cap,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            llm_timeout: self
                .llm_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            committer_name: present(self.committer_name),
            committer_email: present(self.committer_email),
            workdir,
            verbose: self.verbose,
            dry_run: self.dry_run,
        })
    }
}
