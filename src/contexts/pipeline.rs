//! The run itself: one parameterized pipeline behind all three entry points.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::blocks::{ParsedResponse, parse_response};
use super::diff_context::collect_diff;
use super::directive::{DirectiveKind, extract_directive};
use super::llm_client::LlmClient;
use super::materializer::FileMaterializer;
use super::prompt::{directive_prompt, issue_prompt};
use super::resolution::IssueRequest;
use crate::config::{ArtifactPaths, CommitIdentity, Config, PublicationMode, Task};
use crate::data::{CreatedPullRequest, HostApi, MessageTransport, VcsClient};
use crate::error::{PipelineError, Result};

/// Pipeline states, used to label log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    CollectingContext,
    ExtractingDirective,
    Prompting,
    Invoking,
    Parsing,
    Materializing,
    Committing,
    Publishing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::CollectingContext => "collecting_context",
            Stage::ExtractingDirective => "extracting_directive",
            Stage::Prompting => "prompting",
            Stage::Invoking => "invoking",
            Stage::Parsing => "parsing",
            Stage::Materializing => "materializing",
            Stage::Committing => "committing",
            Stage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// What a run is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Act on the latest directive of `kind` in a pull request's comments.
    Review {
        kind: DirectiveKind,
        pr_number: u64,
        publication: PublicationMode,
    },
    /// Implement an issue body on a new branch off the default branch.
    Issue(IssueRequest),
}

impl Job {
    pub fn task(&self) -> Task {
        match self {
            Job::Review {
                kind: DirectiveKind::Blockers,
                ..
            } => Task::FixBlockers,
            Job::Review {
                kind: DirectiveKind::Suggestions,
                ..
            } => Task::ApplySuggestions,
            Job::Issue(_) => Task::ImplementIssue,
        }
    }
}

/// How a run ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No matching directive, or its text was empty. Nothing was changed.
    EmptyDirective,
    /// Parsing succeeded but nothing was written, so nothing was committed.
    NoFilesWritten,
    /// Dry run: the files that would have been written.
    DryRun { planned: Vec<String> },
    Pushed { branch: String, files: usize },
    PullRequestOpened {
        branch: String,
        number: u64,
        url: String,
        files: usize,
    },
}

impl Outcome {
    pub fn files_changed(&self) -> usize {
        match self {
            Outcome::Pushed { files, .. } | Outcome::PullRequestOpened { files, .. } => *files,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::EmptyDirective => write!(f, "nothing to do: no directive found"),
            Outcome::NoFilesWritten => write!(f, "nothing to do: no files written"),
            Outcome::DryRun { planned } => write!(f, "dry run: {} file(s) planned", planned.len()),
            Outcome::Pushed { branch, files } => {
                write!(f, "pushed {} file(s) to {}", files, branch)
            }
            Outcome::PullRequestOpened {
                branch,
                number,
                url,
                files,
            } => write!(
                f,
                "opened PR #{} from {} with {} file(s): {}",
                number, branch, files, url
            ),
        }
    }
}

/// Per-run settings, taken from the validated configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub job: Job,
    /// Working tree root; file blocks are written under it.
    pub workdir: PathBuf,
    pub artifacts: ArtifactPaths,
    pub diff_cap: usize,
    pub identity: CommitIdentity,
    pub dry_run: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, job: Job) -> Self {
        let identity = config.identity_for(job.task());
        Self {
            job,
            workdir: config.workdir.clone(),
            artifacts: config.artifacts.clone(),
            diff_cap: config.diff_cap,
            identity,
            dry_run: config.dry_run,
        }
    }
}

/// Where committed changes go once they exist.
struct Delivery<'b> {
    /// PR or issue number the changes answer.
    number: u64,
    publication: PublicationMode,
    /// Branch the changes were made on.
    current_branch: &'b str,
    /// Base for a follow-up pull request; empty means the default branch.
    pr_base: &'b str,
}

/// Text posted on the originating PR or issue after a follow-up PR is opened.
/// Contains no directive keyword, so it is never picked up as a directive.
pub fn follow_up_comment(created: &CreatedPullRequest) -> String {
    format!(
        "Automated changes are ready for review in #{}: {}",
        created.number, created.html_url
    )
}

fn pull_request_body(number: u64, files: &[PathBuf]) -> String {
    let mut body = format!("Automated follow-up to #{}.\n\nChanged files:\n", number);
    for path in files {
        body.push_str(&format!("- `{}`\n", path.display()));
    }
    body
}

pub struct Pipeline<'a, H: HostApi, V: VcsClient, T: MessageTransport> {
    settings: PipelineSettings,
    host: &'a H,
    vcs: &'a V,
    llm: LlmClient<T>,
}

impl<'a, H: HostApi, V: VcsClient, T: MessageTransport> Pipeline<'a, H, V, T> {
    pub fn new(settings: PipelineSettings, host: &'a H, vcs: &'a V, llm: LlmClient<T>) -> Self {
        Self {
            settings,
            host,
            vcs,
            llm,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs the job to completion. Every failure is fatal and returned as-is;
    /// nothing done earlier in the run is undone.
    pub fn run(&self) -> Result<Outcome> {
        let task = self.settings.job.task();
        info!(task = %task, dry_run = self.settings.dry_run, "Starting run");

        let outcome = match &self.settings.job {
            Job::Review {
                kind,
                pr_number,
                publication,
            } => self.run_review(*kind, *pr_number, *publication)?,
            Job::Issue(issue) => self.run_issue(issue)?,
        };

        info!(task = %task, "Finished: {}", outcome);
        Ok(outcome)
    }

    fn enter(&self, stage: Stage) {
        info!(stage = %stage, "Entering stage");
    }

    fn run_review(
        &self,
        kind: DirectiveKind,
        pr_number: u64,
        publication: PublicationMode,
    ) -> Result<Outcome> {
        self.enter(Stage::Resolving);
        let pr = self.host.get_pull_request(pr_number)?;
        info!(
            pr = pr.number,
            head = %pr.head_branch,
            base = %pr.base_branch,
            "Resolved pull request"
        );

        self.enter(Stage::CollectingContext);
        self.vcs.shallow_fetch(&pr.base_revision)?;
        self.vcs.shallow_fetch(&pr.head_revision)?;
        self.vcs.checkout_branch(&pr.head_branch, &pr.head_revision)?;
        let diff = collect_diff(
            self.vcs,
            &pr,
            self.settings.diff_cap,
            &self.settings.artifacts.diff(),
        )?;

        self.enter(Stage::ExtractingDirective);
        let comments = self.host.list_comments(pr_number)?;
        let Some(directive) = extract_directive(&comments, kind) else {
            info!(
                kind = %kind,
                comments = comments.len(),
                "No {} directive found; nothing to do",
                kind
            );
            return Ok(Outcome::EmptyDirective);
        };
        info!(
            kind = %kind,
            comment_id = directive.comment_id,
            chars = directive.text.len(),
            "Extracted directive"
        );

        self.enter(Stage::Prompting);
        let prompt = directive_prompt(kind, pr_number, &directive.text, &diff);

        let parsed = self.generate(&prompt)?;
        self.deliver(
            parsed,
            Delivery {
                number: pr_number,
                publication,
                current_branch: &pr.head_branch,
                pr_base: &pr.base_branch,
            },
        )
    }

    fn run_issue(&self, issue: &IssueRequest) -> Result<Outcome> {
        self.enter(Stage::Resolving);
        if issue.body.trim().is_empty() {
            info!(issue = issue.number, "Issue body is empty; nothing to do");
            return Ok(Outcome::EmptyDirective);
        }
        let repository = self.host.repository_metadata()?;
        let default_branch = repository.default_branch;
        info!(issue = issue.number, base = %default_branch, "Resolved issue");

        self.enter(Stage::CollectingContext);
        self.vcs.shallow_fetch(&default_branch)?;
        self.vcs.checkout_branch(&default_branch, "FETCH_HEAD")?;

        self.enter(Stage::Prompting);
        let prompt = issue_prompt(issue.number, &issue.title, &issue.body);

        let parsed = self.generate(&prompt)?;
        self.deliver(
            parsed,
            Delivery {
                number: issue.number,
                publication: PublicationMode::BranchAndPr,
                current_branch: &default_branch,
                pr_base: &default_branch,
            },
        )
    }

    /// Invokes the model and parses its reply. A reply without file blocks
    /// is saved verbatim for inspection and ends the run.
    fn generate(&self, prompt: &str) -> Result<ParsedResponse> {
        self.enter(Stage::Invoking);
        let response = self.llm.complete(prompt)?;
        if response.used_fallback {
            warn!(model = %response.model, "Completion produced by fallback model");
        }

        self.enter(Stage::Parsing);
        let parsed = parse_response(&response.text);
        if parsed.files.is_empty() {
            let artifact = self.settings.artifacts.raw_response();
            if let Some(parent) = artifact.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&artifact, &response.text)?;
            error!(
                artifact = %artifact.display(),
                chars = response.text.len(),
                "Model reply contained no file blocks"
            );
            return Err(PipelineError::NoBlocks { artifact });
        }

        info!(
            files = parsed.files.len(),
            has_commands = parsed.commands.is_some(),
            "Parsed model reply"
        );
        Ok(parsed)
    }

    fn deliver(&self, parsed: ParsedResponse, delivery: Delivery<'_>) -> Result<Outcome> {
        self.enter(Stage::Materializing);
        let materializer =
            FileMaterializer::new(&self.settings.workdir, self.settings.artifacts.commands());
        let planned = materializer.plan(&parsed.files)?;

        if self.settings.dry_run {
            for path in &planned {
                info!(path = %path.display(), "Would write: {}", path.display());
            }
            return Ok(Outcome::DryRun {
                planned: planned
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect(),
            });
        }

        let materialization = materializer.materialize(&parsed)?;
        if materialization.count() == 0 {
            info!("No files written; skipping commit");
            return Ok(Outcome::NoFilesWritten);
        }

        self.enter(Stage::Committing);
        let task = self.settings.job.task();
        let message = task.commit_message(delivery.number);
        self.vcs
            .configure_identity(&self.settings.identity.name, &self.settings.identity.email)?;
        let exclude: Vec<PathBuf> = self.artifacts_exclude().into_iter().collect();
        self.vcs.stage_all(&exclude)?;
        self.vcs.commit(&message)?;
        info!(message = %message, files = materialization.count(), "Committed");

        self.enter(Stage::Publishing);
        match delivery.publication {
            PublicationMode::DirectPush => {
                self.vcs.push(delivery.current_branch, false)?;
                info!(branch = %delivery.current_branch, "Pushed");
                Ok(Outcome::Pushed {
                    branch: delivery.current_branch.to_string(),
                    files: materialization.count(),
                })
            }
            PublicationMode::BranchAndPr => {
                let branch = task.branch_name(delivery.number);
                self.vcs.create_branch(&branch)?;
                self.vcs.push(&branch, true)?;

                let base = if delivery.pr_base.is_empty() {
                    self.host.repository_metadata()?.default_branch
                } else {
                    delivery.pr_base.to_string()
                };
                let paths: Vec<PathBuf> = materialization
                    .written
                    .iter()
                    .map(|file| file.path.clone())
                    .collect();
                let created = self.host.create_pull_request(
                    &branch,
                    &base,
                    &message,
                    &pull_request_body(delivery.number, &paths),
                )?;
                info!(
                    number = created.number,
                    url = %created.html_url,
                    base = %base,
                    "Opened follow-up pull request"
                );
                self.host
                    .post_comment(delivery.number, &follow_up_comment(&created))?;

                Ok(Outcome::PullRequestOpened {
                    branch,
                    number: created.number,
                    url: created.html_url,
                    files: materialization.count(),
                })
            }
        }
    }

    /// Artifacts directory relative to the working tree, or `None` when it
    /// lives outside the tree and so can never be staged.
    fn artifacts_exclude(&self) -> Option<PathBuf> {
        let dir = self.settings.artifacts.dir();
        let workdir = &self.settings.workdir;
        let relative = match dir.strip_prefix(workdir) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                let dir = fs::canonicalize(dir).ok()?;
                let workdir = fs::canonicalize(workdir).ok()?;
                dir.strip_prefix(&workdir).ok()?.to_path_buf()
            }
        };
        (!relative.as_os_str().is_empty()).then_some(relative)
    }
}
