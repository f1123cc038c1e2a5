use anyhow::{Context, Result};

mod progress;

use prfix::clients::{AnthropicTransport, GitCli, GitHubClient};
use prfix::config::{Config, PublicationMode, Task};
use prfix::contexts::{
    EventPayload, Job, LlmClient, ModelSelection, Outcome, Pipeline, PipelineSettings,
    resolve_issue, resolve_pr_number,
};
use prfix::error::PipelineError;
use prfix::registries::ModelRegistry;
use progress::RunSummary;

/// Applies the latest BLOCKERS directive on the pull request.
pub fn fix_blockers(separate_pr: bool, config: &Config) -> Result<Outcome> {
    run_review(Task::FixBlockers, separate_pr, config)
}

/// Applies the latest SUGGESTIONS directive on the pull request.
pub fn apply_suggestions(separate_pr: bool, config: &Config) -> Result<Outcome> {
    run_review(Task::ApplySuggestions, separate_pr, config)
}

/// Implements the issue from the triggering event on a new branch.
pub fn implement_issue(config: &Config) -> Result<Outcome> {
    let event = load_event(config)?.ok_or_else(|| {
        PipelineError::Configuration(
            "implement-issue needs an event payload; set GITHUB_EVENT_PATH or pass --event-path"
                .to_string(),
        )
    })?;
    let issue = resolve_issue(&event)?;
    execute(Task::ImplementIssue, Job::Issue(issue), config)
}

fn run_review(task: Task, separate_pr: bool, config: &Config) -> Result<Outcome> {
    let kind = task
        .directive_kind()
        .with_context(|| format!("{} does not act on a directive", task))?;
    let event = load_event(config)?;
    let pr_number = resolve_pr_number(config.pr_number.as_deref(), event.as_ref())?;

    let job = Job::Review {
        kind,
        pr_number,
        publication: PublicationMode::from_separate_pr(separate_pr),
    };
    execute(task, job, config)
}

fn load_event(config: &Config) -> Result<Option<EventPayload>> {
    match &config.event_path {
        Some(path) => Ok(Some(EventPayload::load(path)?)),
        None => Ok(None),
    }
}

fn execute(task: Task, job: Job, config: &Config) -> Result<Outcome> {
    let summary = RunSummary::start(task);

    let registry = ModelRegistry::new(&config.models_file, ModelSelection::default());
    let models = registry.selection_for(task, config.model_override.as_deref())?;
    if config.verbose {
        println!(
            "Using model {} (fallback {}) for {}",
            models.primary, models.fallback, task
        );
    }

    let host = GitHubClient::new(
        &config.github_api_url,
        &config.github_token,
        config.repository.clone(),
    )?;
    let vcs = GitCli::new(&config.workdir, &config.remote);
    let transport = AnthropicTransport::new(
        &config.anthropic_api_url,
        &config.anthropic_api_key,
        config.llm_timeout,
    )?;
    let llm = LlmClient::new(transport, models, config.max_tokens);

    let settings = PipelineSettings::from_config(config, job);
    let outcome = Pipeline::new(settings, &host, &vcs, llm)
        .run()
        .with_context(|| format!("{} failed for {}", task, config.repository))?;

    summary.finish(&outcome);
    Ok(outcome)
}
