use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use prfix::config::ConfigInput;
use prfix::telemetry::{init_tracing, level_for};

mod cli;

#[derive(Parser)]
#[command(name = "prfix")]
#[command(about = "Applies review directives and issue requests to a repository with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: GlobalOptions,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Parse the model reply but write, commit and push nothing")]
    dry_run: bool,

    #[arg(long, global = true, help = "Emit logs as newline-delimited JSON")]
    json_logs: bool,
}

#[derive(Args)]
struct GlobalOptions {
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, global = true, env = "GITHUB_REPOSITORY", help = "Repository as owner/name")]
    repository: Option<String>,

    #[arg(long, global = true, env = "GITHUB_EVENT_PATH", help = "Webhook event payload (JSON)")]
    event_path: Option<PathBuf>,

    #[arg(long, global = true, env = "PR_NUMBER", help = "Pull request number; overrides the event payload")]
    pr_number: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_MODEL", help = "Primary model; overrides the model registry")]
    model: Option<String>,

    #[arg(long, global = true, help = "Task-to-model registry (YAML)")]
    models_file: Option<PathBuf>,

    #[arg(long, global = true, env = "GITHUB_API_URL")]
    github_api_url: Option<String>,

    #[arg(long, global = true, env = "ANTHROPIC_API_URL")]
    anthropic_api_url: Option<String>,

    #[arg(long, global = true, help = "Working tree root (defaults to the current directory)")]
    workdir: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for run artifacts (defaults to .prfix)")]
    artifacts_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Git remote to fetch from and push to")]
    remote: Option<String>,

    #[arg(long, global = true, help = "Maximum diff characters sent to the model")]
    diff_cap: Option<usize>,

    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    #[arg(long, global = true, env = "LLM_TIMEOUT_SECS", help = "Seconds to wait for the model; 0 or unset waits indefinitely")]
    llm_timeout_secs: Option<u64>,

    #[arg(long, global = true, help = "Commit author name")]
    committer_name: Option<String>,

    #[arg(long, global = true, help = "Commit author email")]
    committer_email: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fix the BLOCKERS from the latest review comment")]
    FixBlockers {
        #[arg(long, help = "Push to a new branch and open a pull request")]
        separate_pr: bool,
    },

    #[command(about = "Apply the SUGGESTIONS from the latest review comment")]
    ApplySuggestions {
        #[arg(
            long,
            env = "SUGGESTIONS_SEPARATE_PR",
            help = "Push to a new branch and open a pull request"
        )]
        separate_pr: bool,
    },

    #[command(about = "Implement the issue from the event payload on a new branch")]
    ImplementIssue,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.json_logs, level_for(cli.verbose));

    let options = cli.options;
    let config = ConfigInput {
        github_token: options.github_token,
        anthropic_api_key: options.anthropic_api_key,
        repository: options.repository,
        event_path: options.event_path,
        pr_number: options.pr_number,
        model_override: options.model,
        models_file: options.models_file,
        github_api_url: options.github_api_url,
        anthropic_api_url: options.anthropic_api_url,
        workdir: options.workdir,
        artifacts_dir: options.artifacts_dir,
        remote: options.remote,
        diff_cap: options.diff_cap,
        max_tokens: options.max_tokens,
        llm_timeout_secs: options.llm_timeout_secs,
        committer_name: options.committer_name,
        committer_email: options.committer_email,
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    }
    .validate()?;

    match cli.command {
        Commands::FixBlockers { separate_pr } => {
            cli::fix_blockers(separate_pr, &config)?;
        }
        Commands::ApplySuggestions { separate_pr } => {
            cli::apply_suggestions(separate_pr, &config)?;
        }
        Commands::ImplementIssue => {
            cli::implement_issue(&config)?;
        }
    }

    Ok(())
}
