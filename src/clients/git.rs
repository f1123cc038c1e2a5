//! `VcsClient` backed by the `git` command line.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::data::VcsClient;
use crate::error::{PipelineError, Result};

/// Runs git as a subprocess inside a working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Runs `git <args>` and returns stdout. A non-zero exit is a
    /// [`PipelineError::Vcs`] carrying stderr.
    fn run(&self, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        debug!(command = %command, "git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| PipelineError::Vcs {
                command: command.clone(),
                stderr: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            return Err(PipelineError::Vcs {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pathspec that keeps `path` out of `git add`.
fn exclude_pathspec(path: &Path) -> String {
    format!(":(exclude){}", path.display())
}

impl VcsClient for GitCli {
    fn shallow_fetch(&self, revision: &str) -> Result<()> {
        self.run(&[
            "fetch",
            "--no-tags",
            "--prune",
            "--depth=1",
            &self.remote,
            revision,
        ])?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str, at_revision: &str) -> Result<()> {
        self.run(&["checkout", "-B", name, at_revision])?;
        Ok(())
    }

    fn diff(&self, base: &str, head: &str, context_lines: u32) -> Result<String> {
        let unified = format!("--unified={}", context_lines);
        self.run(&["diff", base, head, &unified])
    }

    fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run(&["config", "user.name", name])?;
        self.run(&["config", "user.email", email])?;
        Ok(())
    }

    fn stage_all(&self, exclude: &[PathBuf]) -> Result<()> {
        let specs: Vec<String> = exclude.iter().map(|p| exclude_pathspec(p)).collect();
        let mut args = vec!["add", "-A", "--", "."];
        args.extend(specs.iter().map(String::as_str));
        self.run(&args)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    fn push(&self, branch: &str, set_upstream: bool) -> Result<()> {
        if set_upstream {
            self.run(&["push", "-u", &self.remote, branch])?;
        } else {
            self.run(&["push", &self.remote, branch])?;
        }
        Ok(())
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name])?;
        Ok(())
    }
}
