//! Error taxonomy for a pipeline run.
//!
//! Everything here is fatal. The "nothing to do" conditions (no directive,
//! no files written) are reported through [`crate::contexts::Outcome`] instead.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not determine target: {0}")]
    Resolution(String),

    #[error("{service} API {status}: {body}")]
    UpstreamApi {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("no <<<file:...>>> blocks in model response; raw output saved to {}", artifact.display())]
    NoBlocks { artifact: PathBuf },

    #[error("refusing to write outside the working tree: {0}")]
    UnsafePath(String),

    #[error("git {command} failed: {stderr}")]
    Vcs { command: String, stderr: String },

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
