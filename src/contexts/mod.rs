pub mod blocks;
pub mod diff_context;
pub mod directive;
pub mod llm_client;
pub mod materializer;
pub mod pipeline;
pub mod prompt;
pub mod resolution;

pub use blocks::{FileBlock, ParsedResponse, parse_response};
pub use diff_context::{DEFAULT_DIFF_CAP, DiffContext, collect_diff};
pub use directive::{DirectiveKind, ExtractedDirective, extract_directive};
pub use llm_client::{
    DEFAULT_FALLBACK_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, LlmClient, LlmResponse,
    ModelSelection,
};
pub use materializer::{FileMaterializer, Materialization, WrittenFile};
pub use pipeline::{Job, Outcome, Pipeline, PipelineSettings, Stage};
pub use resolution::{EventPayload, IssueRequest, resolve_issue, resolve_pr_number};
