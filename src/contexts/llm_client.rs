use serde::Deserialize;
use tracing::{info, warn};

use crate::data::{LlmRequest, MessageTransport, TransportReply};
use crate::error::{PipelineError, Result};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_FALLBACK_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Status the messages API uses for an unknown or unavailable model.
const MODEL_NOT_FOUND: u16 = 404;

/// Primary model plus the one it falls back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub primary: String,
    pub fallback: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            primary: DEFAULT_MODEL.to_string(),
            fallback: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    /// Model that actually produced the text.
    pub model: String,
    pub text: String,
    pub used_fallback: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentSegment>,
}

#[derive(Debug, Deserialize)]
struct ContentSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Concatenates the text-typed content segments of a messages response,
/// in the order received.
pub fn extract_text(body: &str) -> Result<String> {
    let parsed: MessagesResponse = serde_json::from_str(body)?;
    Ok(parsed
        .content
        .into_iter()
        .filter(|segment| segment.kind == "text")
        .filter_map(|segment| segment.text)
        .collect())
}

/// Note appended to the prompt when the fallback model is used.
pub fn fallback_annotation(model: &str) -> String {
    format!("\n\n(Using fallback: {})", model)
}

/// Single-turn completion client with exactly one model fallback.
pub struct LlmClient<T: MessageTransport> {
    transport: T,
    models: ModelSelection,
    max_tokens: u32,
}

impl<T: MessageTransport> LlmClient<T> {
    pub fn new(transport: T, models: ModelSelection, max_tokens: u32) -> Self {
        Self {
            transport,
            models,
            max_tokens,
        }
    }

    pub fn models(&self) -> &ModelSelection {
        &self.models
    }

    /// Sends `prompt` to the primary model.
    ///
    /// A not-found reply triggers one request to the fallback model with an
    /// annotated prompt. Any other failure, including a failed fallback, is
    /// returned as [`PipelineError::UpstreamApi`].
    pub fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        let primary = LlmRequest {
            model: self.models.primary.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
        };
        info!(model = %primary.model, prompt_chars = prompt.len(), "Requesting completion");
        let reply = self.transport.send(&primary)?;

        if reply.status == MODEL_NOT_FOUND {
            warn!(
                primary = %self.models.primary,
                fallback = %self.models.fallback,
                "Primary model not found; retrying once with fallback"
            );
            let fallback = LlmRequest {
                model: self.models.fallback.clone(),
                prompt: format!("{}{}", prompt, fallback_annotation(&self.models.fallback)),
                max_tokens: self.max_tokens,
            };
            let reply = self.transport.send(&fallback)?;
            return into_response(fallback.model, reply, true);
        }

        into_response(primary.model, reply, false)
    }
}

fn into_response(model: String, reply: TransportReply, used_fallback: bool) -> Result<LlmResponse> {
    if !reply.is_success() {
        return Err(PipelineError::UpstreamApi {
            service: "Anthropic",
            status: reply.status,
            body: reply.body,
        });
    }

    Ok(LlmResponse {
        model,
        text: extract_text(&reply.body)?,
        used_fallback,
    })
}
