//! `MessageTransport` over the Anthropic messages API.

use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::data::{LlmRequest, MessageTransport, TransportReply};
use crate::error::Result;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// Request body for a single-turn user message.
pub fn request_body(request: &LlmRequest) -> Result<String> {
    let body = MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        messages: [Message {
            role: "user",
            content: &request.prompt,
        }],
    };
    Ok(serde_json::to_string(&body)?)
}

pub struct AnthropicTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl AnthropicTransport {
    /// `base_url` is the API root, e.g. `https://api.anthropic.com/v1`.
    /// `timeout` bounds a whole call; `None` lifts the blocking client's
    /// default 30 second limit.
    pub fn new(base_url: &str, api_key: &str, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl MessageTransport for AnthropicTransport {
    fn send(&self, request: &LlmRequest) -> Result<TransportReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .body(request_body(request)?)
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        debug!(model = %request.model, status, bytes = body.len(), "Anthropic response");
        Ok(TransportReply { status, body })
    }
}
