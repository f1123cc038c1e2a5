use crate::error::Result;

/// One single-turn completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Raw HTTP outcome of a completion request. Status interpretation
/// (fallback, failure) belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends completion requests to a language model service.
///
/// Implementations report HTTP status faithfully and only fail for
/// transport-level problems (connection, TLS, body read).
pub trait MessageTransport {
    fn send(&self, request: &LlmRequest) -> Result<TransportReply>;
}

impl<T: MessageTransport + ?Sized> MessageTransport for &T {
    fn send(&self, request: &LlmRequest) -> Result<TransportReply> {
        (**self).send(request)
    }
}
