use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::llm::{ChatRequest, LlmClient, LlmError};

/// Why a completion degraded to its fallback path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackCause {
    ModelDisabled,
    Timeout,
    Transport,
    EmptyCompletion,
    MalformedJson,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StructuredOutcome<T> {
    Parsed(T),
    Fallback(FallbackCause),
}

impl<T> StructuredOutcome<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            StructuredOutcome::Parsed(value) => Some(value),
            StructuredOutcome::Fallback(_) => None,
        }
    }
}

/// The one shared "call the model, parse strictly, degrade on anything"
/// capability. Every sub-agent goes through here so error classification is
/// uniform: a timeout, a transport failure, an empty completion and
/// malformed JSON all land on the caller's deterministic fallback, never on
/// the user.
#[derive(Clone)]
pub struct StructuredCompletion {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl StructuredCompletion {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Strict-JSON completion into `T`.
    pub async fn request<T: DeserializeOwned>(&self, request: ChatRequest) -> StructuredOutcome<T> {
        let raw = match self.raw(request.expecting_json()).await {
            Ok(raw) => raw,
            Err(cause) => return StructuredOutcome::Fallback(cause),
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => StructuredOutcome::Parsed(value),
            Err(error) => {
                tracing::warn!(error = %error, "structured completion returned malformed json");
                StructuredOutcome::Fallback(FallbackCause::MalformedJson)
            }
        }
    }

    /// Plain-text completion. `None` on any failure.
    pub async fn text(&self, request: ChatRequest) -> Option<String> {
        self.raw(request).await.ok()
    }

    async fn raw(&self, request: ChatRequest) -> Result<String, FallbackCause> {
        let call = self.llm.complete(request);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "llm call timed out");
                return Err(FallbackCause::Timeout);
            }
        };

        let text = match result {
            Ok(text) => text,
            Err(LlmError::Disabled) => return Err(FallbackCause::ModelDisabled),
            Err(LlmError::Timeout) => return Err(FallbackCause::Timeout),
            Err(LlmError::Empty) => return Err(FallbackCause::EmptyCompletion),
            Err(LlmError::Transport(message)) => {
                tracing::warn!(error = %message, "llm transport failure");
                return Err(FallbackCause::Transport);
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(FallbackCause::EmptyCompletion);
        }
        Ok(trimmed.to_owned())
    }
}
