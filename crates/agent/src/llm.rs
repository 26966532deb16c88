use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use prospera_core::domain::history::ChatTurn;

/// One completion request: ordered system blocks, prior turns, and the user
/// message. `json_output` asks the provider for a strict JSON object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: Vec<String>,
    pub history: Vec<ChatTurn>,
    pub user: String,
    pub json_output: bool,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: vec![system.into()],
            history: Vec::new(),
            user: user.into(),
            json_output: false,
        }
    }

    pub fn with_system(mut self, block: impl Into<String>) -> Self {
        self.system.push(block.into());
        self
    }

    pub fn with_history(mut self, history: &[ChatTurn]) -> Self {
        self.history = history.to_vec();
        self
    }

    pub fn expecting_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("no llm configured")]
    Disabled,
    #[error("llm call timed out")]
    Timeout,
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm returned an empty completion")]
    Empty,
}

/// Completion seam. The pipeline treats the model as a black box: given
/// messages, return text. Transports live in the host.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}

/// Always unavailable; forces every heuristic path. Used when no API key is
/// configured and throughout the degradation tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

/// Test double that replays a queue of canned outcomes. Once the queue is
/// exhausted it reports `Disabled`.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()) }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| Ok((*text).to_owned())).collect())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
        let mut responses = match self.responses.lock() {
            Ok(responses) => responses,
            Err(poisoned) => poisoned.into_inner(),
        };
        responses.pop_front().unwrap_or(Err(LlmError::Disabled))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatRequest, DisabledLlm, LlmClient, LlmError, ScriptedLlm};

    #[tokio::test]
    async fn disabled_llm_always_fails() {
        let llm = DisabledLlm;
        let result = llm.complete(ChatRequest::new("system", "hola")).await;
        assert_eq!(result, Err(LlmError::Disabled));
    }

    #[tokio::test]
    async fn scripted_llm_replays_in_order_then_disables() {
        let llm = ScriptedLlm::new(vec![Ok("uno".to_owned()), Err(LlmError::Timeout)]);
        assert_eq!(llm.complete(ChatRequest::new("s", "m")).await, Ok("uno".to_owned()));
        assert_eq!(llm.complete(ChatRequest::new("s", "m")).await, Err(LlmError::Timeout));
        assert_eq!(llm.complete(ChatRequest::new("s", "m")).await, Err(LlmError::Disabled));
    }
}
