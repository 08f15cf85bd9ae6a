//! Chat-model abstraction for Sift.
//!
//! Defines the provider-agnostic [`ChatProvider`] trait the agents talk to,
//! the request/message types shared by all providers, and a scripted
//! provider for tests. The real OpenAI-compatible client lives in
//! [`openai`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use sift_core::LlmError;

pub mod openai;

pub use openai::OpenAiChat;

// ============================================================================
// CHAT TYPES
// ============================================================================

/// One message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// A request consisting of a single user message.
    pub fn user_prompt(content: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(content)])
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// ============================================================================
// CHAT PROVIDER TRAIT
// ============================================================================

/// Trait for chat completion providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion and return the assistant's reply text.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Identifier of the underlying model, for logging.
    fn model(&self) -> &str;
}

// ============================================================================
// ERROR HELPERS
// ============================================================================

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> LlmError {
    LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> LlmError {
    LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// SCRIPTED PROVIDER FOR TESTING
// ============================================================================

/// Chat provider that replays a fixed script of replies.
///
/// Records every request it receives so tests can assert on the prompts
/// the agents actually built. Returns `InvalidResponse` once the script
/// runs out.
pub struct StaticChat {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StaticChat {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A script with a single reply.
    pub fn single(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatProvider for StaticChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| invalid_response("static", "Scripted replies exhausted"))
    }

    fn model(&self) -> &str {
        "static-chat"
    }
}

impl std::fmt::Debug for StaticChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticChat")
            .field("remaining", &self.remaining())
            .field("requests_seen", &self.requests().len())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
