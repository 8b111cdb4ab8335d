pub mod client;
pub mod extract;
pub mod prompt;

use thiserror::Error;

pub use client::{LlmClient, Provider, ProviderConfig, RetryPolicy};
pub use prompt::LlmPrompt;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured for {0}")]
    MissingKey(Provider),
    #[error("unknown provider {0:?}; expected openai, anthropic or huggingface")]
    UnknownProvider(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is missing {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<LlmError> },
}

/// Anything that turns a prompt into reply text.
pub trait ChatBackend {
    fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for &B {
    fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        (**self).complete(prompt)
    }
}

impl<B: ChatBackend + ?Sized> ChatBackend for Box<B> {
    fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        (**self).complete(prompt)
    }
}
