// src/llm/client.rs

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::llm::prompt::LlmPrompt;
use crate::llm::{ChatBackend, LlmError};

const PROMPT_ABI_VERSION: &str = "v1-specloop";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Anthropic,
    HuggingFace,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-5.2",
            Provider::Anthropic => "claude-sonnet-4-5",
            Provider::HuggingFace => "Qwen/Qwen2.5-Coder-32B-Instruct",
        }
    }

    /// Provider-specific environment variable consulted when no key is
    /// configured.
    pub fn key_env(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::HuggingFace => "HUGGING_FACE_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::HuggingFace => "huggingface",
        })
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "huggingface" | "hf" => Ok(Provider::HuggingFace),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Bounded retry with linearly increasing backoff (`attempt * base_delay`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub struct LlmClient {
    cfg: ProviderConfig,
    retry: RetryPolicy,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(cfg: ProviderConfig, retry: RetryPolicy, timeout: Duration) -> Result<Self, LlmError> {
        if cfg.api_key.trim().is_empty() {
            return Err(LlmError::MissingKey(cfg.provider));
        }

        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { cfg, retry, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }

    fn send_once(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        let (url, headers, body) = build_request(&self.cfg, prompt);

        let mut req = self.http.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send()?;
        let status = resp.status();
        let json: Value = resp.json()?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: json.to_string(),
            });
        }

        extract_text(self.cfg.provider, &json)
    }
}

impl ChatBackend for LlmClient {
    fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
        let prompt_hash = hash_prompt(prompt);
        let attempts = self.retry.attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            debug!(
                provider = %self.cfg.provider,
                model = %self.cfg.model,
                prompt = &prompt_hash[..12],
                attempt,
                "sending completion request"
            );

            match self.send_once(prompt) {
                Ok(text) => {
                    info!(prompt = &prompt_hash[..12], attempt, chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.retry.base_delay * attempt);
                    }
                }
            }
        }

        Err(LlmError::Exhausted {
            attempts,
            last: Box::new(last_err.unwrap_or(LlmError::Malformed("no attempt made".into()))),
        })
    }
}

pub fn hash_prompt(prompt: &LlmPrompt) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.system.as_bytes());
    h.update(prompt.user.as_bytes());
    hex::encode(h.finalize())
}

fn build_request(cfg: &ProviderConfig, prompt: &LlmPrompt) -> (String, Vec<(&'static str, String)>, Value) {
    match cfg.provider {
        Provider::OpenAI => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/responses".into());

            let body = serde_json::json!({
                "model": cfg.model,
                "instructions": prompt.system,
                "input": prompt.user,
            });

            (url, vec![("Authorization", format!("Bearer {}", cfg.api_key))], body)
        }

        Provider::Anthropic => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".into());

            let body = serde_json::json!({
                "model": cfg.model,
                "max_tokens": 2048,
                "system": prompt.system,
                "messages": [
                    { "role": "user", "content": prompt.user }
                ]
            });

            (
                url,
                vec![
                    ("x-api-key", cfg.api_key.clone()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body,
            )
        }

        Provider::HuggingFace => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://router.huggingface.co/v1/chat/completions".into());

            let body = serde_json::json!({
                "model": cfg.model,
                "max_tokens": 2048,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user }
                ]
            });

            (url, vec![("Authorization", format!("Bearer {}", cfg.api_key))], body)
        }
    }
}

fn extract_text(provider: Provider, v: &Value) -> Result<String, LlmError> {
    match provider {
        Provider::OpenAI => v
            .get("output")
            .and_then(|o| o.as_array())
            .and_then(|arr| {
                arr.iter().find_map(|item| {
                    item.get("content")?
                        .as_array()?
                        .iter()
                        .find_map(|c| c.get("text")?.as_str())
                })
            })
            .map(str::to_owned)
            .ok_or_else(|| LlmError::Malformed("output[].content[].text".into())),

        Provider::Anthropic => v
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| LlmError::Malformed("content[0].text".into())),

        Provider::HuggingFace => {
            if v.get("choices").is_none() {
                return Err(LlmError::Malformed("choices".into()));
            }
            v.pointer("/choices/0/message/content")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .ok_or_else(|| LlmError::Malformed("choices[0].message.content".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> LlmPrompt {
        LlmPrompt {
            system: "sys".into(),
            user: "usr".into(),
        }
    }

    #[test]
    fn prompt_hash_is_stable_and_content_sensitive() {
        let a = hash_prompt(&prompt());
        assert_eq!(a, hash_prompt(&prompt()));
        assert_eq!(a.len(), 64);

        let mut other = prompt();
        other.user.push('!');
        assert_ne!(a, hash_prompt(&other));
    }

    #[test]
    fn parses_provider_names() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!("hf".parse::<Provider>().unwrap(), Provider::HuggingFace);
        assert!("cohere".parse::<Provider>().is_err());
    }

    #[test]
    fn extracts_text_per_provider() {
        let openai = serde_json::json!({"output": [{"type": "reasoning"}, {"content": [{"text": "hi"}]}]});
        assert_eq!(extract_text(Provider::OpenAI, &openai).unwrap(), "hi");

        let anthropic = serde_json::json!({"content": [{"type": "text", "text": "yo"}]});
        assert_eq!(extract_text(Provider::Anthropic, &anthropic).unwrap(), "yo");

        let hf = serde_json::json!({"choices": [{"message": {"content": "ok"}}]});
        assert_eq!(extract_text(Provider::HuggingFace, &hf).unwrap(), "ok");

        let err = extract_text(Provider::HuggingFace, &serde_json::json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, LlmError::Malformed(field) if field == "choices"));
    }

    #[test]
    fn huggingface_request_uses_chat_messages() {
        let cfg = ProviderConfig {
            provider: Provider::HuggingFace,
            model: Provider::HuggingFace.default_model().into(),
            api_key: "k".into(),
            base_url: None,
        };
        let (url, headers, body) = build_request(&cfg, &prompt());
        assert!(url.ends_with("/v1/chat/completions"));
        assert_eq!(headers[0].1, "Bearer k");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[test]
    fn empty_key_is_rejected_up_front() {
        let cfg = ProviderConfig {
            provider: Provider::Anthropic,
            model: "m".into(),
            api_key: " ".into(),
            base_url: None,
        };
        let err = LlmClient::new(cfg, RetryPolicy::default(), Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, LlmError::MissingKey(Provider::Anthropic)));
    }
}
