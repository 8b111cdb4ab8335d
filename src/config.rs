//! Settings file plus environment overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::doctest::ConflictPolicy;
use crate::llm::{Provider, ProviderConfig, RetryPolicy};
use crate::sandbox::PythonSandbox;
use crate::workflow::Limits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot write settings: {0}")]
    Write(#[from] io::Error),
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: None,
            base_url: None,
            retries: 3,
            retry_delay_ms: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub attempts: usize,
    pub syntax_attempts: usize,
    pub conflict_policy: ConflictPolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            attempts: limits.attempts,
            syntax_attempts: limits.syntax_attempts,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub python: String,
    pub timeout_secs: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    pub enabled: bool,
    pub program: String,
    pub artifact_dir: Option<PathBuf>,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "crosshair".into(),
            artifact_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub workflow: WorkflowSettings,
    pub sandbox: SandboxSettings,
    pub explorer: ExplorerSettings,
}

pub fn app_dir() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("specloop");
    dir
}

pub fn config_path() -> PathBuf {
    app_dir().join("config.toml")
}

impl Settings {
    /// File at the default location, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Self::load_from(&config_path())?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// A missing file yields defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = set("SPECLOOP_PROVIDER") {
            self.llm.provider = provider.parse().map_err(|e: crate::llm::LlmError| ConfigError::Invalid {
                key: "SPECLOOP_PROVIDER",
                reason: e.to_string(),
            })?;
        }
        if let Some(model) = set("SPECLOOP_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(python) = set("SPECLOOP_PYTHON") {
            self.sandbox.python = python;
        }

        if let Some(key) = set("SPECLOOP_API_KEY") {
            self.llm.api_key = Some(key);
        } else if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.llm.api_key = set(self.llm.provider.key_env());
        }
        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.llm.provider,
            model: self
                .llm
                .model
                .clone()
                .unwrap_or_else(|| self.llm.provider.default_model().to_string()),
            api_key: self.llm.api_key.clone().unwrap_or_default(),
            base_url: self.llm.base_url.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.llm.retries,
            base_delay: Duration::from_millis(self.llm.retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            attempts: self.workflow.attempts,
            syntax_attempts: self.workflow.syntax_attempts,
        }
    }

    pub fn sandbox(&self) -> PythonSandbox {
        PythonSandbox::new(&self.sandbox.python, Duration::from_secs(self.sandbox.timeout_secs))
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.explorer
            .artifact_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("programs"))
    }
}
