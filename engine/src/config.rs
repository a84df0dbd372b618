//! User configuration: `~/.rapport/config.toml`.
//!
//! ```toml
//! [backend]
//! base_url = "http://127.0.0.1:8000/interactions"
//! timeout_secs = 30
//!
//! [suggestions]
//! debounce_ms = 1000
//! min_name_chars = 3
//! discard_stale = true
//! ```
//!
//! Every section and key is optional. String values may reference
//! environment variables as `${VAR}`, and `RAPPORT_BACKEND_URL` overrides
//! `backend.base_url`.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use rapport_client::{ClientBuildError, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use thiserror::Error;

use crate::debounce::DebounceSettings;
use crate::store::StorePolicy;

pub const BACKEND_URL_ENV: &str = "RAPPORT_BACKEND_URL";

const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_MIN_NAME_CHARS: usize = 3;

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct RapportConfig {
    pub backend: Option<BackendConfig>,
    pub suggestions: Option<SuggestionsConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsConfig {
    pub debounce_ms: Option<u64>,
    pub min_name_chars: Option<usize>,
    /// Drop suggestions that arrive after the HCP name changed.
    #[serde(default = "default_true")]
    pub discard_stale: bool,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: None,
            min_name_chars: None,
            discard_stale: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Backend(#[from] ClientBuildError),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Backend(_) => None,
        }
    }
}

/// Engine-side settings resolved from [`RapportConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSettings {
    pub debounce: DebounceSettings,
    pub store: StorePolicy,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl RapportConfig {
    /// Load the user config. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::parse(&content).map(Some).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Backend URL after `${VAR}` expansion, with the environment override
    /// taking precedence.
    #[must_use]
    pub fn backend_url(&self) -> String {
        if let Ok(url) = env::var(BACKEND_URL_ENV)
            && !url.trim().is_empty()
        {
            return url.trim().to_string();
        }
        self.backend
            .as_ref()
            .and_then(|backend| backend.base_url.as_deref())
            .map(expand_env_vars)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let timeout_secs = self
            .backend
            .as_ref()
            .and_then(|backend| backend.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let url = self.backend_url();
        ClientConfig::new(url.trim(), Duration::from_secs(timeout_secs)).map_err(ConfigError::from)
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        let suggestions = self.suggestions.as_ref();
        let debounce_ms = suggestions
            .and_then(|s| s.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let min_name_chars = suggestions
            .and_then(|s| s.min_name_chars)
            .unwrap_or(DEFAULT_MIN_NAME_CHARS);
        let discard_stale = suggestions.is_none_or(|s| s.discard_stale);

        EngineSettings {
            debounce: DebounceSettings {
                quiet: Duration::from_millis(debounce_ms),
                min_name_chars,
            },
            store: StorePolicy {
                discard_stale_suggestions: discard_stale,
            },
        }
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".rapport").join("config.toml"))
}
