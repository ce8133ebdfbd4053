//! Process configuration: an optional TOML file overridden by environment variables.
//!
//! ```toml
//! [github]
//! owner = "octo"
//! repo = "transcripts"
//! branch = "main"
//!
//! [commit]
//! strategy = "git-data"
//! required_suffix = ".html"
//!
//! [deploy]
//! hook_url = "https://api.vercel.com/v1/integrations/deploy/..."
//! ```
//!
//! Secrets (`GITHUB_TOKEN`, `DISCORD_TOKEN`) are normally supplied through the
//! environment only.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::internal::{builder::Strategy, store::github::GITHUB_API_URL};

pub const CONFIG_ENV: &str = "SCRIBE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub token: Option<String>,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
    pub raw_url: String,
    pub timeout_secs: u64,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            token: None,
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            api_url: GITHUB_API_URL.to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSettings")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("raw_url", &self.raw_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitSettings {
    pub strategy: Strategy,
    /// When set, every target path must end with this suffix (e.g. `.html`).
    pub required_suffix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub hook_url: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub token: Option<String>,
    pub api_url: String,
    pub transcript_dir: String,
    pub max_messages: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://discord.com/api/v10".to_string(),
            transcript_dir: "transcripts".to_string(),
            max_messages: 1000,
        }
    }
}

impl fmt::Debug for ChatSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSettings")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .field("transcript_dir", &self.transcript_dir)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubSettings,
    pub commit: CommitSettings,
    pub deploy: DeploySettings,
    pub chat: ChatSettings,
    pub server: ServerSettings,
}

impl Config {
    /// Loads `path` (or `$SCRIBE_CONFIG`) if given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides settings from `lookup`, which maps an environment variable name to its value.
    /// Empty values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = get("GITHUB_OWNER") {
            self.github.owner = v;
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.github.repo = v;
        }
        if let Some(v) = get("GITHUB_BRANCH") {
            self.github.branch = v;
        }
        if let Some(v) = get("GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Some(v) = get("GITHUB_RAW_URL") {
            self.github.raw_url = v;
        }
        if let Some(v) = get("SCRIBE_STRATEGY") {
            self.commit.strategy = v.parse().map_err(|message| ConfigError::Invalid {
                key: "commit.strategy",
                message,
            })?;
        }
        if let Some(v) = get("SCRIBE_REQUIRED_SUFFIX") {
            self.commit.required_suffix = Some(v);
        }
        if let Some(v) = get("VERCEL_DEPLOY_HOOK") {
            self.deploy.hook_url = Some(v);
        }
        if let Some(v) = get("DISCORD_TOKEN") {
            self.chat.token = Some(v);
        }
        if let Some(v) = get("DISCORD_API_URL") {
            self.chat.api_url = v;
        }
        if let Some(v) = get("SCRIBE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SCRIBE_PORT") {
            self.server.port = v.parse().map_err(|e| ConfigError::Invalid {
                key: "server.port",
                message: format!("{e}"),
            })?;
        }
        Ok(())
    }

    /// Checks the settings needed to talk to GitHub.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.owner.is_empty() {
            return Err(ConfigError::Missing("github.owner"));
        }
        if self.github.repo.is_empty() {
            return Err(ConfigError::Missing("github.repo"));
        }
        if self.github.branch.is_empty() {
            return Err(ConfigError::Missing("github.branch"));
        }
        if self.github.token.is_none() {
            return Err(ConfigError::Missing("github.token"));
        }
        if let Some(hook) = &self.deploy.hook_url {
            url::Url::parse(hook).map_err(|e| ConfigError::Invalid {
                key: "deploy.hook_url",
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}
