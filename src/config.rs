use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const URL: &str = "url";
pub const ACCESS_TOKEN: &str = "access_token";
pub const GIT_MAIN_BRANCH: &str = "git_main_branch";
pub const DELETE_LOCAL_ON_DONE: &str = "delete_local_on_done";
pub const DELETE_REMOTE_ON_DONE: &str = "delete_remote_on_done";
pub const DELETE_WORKTREE_ON_DONE: &str = "delete_worktree_on_done";
pub const USE_WORKTREE: &str = "use_worktree";
pub const GIT_PROVIDER: &str = "git_provider";
pub const GITHUB_TOKEN: &str = "github_token";
pub const GITLAB_TOKEN: &str = "gitlab_token";
pub const GITEE_TOKEN: &str = "gitee_token";
pub const GIT_API_URL: &str = "git_api_url";
pub const COMMENT_PROVIDER: &str = "comment_provider";
pub const AI_PROVIDER: &str = "ai_provider";
pub const AI_API_KEY: &str = "ai_api_key";
pub const AI_MODEL: &str = "ai_model";
pub const AI_BASE_URL: &str = "ai_base_url";
pub const AI_REVIEW_ENABLED: &str = "ai_review_enabled";
pub const AI_REVIEW_STRICT: &str = "ai_review_strict";
pub const AI_DIFF_MAX_LENGTH: &str = "ai_diff_max_length";

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";

/// Every key the store accepts, with a one-line description for `ctx config keys`.
pub const KNOWN_KEYS: &[(&str, &str)] = &[
    (URL, "Task backend API base URL"),
    (ACCESS_TOKEN, "Task backend access token"),
    (GIT_MAIN_BRANCH, "Main branch name (e.g. main, master)"),
    (DELETE_LOCAL_ON_DONE, "Delete the local task branch on `ctx done`"),
    (DELETE_REMOTE_ON_DONE, "Delete the remote task branch on `ctx done`"),
    (DELETE_WORKTREE_ON_DONE, "Remove the task worktree on `ctx done`"),
    (USE_WORKTREE, "Start tasks in a dedicated worktree"),
    (GIT_PROVIDER, "Hosting provider (github/gitlab)"),
    (GITHUB_TOKEN, "GitHub personal access token"),
    (GITLAB_TOKEN, "GitLab personal access token"),
    (GITEE_TOKEN, "Gitee personal access token"),
    (GIT_API_URL, "Hosting provider API base URL override"),
    (COMMENT_PROVIDER, "Review comment provider (github/gitee), defaults to git_provider"),
    (AI_PROVIDER, "AI provider (openai/anthropic/local)"),
    (AI_API_KEY, "AI API key"),
    (AI_MODEL, "AI model name"),
    (AI_BASE_URL, "AI API base URL (local models or proxies)"),
    (AI_REVIEW_ENABLED, "Run AI code review on `ctx submit`"),
    (AI_REVIEW_STRICT, "Require strictly structured JSON from the reviewer"),
    (AI_DIFF_MAX_LENGTH, "Maximum diff characters sent to the AI backend"),
];

/// A single value in the flat config store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    /// Coerce operator input: `true`/`false` become booleans, digit strings
    /// become integers, anything else stays a string.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            ConfigValue::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            ConfigValue::Bool(false)
        } else if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            raw.parse().map(ConfigValue::Int).unwrap_or_else(|_| ConfigValue::Str(raw.to_string()))
        } else {
            ConfigValue::Str(raw.to_string())
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// On-disk key/value store (~/.cortex/config.toml).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigStore {
    pub values: BTreeMap<String, ConfigValue>,
}

impl ConfigStore {
    /// Read `path`, returning an empty store if the file is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::Write {
            path: path.display().to_string(),
            reason,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| write_err(e.to_string()))
    }

    pub fn set(&mut self, key: &str, raw: &str) -> Result<&ConfigValue, ConfigError> {
        check_known(key)?;
        let value = ConfigValue::parse(raw);
        tracing::info!(key, value = %value, "config value set");
        self.values.insert(key.to_string(), value);
        Ok(&self.values[key])
    }

    pub fn unset(&mut self, key: &str) -> Result<Option<ConfigValue>, ConfigError> {
        check_known(key)?;
        Ok(self.values.remove(key))
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// All stored values in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(ConfigValue::Str(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(ConfigValue::Int(i)) => Some(i.to_string()),
            _ => None,
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => *b,
            Some(ConfigValue::Int(i)) => *i != 0,
            Some(ConfigValue::Str(s)) => matches!(s.to_ascii_lowercase().as_str(), "yes" | "on" | "1"),
            None => default,
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => Some(*i),
            Some(ConfigValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn check_known(key: &str) -> Result<(), ConfigError> {
    if KNOWN_KEYS.iter().any(|(k, _)| *k == key) {
        Ok(())
    } else {
        Err(ConfigError::UnknownKey {
            key: key.to_string(),
            known: KNOWN_KEYS.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", "),
        })
    }
}

/// Typed snapshot of the store, built once per command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub access_token: Option<String>,
    pub main_branch: String,
    pub delete_local_on_done: bool,
    pub delete_remote_on_done: bool,
    pub delete_worktree_on_done: bool,
    pub use_worktree: bool,
    pub git_provider: Option<String>,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitee_token: Option<String>,
    pub git_api_url: Option<String>,
    pub comment_provider: Option<String>,
    pub ai_provider: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_review_enabled: bool,
    pub ai_review_strict: bool,
    pub ai_diff_max_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_store(&ConfigStore::default())
    }
}

impl Settings {
    pub fn from_store(store: &ConfigStore) -> Self {
        Self {
            api_url: store.string(URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            access_token: store.string(ACCESS_TOKEN),
            main_branch: store.string(GIT_MAIN_BRANCH).unwrap_or_else(|| "main".to_string()),
            delete_local_on_done: store.bool_or(DELETE_LOCAL_ON_DONE, false),
            delete_remote_on_done: store.bool_or(DELETE_REMOTE_ON_DONE, false),
            delete_worktree_on_done: store.bool_or(DELETE_WORKTREE_ON_DONE, true),
            use_worktree: store.bool_or(USE_WORKTREE, false),
            git_provider: store.string(GIT_PROVIDER).map(|s| s.to_ascii_lowercase()),
            github_token: store.string(GITHUB_TOKEN),
            gitlab_token: store.string(GITLAB_TOKEN),
            gitee_token: store.string(GITEE_TOKEN),
            git_api_url: store.string(GIT_API_URL),
            comment_provider: store.string(COMMENT_PROVIDER).map(|s| s.to_ascii_lowercase()),
            ai_provider: store.string(AI_PROVIDER).map(|s| s.to_ascii_lowercase()),
            ai_api_key: store.string(AI_API_KEY),
            ai_model: store.string(AI_MODEL),
            ai_base_url: store.string(AI_BASE_URL),
            ai_review_enabled: store.bool_or(AI_REVIEW_ENABLED, true),
            ai_review_strict: store.bool_or(AI_REVIEW_STRICT, false),
            ai_diff_max_length: store
                .int(AI_DIFF_MAX_LENGTH)
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(crate::sanitize::DEFAULT_MAX_LENGTH),
        }
    }

    /// Token for a hosting/comment provider key.
    pub fn token_for(&self, provider: &str) -> Option<&str> {
        match provider {
            "github" => self.github_token.as_deref(),
            "gitlab" => self.gitlab_token.as_deref(),
            "gitee" => self.gitee_token.as_deref(),
            _ => None,
        }
    }

    /// The comment provider key: explicit `comment_provider`, else `git_provider`.
    pub fn comment_provider_key(&self) -> Option<&str> {
        self.comment_provider
            .as_deref()
            .or(self.git_provider.as_deref())
    }
}

/// Where cortex keeps its files.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl Paths {
    pub fn new(base_dir: PathBuf) -> Self {
        let config_file = base_dir.join("config.toml");
        let log_file = base_dir.join("cortex.log");
        Self {
            base_dir,
            config_file,
            log_file,
        }
    }

    /// ~/.cortex
    pub fn from_home() -> Result<Self> {
        let home_dir = dirs::home_dir().context("Could not find home directory")?;
        Ok(Self::new(home_dir.join(".cortex")))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).context("Failed to create cortex base directory")
    }
}
