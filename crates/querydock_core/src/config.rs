//! Core configuration loading.
//!
//! A JSON file provides the base values; `QUERYDOCK_DB`,
//! `QUERYDOCK_LOG_LEVEL` and `QUERYDOCK_LOG_DIR` override them.

use crate::logging::{default_log_level, normalize_level};
use crate::search::{normalize_search_limit, DEFAULT_SEARCH_LIMIT};
use crate::service::access::AllowList;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "QUERYDOCK_DB";
pub const ENV_LOG_LEVEL: &str = "QUERYDOCK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "QUERYDOCK_LOG_DIR";

const DEFAULT_DB_PATH: &str = "querydock.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Absolute directory for rotating log files; stderr when unset.
    pub log_dir: Option<PathBuf>,
    pub search_limit: u32,
    /// Emails allowed to mutate; everyone when unset.
    pub allowed_emails: Option<Vec<String>>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: default_log_level().to_string(),
            log_dir: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
            allowed_emails: None,
        }
    }
}

impl CoreConfig {
    /// Parses JSON; missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config = serde_json::from_str::<Self>(text)?;
        config.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Applies overrides from a variable lookup, then validates again.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup(ENV_DB_PATH) {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir.trim()));
        }
        self.validated()
    }

    /// Applies process environment overrides.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn allow_list(&self) -> AllowList {
        match &self.allowed_emails {
            Some(emails) => AllowList::restricted(emails),
            None => AllowList::Open,
        }
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "db_path",
                message: "must not be empty".to_string(),
            });
        }
        self.log_level = normalize_level(&self.log_level)
            .map_err(|err| ConfigError::Invalid {
                field: "log_level",
                message: err.to_string(),
            })?
            .to_string();
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "log_dir",
                    message: format!("must be absolute, got `{}`", dir.display()),
                });
            }
        }
        self.search_limit = normalize_search_limit(Some(self.search_limit));
        Ok(self)
    }
}
