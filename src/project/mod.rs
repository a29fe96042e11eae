//! Per-project settings checked into the repository.
//!
//! `git-pr-review.toml` at the work-tree root names the hosting backend and
//! how to reach it:
//!
//! ```toml
//! [backend]
//! type = "github"
//! url = "https://github.com/acme/widgets"
//! token_env = "WIDGETS_TOKEN"
//! ```
//!
//! Every key is optional. Command-line flags win over the file, and the file
//! wins over built-in defaults.

use crate::git::{self, GitError};
use crate::publish::TokenSource;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const PROJECT_FILE: &str = "git-pr-review.toml";

const GITHUB: &str = "github";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unsupported backend type '{0}' (only \"github\" is supported)")]
    UnsupportedBackend(String),
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] GitError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProjectError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,

    /// Web or clone URL of the repository; gives owner and repo.
    pub url: Option<String>,

    /// Base URL of the hosting API.
    pub api_url: Option<String>,

    /// Literal API token. Prefer `token_env`.
    pub token: Option<String>,

    /// Environment variable holding the API token.
    pub token_env: Option<String>,

    pub timeout_secs: Option<u64>,
}

fn default_backend_type() -> String {
    GITHUB.to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            url: None,
            api_url: None,
            token: None,
            token_env: None,
            timeout_secs: None,
        }
    }
}

impl ProjectConfig {
    /// Read `git-pr-review.toml` from `repo_root`. A missing file is `None`.
    pub fn load(repo_root: &Path) -> Result<Option<Self>> {
        let path = repo_root.join(PROJECT_FILE);
        if !path.exists() {
            log::debug!("no project config at {}", path.display());
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let config = Self::parse(&contents).map_err(|err| match err {
            ProjectError::Parse { source, .. } => ProjectError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        log::info!("loaded project config from {}", path.display());
        Ok(Some(config))
    }

    /// Parse and validate the contents of a project file.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|source| ProjectError::Parse {
            path: PathBuf::from(PROJECT_FILE),
            source,
        })?;
        if config.backend.backend_type != GITHUB {
            return Err(ProjectError::UnsupportedBackend(
                config.backend.backend_type,
            ));
        }
        config.repository()?;
        Ok(config)
    }

    /// `(owner, repo)` named by `backend.url`, if set.
    pub fn repository(&self) -> Result<Option<(String, String)>> {
        Ok(self
            .backend
            .url
            .as_deref()
            .map(git::parse_remote_url)
            .transpose()?)
    }

    pub fn api_url(&self) -> Option<&str> {
        self.backend.api_url.as_deref()
    }

    /// A literal `token` wins over `token_env`.
    pub fn token_source(&self) -> Option<TokenSource> {
        match (&self.backend.token, &self.backend.token_env) {
            (Some(token), _) => Some(TokenSource::Static(token.clone())),
            (None, Some(var)) => Some(TokenSource::Env(var.clone())),
            (None, None) => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.backend.timeout_secs.map(Duration::from_secs)
    }
}
