use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL: '{0}'")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },
    #[error("browser failure on {url}: {reason}")]
    Browser { url: String, reason: String },
}

impl FetchError {
    /// Timeouts, 5xx and 429 are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Body { .. } => true,
            FetchError::Connect { .. } | FetchError::Browser { .. } => false,
        }
    }

    pub fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_connect() || err.is_request() || err.is_builder() {
            FetchError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Body {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store at {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode postings: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failure of an API job source. Never fatal for the crawl as a whole.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
