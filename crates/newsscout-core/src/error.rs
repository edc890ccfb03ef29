use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::category::Category;

/// Core error type for NewsScout.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{provider} request failed: {message}")]
    Provider { provider: String, message: String },
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },
    #[error("content store error: {0}")]
    Store(String),
    #[error("result cache error: {0}")]
    Cache(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScoutError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Record of a specialist agent that failed outright and was isolated by the
/// orchestrator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentFailure {
    pub category: Category,
    pub reason: String,
    pub panicked: bool,
}

impl AgentFailure {
    pub fn new(category: Category, reason: impl Into<String>, panicked: bool) -> Self {
        Self {
            category,
            reason: reason.into(),
            panicked,
        }
    }
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(f, "{} agent {kind}: {}", self.category.slug(), self.reason)
    }
}

impl std::error::Error for AgentFailure {}
