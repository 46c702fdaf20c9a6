//! Error types for loading, execution, browser sessions and scraping.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Position;

/// Demonstration input could not be read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid demonstration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal failure while executing one IR node. Aborts the rest of its trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("no selector candidate matched at {position} (tried {tried})")]
    SelectorExhaustion { position: Position, tried: usize },

    #[error("{action} has no selector candidates at {position}")]
    MissingCandidates { position: Position, action: String },

    #[error("driver failure at {position}: {message}")]
    Driver { position: Position, message: String },
}

/// Browser session could not be acquired.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Chrome executable not found. Set CHROME_PATH or install Google Chrome.")]
    ChromeNotFound,

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("could not open a tab: {0}")]
    Tab(String),
}

/// A captured network response could not be turned into menu items.
#[derive(Debug, Error)]
pub enum NetworkResponseParseError {
    #[error("failed to fetch response body: {0}")]
    Body(String),

    #[error("response body is base64 encoded")]
    Encoded,

    #[error("response is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}
