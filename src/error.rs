//! Error types for the pruning engine
//!
//! Repository-level failures (`Clone`, `Fetch`, `Lock`, `Git`) are caught by the
//! runner and only abort the repository they occurred in. `Config` is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the pruning engine
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Bare clone of a configured repository failed
    #[error("failed to clone '{repo}': {message}")]
    Clone {
        /// Configured repository name
        repo: String,
        /// Message reported by git
        message: String,
    },

    /// Fetching from `origin` into the local mirror failed
    #[error("failed to fetch '{repo}': {message}")]
    Fetch {
        /// Configured repository name
        repo: String,
        /// Message reported by git
        message: String,
    },

    /// Any other git invocation failed
    #[error("git {command} failed: {message}")]
    Git {
        /// Subcommand that failed (e.g. "for-each-ref")
        command: String,
        /// Message reported by git
        message: String,
    },

    /// Another run holds the mirror lock
    #[error("mirror is locked by another run: {}", path.display())]
    Lock {
        /// Path of the lock file
        path: PathBuf,
    },

    /// Filesystem failure (mirror directory, lock file, config file)
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
