//! Harness Error Hierarchy
//!
//! Separates failures by how a test should react to them:
//! launch failures and unexpected peer answers are fatal immediately,
//! unreachable peers only mean "not converged yet", and convergence
//! timeouts are fatal once the wait budget is spent.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Peer could not be launched (no retry at this layer)
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// HTTP query against a peer failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A polled condition did not become true in time
    #[error("Timeout waiting for condition {condition} to be satisfied in {timeout:?}")]
    ConvergenceTimeout { condition: String, timeout: Duration },

    /// Harness configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Peer executable not found at {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to reserve an ephemeral port: {0}")]
    PortAllocation(#[source] io::Error),

    #[error("Port seed {seed} for peer {peer_index} is outside the valid port range")]
    PortOutOfRange { seed: u16, peer_index: usize },

    #[error("Failed to prepare peer directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Peer is not listening yet, or the connection broke before a status arrived
    #[error("Peer {uri} is unreachable: {source}")]
    Unreachable {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// Peer answered, but not with a success status
    #[error("Peer {uri} answered GET {path} with HTTP {status}: {body}")]
    UnexpectedStatus {
        uri: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode GET {path} response from {uri}: {source}")]
    Decode {
        uri: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid peer uri {0}")]
    InvalidUri(String),

    #[error("Request to {uri} failed: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    /// True when the failure means "peer not reachable yet" rather than a defect.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Query(QueryError::Unreachable { .. }))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ConvergenceTimeout { .. })
    }
}
