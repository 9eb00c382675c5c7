//! Error types
//!
//! One enum per layer. Filesystem and backend errors convert into
//! `ShellError`, which the execution engine turns into an exit code and a
//! line on the error stream. Nothing here is fatal to the shell.

use thiserror::Error;

/// Result type alias for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Result type alias for shell operations
pub type ShellResult<T> = Result<T, ShellError>;

/// Errors raised by the virtual filesystem and its backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// A path segment does not exist
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// A non-directory was indexed as if it were one
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The parent directory is not writeable, or the open failed
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Create refused to overwrite an existing entry
    #[error("file exists: {0}")]
    AlreadyExists(String),

    /// Read or write against a closed handle
    #[error("handle closed")]
    HandleClosed,

    /// Write against a read-only handle or backend
    #[error("read-only: {0}")]
    ReadOnly(String),

    /// File operation against a directory
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The remote backend could not be reached
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The persisted backend's store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure fetching a remote resource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch {location} failed: {reason}")]
pub struct FetchError {
    pub location: String,
    pub reason: String,
}

impl FetchError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reading or writing the key-value store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store i/o error on {key}: {reason}")]
    Io { key: String, reason: String },

    #[error("corrupt snapshot under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors loading shell configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Shell-level error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    /// Nothing in PATH or at the given path is executable
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// A redirection handle could not be opened
    #[error("{target}: {reason}")]
    RedirectionTargetUnavailable { target: String, reason: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such file or directory: {0}")]
    PathNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The remote backend is unreachable
    #[error("{0}")]
    BackendFetchFailure(String),

    /// A command is already running; the shell must be idle to start another
    #[error("shell is busy")]
    Busy,

    /// Input was interrupted by a signal
    #[error("interrupted")]
    Interrupted,

    /// Any other filesystem failure
    #[error("{0}")]
    Fs(String),
}

impl ShellError {
    /// Exit code this error maps to
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::CommandNotFound(_) => 127,
            _ => 1,
        }
    }
}

impl From<FsError> for ShellError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound(p) => ShellError::PathNotFound(p),
            FsError::NotADirectory(p) => ShellError::NotADirectory(p),
            FsError::PermissionDenied(p) => ShellError::PermissionDenied(p),
            FsError::Fetch(e) => ShellError::BackendFetchFailure(e.to_string()),
            other => ShellError::Fs(other.to_string()),
        }
    }
}
