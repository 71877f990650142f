//! Error types for ash

use thiserror::Error;

/// Result type alias for ash operations
pub type AshResult<T> = Result<T, AshError>;

/// Status used for generic failures.
pub const EXIT_FAILURE: i32 = 1;
/// Status used for usage errors (bad options, missing arguments).
pub const EXIT_USAGE: i32 = 2;
/// Status used when a command exists but cannot be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Status used when a command cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Error types for ash shell operations
#[derive(Error, Debug)]
pub enum AshError {
    /// Unrecoverable syntax error in a script
    #[error("syntax error: {0}")]
    Parse(String),

    /// Runtime error during script execution
    #[error("{0}")]
    Runtime(String),

    /// IO error (redirection targets, sourced files, spawn failures)
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Command not found
    #[error("{0}: not found")]
    CommandNotFound(String),

    /// Command found but not executable
    #[error("{0}: Permission denied")]
    NotExecutable(String),

    /// Usage error for a builtin
    #[error("{0}")]
    InvalidArgument(String),

    /// Operation rejected by restricted mode
    #[error("{0}: restricted")]
    Restricted(String),

    /// Reference to an unset variable under `set -u`
    #[error("{0}: parameter not set")]
    Unbound(String),

    /// Configuration could not be loaded
    #[error("config: {0}")]
    Config(#[from] ash_config::ConfigError),
}

impl AshError {
    /// Exit status a command reports when it fails with this error.
    pub fn status(&self) -> i32 {
        match self {
            Self::CommandNotFound(_) => EXIT_NOT_FOUND,
            Self::NotExecutable(_) => EXIT_NOT_EXECUTABLE,
            Self::Parse(_) | Self::InvalidArgument(_) => EXIT_USAGE,
            Self::Runtime(_)
            | Self::Io(_)
            | Self::Restricted(_)
            | Self::Unbound(_)
            | Self::Config(_) => EXIT_FAILURE,
        }
    }

    /// Errors that terminate a non-interactive shell rather than just the command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unbound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_shell_conventions() {
        assert_eq!(AshError::CommandNotFound("x".into()).status(), 127);
        assert_eq!(AshError::NotExecutable("x".into()).status(), 126);
        assert_eq!(AshError::InvalidArgument("x".into()).status(), 2);
        assert_eq!(AshError::Runtime("x".into()).status(), 1);
    }

    #[test]
    fn messages_are_prefix_free() {
        assert_eq!(AshError::CommandNotFound("foo".into()).to_string(), "foo: not found");
        assert_eq!(AshError::Restricted("/bin/ls".into()).to_string(), "/bin/ls: restricted");
        assert!(AshError::Unbound("X".into()).is_fatal());
    }
}
