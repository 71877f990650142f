//! ash configuration
//!
//! Loads the line-oriented `NAME=value` configuration consumed by the `ash`
//! interpreter at startup.
//!
//! # Discovery order
//!
//! 1. `ASH_CONFIG=/path/to/file` (explicit, tilde-expanded)
//! 2. `.ashenv` in the current directory
//! 3. `.ashenv` in the parent, then the grandparent directory
//! 4. `~/.ashenv`
//!
//! The first file found wins; files are not merged with each other.
//!
//! # Example
//!
//! ```text
//! # comments and blank lines are ignored
//! EDITOR=vi
//! export GREETING="hello world"
//! LOG_DIR="${HOME}/logs"
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{ConfigLoader, CONFIG_ENV, DOTFILE};
pub use types::AshConfig;

/// Load configuration from the default locations.
///
/// Returns an empty configuration when no file is found.
pub fn load() -> Result<AshConfig, ConfigError> {
    ConfigLoader::from_env().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<AshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let config = AshConfig::default();
        assert!(config.is_empty());
        assert!(config.path.is_none());
    }

    #[test]
    fn load_from_file_reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ash.env");
        std::fs::write(&path, "A=1\nB='two words'\n").unwrap();

        let config = load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.get("A"), Some("1"));
        assert_eq!(config.get("B"), Some("two words"));
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let err = load_from_file("/nonexistent/ash.env").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
