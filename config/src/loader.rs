use crate::{AshConfig, ConfigError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ASH_CONFIG";

/// Dotfile searched for in the working directory and its parents.
pub const DOTFILE: &str = ".ashenv";

/// How many parent directories above the start directory are searched.
const PARENT_LEVELS: usize = 2;

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("static regex")
    })
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    start_dir: Option<PathBuf>,
    search_home: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader that only walks the directory tree; `ASH_CONFIG` is ignored.
    pub fn new() -> Self {
        Self {
            explicit_file: None,
            start_dir: None,
            search_home: true,
        }
    }

    /// A loader honouring the `ASH_CONFIG` environment variable.
    pub fn from_env() -> Self {
        let mut loader = Self::new();
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                loader.explicit_file = Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
            }
        }
        loader
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(shellexpand::tilde(path).as_ref()));
        self
    }

    /// Directory the dotfile walk starts from (defaults to the process cwd).
    pub fn start_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(dir.into());
        self
    }

    pub fn search_home(mut self, enabled: bool) -> Self {
        self.search_home = enabled;
        self
    }

    /// Locate the dotfile without reading it.
    pub fn discover(&self) -> Option<PathBuf> {
        let start = self
            .start_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())?;

        let mut dir: Option<&Path> = Some(start.as_path());
        for _ in 0..=PARENT_LEVELS {
            let Some(current) = dir else { break };
            let candidate = current.join(DOTFILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = current.parent();
        }

        if self.search_home {
            if let Some(home) = dirs::home_dir() {
                let candidate = home.join(DOTFILE);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    pub fn load(&self) -> Result<AshConfig, ConfigError> {
        let path = match &self.explicit_file {
            Some(explicit) => {
                if explicit.exists() && !explicit.is_file() {
                    return Err(ConfigError::NotAFile(explicit.clone()));
                }
                explicit.clone()
            }
            None => match self.discover() {
                Some(found) => found,
                None => {
                    debug!("no {} found", DOTFILE);
                    return Ok(AshConfig::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        debug!(path = %path.display(), "loading config");

        Ok(AshConfig {
            entries: self.parse(&content, &path),
            path: Some(path),
        })
    }

    /// Parse `NAME=value` lines. Malformed lines are skipped with a warning.
    pub fn parse(&self, content: &str, path: &Path) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(caps) = line_regex().captures(line) else {
                warn!(path = %path.display(), line = index + 1, "ignoring malformed config line");
                continue;
            };
            let name = caps[1].to_string();
            let raw = caps[2].trim();

            let value = if let Some(inner) = strip_quotes(raw, '\'') {
                inner.to_string()
            } else {
                let inner = strip_quotes(raw, '"').unwrap_or(raw);
                self.expand_references(inner, &entries)
            };
            entries.push((name, value));
        }

        entries
    }

    /// Replace `${NAME}` with an earlier entry or the process environment.
    fn expand_references(&self, value: &str, earlier: &[(String, String)]) -> String {
        reference_regex()
            .replace_all(value, |caps: &regex::Captures| {
                let name = &caps[1];
                earlier
                    .iter()
                    .rev()
                    .find(|(key, _)| key == name)
                    .map(|(_, v)| v.clone())
                    .or_else(|| std::env::var(name).ok())
                    .unwrap_or_default()
            })
            .to_string()
    }
}

fn strip_quotes(value: &str, quote: char) -> Option<&str> {
    if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<(String, String)> {
        ConfigLoader::new().parse(content, Path::new("test.env"))
    }

    #[test]
    fn parses_plain_and_quoted_values() {
        let entries = parse("A=1\nB=\"two words\"\nC='single'\n");
        assert_eq!(
            entries,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "single".to_string()),
            ]
        );
    }

    #[test]
    fn skips_comments_blank_and_malformed_lines() {
        let entries = parse("# comment\n\n  \nnot a line\n1BAD=x\nexport OK=yes\n");
        assert_eq!(entries, vec![("OK".to_string(), "yes".to_string())]);
    }

    #[test]
    fn expands_earlier_entries() {
        let entries = parse("BASE=/opt\nBIN=\"${BASE}/bin\"\nLIT='${BASE}'\n");
        assert_eq!(entries[1].1, "/opt/bin");
        assert_eq!(entries[2].1, "${BASE}");
    }

    #[test]
    fn missing_reference_becomes_empty() {
        let entries = parse("X=${NONEXISTENT_ASH_CONFIG_VAR_XYZ}end\n");
        assert_eq!(entries[0].1, "end");
    }

    #[test]
    fn discovers_dotfile_in_parent_directories() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join(DOTFILE), "FOUND=grandparent\n").unwrap();

        let loader = ConfigLoader::new().start_dir(&nested).search_home(false);
        assert_eq!(loader.discover(), Some(root.path().join(DOTFILE)));

        let config = loader.load().unwrap();
        assert_eq!(config.get("FOUND"), Some("grandparent"));
    }

    #[test]
    fn stops_after_two_parent_levels() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join(DOTFILE), "FOUND=too-far\n").unwrap();

        let loader = ConfigLoader::new().start_dir(&nested).search_home(false);
        assert_eq!(loader.discover(), None);
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn nearest_dotfile_wins() {
        let root = tempfile::tempdir().unwrap();
        let child = root.path().join("child");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(root.path().join(DOTFILE), "WHO=parent\n").unwrap();
        std::fs::write(child.join(DOTFILE), "WHO=child\n").unwrap();

        let config = ConfigLoader::new()
            .start_dir(&child)
            .search_home(false)
            .load()
            .unwrap();
        assert_eq!(config.get("WHO"), Some("child"));
    }

    #[test]
    fn explicit_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .with_file(dir.path().to_str().unwrap())
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAFile(_)));
    }
}
