use std::path::PathBuf;

/// Parsed configuration: `NAME=value` entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AshConfig {
    /// File the entries were read from, if any.
    pub path: Option<PathBuf>,
    pub entries: Vec<(String, String)>,
}

impl AshConfig {
    /// Last value assigned to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
