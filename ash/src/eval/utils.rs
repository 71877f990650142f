use crate::shell::Shell;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

/// Expand `echo -e` style escapes. The flag is true when `\c` asked for
/// output to stop.
pub(crate) fn interpret_escape_sequences(s: &str) -> (String, bool) {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('e') => result.push('\x1b'),
            Some('f') => result.push('\x0C'),
            Some('v') => result.push('\x0B'),
            Some('c') => return (result, true),
            Some('0') => {
                let mut value = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                result.push(char::from_u32(value).unwrap_or('\0'));
            }
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    (result, false)
}

/// Wildcard match supporting `*`, `?` and `[...]` classes.
pub(crate) fn match_glob_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob_at(&pattern, &name)
}

fn glob_at(pattern: &[char], name: &[char]) -> bool {
    let Some((&p, rest)) = pattern.split_first() else {
        return name.is_empty();
    };
    match p {
        '*' => {
            if rest.is_empty() {
                return true;
            }
            (0..=name.len()).any(|skip| glob_at(rest, &name[skip..]))
        }
        '?' => !name.is_empty() && glob_at(rest, &name[1..]),
        '[' => {
            let Some((&c, name_rest)) = name.split_first() else {
                return false;
            };
            match match_class(rest, c) {
                Some((matched, after)) => matched && glob_at(after, name_rest),
                None => c == '[' && glob_at(rest, name_rest),
            }
        }
        '\\' if !rest.is_empty() => {
            !name.is_empty() && name[0] == rest[0] && glob_at(&rest[1..], &name[1..])
        }
        _ => !name.is_empty() && name[0] == p && glob_at(rest, &name[1..]),
    }
}

/// Match `c` against a bracket class starting just after `[`. Returns the
/// result and the pattern after `]`, or `None` if the class is unterminated.
fn match_class(pattern: &[char], c: char) -> Option<(bool, &[char])> {
    let mut i = 0;
    let negated = matches!(pattern.first(), Some('!' | '^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let p = pattern[i];
        if p == ']' && !first {
            return Some((matched != negated, &pattern[i + 1..]));
        }
        first = false;
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            if (p..=pattern[i + 2]).contains(&c) {
                matched = true;
            }
            i += 3;
        } else {
            if p == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

/// `case` pattern matching: exact text, `*`, `prefix*`, `*suffix`,
/// `*substr*` and `a|b` alternation. Other wildcard syntax is literal.
pub(crate) fn match_case_pattern(pattern: &str, word: &str) -> bool {
    pattern.split('|').any(|alt| {
        if alt == "*" {
            return true;
        }
        let starts = alt.starts_with('*');
        let ends = alt.len() > 1 && alt.ends_with('*');
        match (starts, ends) {
            (true, true) => word.contains(&alt[1..alt.len() - 1]),
            (true, false) => word.ends_with(&alt[1..]),
            (false, true) => word.starts_with(&alt[..alt.len() - 1]),
            (false, false) => alt == word,
        }
    })
}

/// Lexically normalize `path` against `base`, resolving `.` and `..`.
pub(crate) fn normalize_path(base: &Path, path: &str) -> PathBuf {
    let joined = if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        base.join(path)
    };
    let mut out = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

pub(crate) fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl Shell {
    pub(crate) fn resolve_path(&self, path: &str) -> PathBuf {
        normalize_path(&self.cwd, path)
    }

    /// Search `$PATH` for an executable named `name`.
    pub(crate) fn find_in_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.get_var("PATH").unwrap_or("/usr/local/bin:/usr/bin:/bin");
        path.split(':')
            .map(|dir| if dir.is_empty() { "." } else { dir })
            .map(|dir| self.resolve_path(dir).join(name))
            .find(|candidate| is_executable(candidate))
    }

    /// Resolve a command name to a path, consulting and filling the hash table.
    pub(crate) fn lookup_command(&mut self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            return Some(self.resolve_path(name));
        }
        if let Some((path, hits)) = self.hashed.get_mut(name) {
            if is_executable(path) {
                *hits += 1;
                return Some(path.clone());
            }
        }
        let found = self.find_in_path(name)?;
        self.hashed.insert(name.to_string(), (found.clone(), 1));
        Some(found)
    }
}
