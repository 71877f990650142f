//! Abstract Syntax Tree for ash scripts
//!
//! Words are stored raw, exactly as the lexer produced them (quotes and
//! backslashes included); expansion happens at execution time.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub statements: Vec<Statement>,
}

/// An and-or list, optionally run in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub first: Pipeline,
    pub rest: Vec<(ListOp, Pipeline)>,
    pub background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub negated: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleCommand {
    /// Raw words: assignment prefixes, command name, arguments and
    /// redirection operators with their targets.
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Simple(SimpleCommand),
    /// A keyword-led line that did not form a complete control structure.
    /// It runs as a plain command, keyword included.
    Unparsed(SimpleCommand),
    Compound {
        body: CompoundCommand,
        redirects: Vec<String>,
    },
    /// `name() compound` or `function name compound`; the body is kept as
    /// source text and reparsed on each call.
    FunctionDef { name: String, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundCommand {
    If {
        branches: Vec<(Script, Script)>,
        else_body: Option<Script>,
    },
    While {
        condition: Script,
        body: Script,
        until: bool,
    },
    For {
        variable: String,
        /// `None` iterates over the positional parameters.
        words: Option<Vec<String>>,
        body: Script,
    },
    Case {
        word: String,
        arms: Vec<CaseArm>,
    },
    Group(Script),
    Subshell(Script),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArm {
    pub patterns: Vec<String>,
    pub body: Script,
}

impl Command {
    /// First word of a simple command, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Simple(c) | Self::Unparsed(c) => c.words.first().map(String::as_str),
            _ => None,
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        for (op, pipeline) in &self.rest {
            match op {
                ListOp::And => write!(f, " && {pipeline}")?,
                ListOp::Or => write!(f, " || {pipeline}")?,
            }
        }
        if self.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "! ")?;
        }
        for (i, cmd) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(c) | Self::Unparsed(c) => write!(f, "{}", c.words.join(" ")),
            Self::Compound { body, redirects } => {
                write!(f, "{body}")?;
                if !redirects.is_empty() {
                    write!(f, " {}", redirects.join(" "))?;
                }
                Ok(())
            }
            Self::FunctionDef { name, body } => write!(f, "{name}() {body}"),
        }
    }
}

impl fmt::Display for CompoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::If { branches, else_body } => {
                for (i, (cond, body)) in branches.iter().enumerate() {
                    let kw = if i == 0 { "if" } else { "elif" };
                    write!(f, "{kw} {cond}; then {body}; ")?;
                }
                if let Some(body) = else_body {
                    write!(f, "else {body}; ")?;
                }
                write!(f, "fi")
            }
            Self::While { condition, body, until } => {
                let kw = if *until { "until" } else { "while" };
                write!(f, "{kw} {condition}; do {body}; done")
            }
            Self::For { variable, words, body } => {
                write!(f, "for {variable}")?;
                if let Some(words) = words {
                    write!(f, " in {}", words.join(" "))?;
                }
                write!(f, "; do {body}; done")
            }
            Self::Case { word, arms } => {
                write!(f, "case {word} in ")?;
                for arm in arms {
                    write!(f, "{}) {};; ", arm.patterns.join("|"), arm.body)?;
                }
                write!(f, "esac")
            }
            Self::Group(body) => write!(f, "{{ {body}; }}"),
            Self::Subshell(body) => write!(f, "({body})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(words: &[&str]) -> Command {
        Command::Simple(SimpleCommand {
            words: words.iter().map(|w| (*w).to_string()).collect(),
        })
    }

    #[test]
    fn test_display_pipeline_statement() {
        let stmt = Statement {
            first: Pipeline {
                negated: true,
                commands: vec![simple(&["echo", "a"]), simple(&["cat"])],
            },
            rest: vec![(
                ListOp::Or,
                Pipeline {
                    negated: false,
                    commands: vec![simple(&["true"])],
                },
            )],
            background: true,
        };
        assert_eq!(stmt.to_string(), "! echo a | cat || true &");
    }

    #[test]
    fn test_command_name() {
        assert_eq!(simple(&["ls", "-l"]).name(), Some("ls"));
        let group = Command::Compound {
            body: CompoundCommand::Group(Script::default()),
            redirects: vec![],
        };
        assert_eq!(group.name(), None);
    }
}
