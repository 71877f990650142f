//! Parser for ash scripts
//!
//! A recursive-descent parser over the lexer's token stream. Control
//! structures are recognized by their leading keyword at command position.
//! When a keyword-led structure is incomplete (`if true` with no `then`),
//! the parser rewinds and keeps the line as a [`Command::Unparsed`] plain
//! command instead of reporting an error. Only operators that cannot start
//! anything (a stray `)`, `;;` or a leading `|`) are syntax errors.

use crate::ast::{CaseArm, Command, CompoundCommand, ListOp, Pipeline, Script, SimpleCommand, Statement};
use crate::error::{AshError, AshResult};
use crate::lexer::{is_redirect_operator, join_tokens, redirect_takes_target, tokenize, Token};

const COMPOUND_KEYWORDS: &[&str] = &["if", "while", "until", "for", "case", "{"];

/// Words that are only special at command position.
pub const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "while", "until", "for", "in", "do", "done", "case", "esac",
    "function", "{", "}", "!",
];

/// Parse a script.
pub fn parse(input: &str) -> AshResult<Script> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
    };
    let script = parser.parse_script(&[])?;
    if let Some(token) = parser.peek() {
        return Err(AshError::Parse(format!("unexpected token `{}'", token.to_string().trim())));
    }
    Ok(script)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_word(&self) -> Option<&str> {
        self.peek().and_then(Token::word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word() == Some(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::HereDoc(_))) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Semi | Token::Newline | Token::HereDoc(_))) {
            self.pos += 1;
        }
    }

    /// Parse statements until end of input, a closing operator, or one of
    /// `terminators` at command position.
    fn parse_script(&mut self, terminators: &[&str]) -> AshResult<Script> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None | Some(Token::RParen | Token::DoubleSemi) => break,
                Some(Token::Word(w)) if terminators.contains(&w.as_str()) => break,
                _ => {}
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Script { statements })
    }

    fn parse_statement(&mut self) -> AshResult<Statement> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::AndIf) => ListOp::And,
                Some(Token::OrIf) => ListOp::Or,
                _ => break,
            };
            self.pos += 1;
            self.skip_newlines();
            rest.push((op, self.parse_pipeline()?));
        }
        let background = self.eat(&Token::Amp);
        Ok(Statement {
            first,
            rest,
            background,
        })
    }

    fn parse_pipeline(&mut self) -> AshResult<Pipeline> {
        let negated = self.eat_word("!");
        let mut commands = vec![self.parse_command()?];
        while self.eat(&Token::Pipe) {
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { negated, commands })
    }

    fn parse_command(&mut self) -> AshResult<Command> {
        let word = match self.peek() {
            Some(Token::LParen) => return self.parse_subshell(),
            Some(Token::Word(w)) => w.clone(),
            Some(token) => {
                return Err(AshError::Parse(format!(
                    "unexpected token `{}'",
                    token.to_string().trim()
                )))
            }
            None => return Err(AshError::Parse("unexpected end of input".to_string())),
        };

        if COMPOUND_KEYWORDS.contains(&word.as_str()) {
            let start = self.pos;
            if let Ok(Some(body)) = self.parse_compound() {
                let redirects = self.parse_redirects();
                return Ok(Command::Compound { body, redirects });
            }
            self.pos = start;
            return Ok(Command::Unparsed(self.parse_words()));
        }

        if word == "function" {
            let start = self.pos;
            self.pos += 1;
            if let Some(name) = self.peek_word().filter(|n| is_function_name(n)).map(String::from) {
                self.pos += 1;
                if self.peek() == Some(&Token::LParen) && self.tokens.get(self.pos + 1) == Some(&Token::RParen) {
                    self.pos += 2;
                }
                return self.parse_function_body(name);
            }
            self.pos = start;
            return Ok(Command::Unparsed(self.parse_words()));
        }

        if is_function_name(&word)
            && self.tokens.get(self.pos + 1) == Some(&Token::LParen)
            && self.tokens.get(self.pos + 2) == Some(&Token::RParen)
        {
            self.pos += 3;
            return self.parse_function_body(word);
        }

        Ok(Command::Simple(self.parse_words()))
    }

    fn parse_subshell(&mut self) -> AshResult<Command> {
        self.pos += 1;
        let body = self.parse_script(&[])?;
        if !self.eat(&Token::RParen) {
            return Err(AshError::Parse("expected `)' to close subshell".to_string()));
        }
        let redirects = self.parse_redirects();
        Ok(Command::Compound {
            body: CompoundCommand::Subshell(body),
            redirects,
        })
    }

    fn parse_function_body(&mut self, name: String) -> AshResult<Command> {
        self.skip_newlines();
        let start = self.pos;
        let is_compound = match self.peek() {
            Some(Token::LParen) => true,
            Some(Token::Word(w)) => COMPOUND_KEYWORDS.contains(&w.as_str()),
            _ => false,
        };
        if is_compound {
            if let Command::Compound { .. } = self.parse_command()? {
                let body = join_tokens(&self.tokens[start..self.pos]);
                return Ok(Command::FunctionDef { name, body });
            }
        }
        Err(AshError::Parse(format!("bad definition of function `{name}'")))
    }

    /// Parse a keyword-led structure. `Ok(None)` means the structure was
    /// incomplete and the caller should fall back to a plain command.
    fn parse_compound(&mut self) -> AshResult<Option<CompoundCommand>> {
        let Some(keyword) = self.peek_word().map(String::from) else {
            return Ok(None);
        };
        self.pos += 1;

        let compound = match keyword.as_str() {
            "if" => {
                let mut branches = Vec::new();
                loop {
                    let condition = self.parse_script(&["then"])?;
                    if condition.statements.is_empty() || !self.eat_word("then") {
                        return Ok(None);
                    }
                    let body = self.parse_script(&["elif", "else", "fi"])?;
                    branches.push((condition, body));
                    if !self.eat_word("elif") {
                        break;
                    }
                }
                let else_body = if self.eat_word("else") {
                    Some(self.parse_script(&["fi"])?)
                } else {
                    None
                };
                if !self.eat_word("fi") {
                    return Ok(None);
                }
                CompoundCommand::If { branches, else_body }
            }
            "while" | "until" => {
                let condition = self.parse_script(&["do"])?;
                if condition.statements.is_empty() || !self.eat_word("do") {
                    return Ok(None);
                }
                let body = self.parse_script(&["done"])?;
                if !self.eat_word("done") {
                    return Ok(None);
                }
                CompoundCommand::While {
                    condition,
                    body,
                    until: keyword == "until",
                }
            }
            "for" => {
                let Some(variable) = self.peek_word().filter(|w| is_name(w)).map(String::from) else {
                    return Ok(None);
                };
                self.pos += 1;
                self.skip_newlines();
                let words = if self.eat_word("in") {
                    let mut words = Vec::new();
                    while let Some(Token::Word(w)) = self.peek() {
                        words.push(w.clone());
                        self.pos += 1;
                    }
                    Some(words)
                } else {
                    None
                };
                self.skip_separators();
                if !self.eat_word("do") {
                    return Ok(None);
                }
                let body = self.parse_script(&["done"])?;
                if !self.eat_word("done") {
                    return Ok(None);
                }
                CompoundCommand::For { variable, words, body }
            }
            "case" => {
                let Some(word) = self.peek_word().map(String::from) else {
                    return Ok(None);
                };
                self.pos += 1;
                self.skip_newlines();
                if !self.eat_word("in") {
                    return Ok(None);
                }
                let mut arms = Vec::new();
                loop {
                    self.skip_separators();
                    if self.eat_word("esac") {
                        break;
                    }
                    self.eat(&Token::LParen);
                    let mut patterns = Vec::new();
                    loop {
                        let Some(pattern) = self.peek_word().map(String::from) else {
                            return Ok(None);
                        };
                        patterns.push(pattern);
                        self.pos += 1;
                        if !self.eat(&Token::Pipe) {
                            break;
                        }
                    }
                    if !self.eat(&Token::RParen) {
                        return Ok(None);
                    }
                    let body = self.parse_script(&["esac"])?;
                    arms.push(CaseArm { patterns, body });
                    if !self.eat(&Token::DoubleSemi) && self.peek_word() != Some("esac") {
                        return Ok(None);
                    }
                }
                CompoundCommand::Case { word, arms }
            }
            "{" => {
                let body = self.parse_script(&["}"])?;
                if !self.eat_word("}") {
                    return Ok(None);
                }
                CompoundCommand::Group(body)
            }
            _ => return Ok(None),
        };
        Ok(Some(compound))
    }

    fn parse_redirects(&mut self) -> Vec<String> {
        let mut redirects = Vec::new();
        while let Some(op) = self.peek_word().filter(|w| is_redirect_operator(w)).map(String::from) {
            self.pos += 1;
            if redirect_takes_target(&op) {
                if let Some(target) = self.peek_word().map(String::from) {
                    self.pos += 1;
                    redirects.push(op);
                    redirects.push(target);
                    continue;
                }
            }
            redirects.push(op);
        }
        redirects
    }

    fn parse_words(&mut self) -> SimpleCommand {
        let mut words = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            words.push(w.clone());
            self.pos += 1;
        }
        SimpleCommand { words }
    }
}

/// Whether `word` is a valid variable name.
pub fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_function_name(word: &str) -> bool {
    !word.is_empty()
        && !KEYWORDS.contains(&word)
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_command(input: &str) -> Command {
        let script = parse(input).unwrap();
        script.statements[0].first.commands[0].clone()
    }

    #[test]
    fn test_parse_simple_command() {
        let script = parse("echo hello world").unwrap();
        assert_eq!(script.statements.len(), 1);
        assert_eq!(
            script.statements[0].first.commands[0],
            Command::Simple(SimpleCommand {
                words: vec!["echo".into(), "hello".into(), "world".into()]
            })
        );
    }

    #[test]
    fn test_parse_lists_and_background() {
        let script = parse("a && b || c; d &\ne").unwrap();
        assert_eq!(script.statements.len(), 3);
        assert_eq!(script.statements[0].rest.len(), 2);
        assert_eq!(script.statements[0].rest[1].0, ListOp::Or);
        assert!(script.statements[1].background);
        assert!(!script.statements[2].background);
    }

    #[test]
    fn test_parse_pipeline_and_negation() {
        let script = parse("! echo a | cat | wc -l").unwrap();
        let pipeline = &script.statements[0].first;
        assert!(pipeline.negated);
        assert_eq!(pipeline.commands.len(), 3);
    }

    #[test]
    fn test_parse_if_elif_else() {
        let cmd = first_command("if a; then b; elif c; then d; else e; fi");
        let Command::Compound { body: CompoundCommand::If { branches, else_body }, .. } = cmd else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_parse_multiline_while() {
        let cmd = first_command("while true\ndo\n  echo x\n  break\ndone");
        assert!(matches!(
            cmd,
            Command::Compound { body: CompoundCommand::While { until: false, .. }, .. }
        ));
    }

    #[test]
    fn test_parse_for_loop_words() {
        let cmd = first_command("for x in a b c; do echo $x; done");
        let Command::Compound { body: CompoundCommand::For { variable, words, body }, .. } = cmd else {
            panic!("expected for");
        };
        assert_eq!(variable, "x");
        assert_eq!(words, Some(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(body.statements.len(), 1);
    }

    #[test]
    fn test_parse_for_without_in() {
        let cmd = first_command("for arg; do echo $arg; done");
        assert!(matches!(
            cmd,
            Command::Compound { body: CompoundCommand::For { words: None, .. }, .. }
        ));
    }

    #[test]
    fn test_parse_case() {
        let cmd = first_command("case $x in\n  a|b) echo ab;;\n  *) echo other;;\nesac");
        let Command::Compound { body: CompoundCommand::Case { word, arms }, .. } = cmd else {
            panic!("expected case");
        };
        assert_eq!(word, "$x");
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].patterns, vec!["a", "b"]);
        assert_eq!(arms[1].patterns, vec!["*"]);
    }

    #[test]
    fn test_parse_function_definitions() {
        let cmd = first_command("greet() { echo hi; }");
        assert_eq!(
            cmd,
            Command::FunctionDef {
                name: "greet".into(),
                body: "{ echo hi ; }".into()
            }
        );
        let cmd = first_command("function greet { echo hi; }");
        assert!(matches!(cmd, Command::FunctionDef { .. }));
    }

    #[test]
    fn test_parse_compound_redirects() {
        let cmd = first_command("while read l; do echo $l; done < input.txt 2>&1");
        let Command::Compound { redirects, .. } = cmd else {
            panic!("expected compound");
        };
        assert_eq!(redirects, vec!["<", "input.txt", "2>&1"]);
    }

    #[test]
    fn test_malformed_if_falls_back_to_plain_command() {
        let cmd = first_command("if true");
        assert_eq!(
            cmd,
            Command::Unparsed(SimpleCommand {
                words: vec!["if".into(), "true".into()]
            })
        );
    }

    #[test]
    fn test_keyword_only_special_at_command_position() {
        let cmd = first_command("echo if then fi");
        assert!(matches!(cmd, Command::Simple(_)));
    }

    #[test]
    fn test_subshell_and_group() {
        let script = parse("(cd /tmp; pwd); { echo a; echo b; }").unwrap();
        assert!(matches!(
            script.statements[0].first.commands[0],
            Command::Compound { body: CompoundCommand::Subshell(_), .. }
        ));
        assert!(matches!(
            script.statements[1].first.commands[0],
            Command::Compound { body: CompoundCommand::Group(_), .. }
        ));
    }

    #[test]
    fn test_stray_operators_are_errors() {
        assert!(parse(")").is_err());
        assert!(parse(";; echo").is_err());
        assert!(parse("| cat").is_err());
        assert!(parse("(echo a").is_err());
    }

    #[test]
    fn test_heredoc_body_is_skipped() {
        let script = parse("cat <<EOF\nline one\nline two\nEOF\necho after").unwrap();
        assert_eq!(script.statements.len(), 2);
        assert_eq!(script.statements[1].first.commands[0].name(), Some("echo"));
    }

    #[test]
    fn test_heredoc_body_with_quote_characters() {
        let script = parse("cat <<EOF\nit's here\nsay \"hi\nEOF\necho after").unwrap();
        assert_eq!(script.statements.len(), 2);
        assert_eq!(script.statements[1].first.commands[0].name(), Some("echo"));
    }

    #[test]
    fn test_heredoc_inside_function_body() {
        let script = parse("f() {\n  cat <<EOF\n'\nEOF\n  echo in\n}\nf").unwrap();
        assert_eq!(script.statements.len(), 2);
        let Command::FunctionDef { body, .. } = &script.statements[0].first.commands[0] else {
            panic!("expected a function definition");
        };
        let inner = parse(body).unwrap();
        assert_eq!(inner.statements.len(), 1);
    }

    #[test]
    fn test_is_name() {
        assert!(is_name("_foo1"));
        assert!(!is_name("1foo"));
        assert!(!is_name("a-b"));
    }
}
