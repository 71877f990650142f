//! Lexer for ash scripts
//!
//! Splits raw script text into words and control operators. Words keep their
//! quotes and backslashes verbatim; removing them is the expander's job, so
//! the expander can tell quoted text from unquoted text.
//!
//! Rules:
//! - single quotes suppress every other marker until the closing quote
//! - double quotes suppress word boundaries but not `$`
//! - `$(` opens a nesting counter that must return to zero before `)`,
//!   quotes or blanks act as boundaries again; `${` works the same way
//! - backticks toggle a verbatim region with the same effect
//! - redirection operators (`<`, `>`, `>>`, `2>`, `2>&1`, `<<`, ...) become
//!   words of their own, absorbing a leading file-descriptor digit
//! - here-document bodies are raw lines: after the newline ending a line
//!   with `<<` operators, everything up to each terminator line becomes a
//!   single [`Token::HereDoc`]

use std::iter::Peekable;
use std::str::Chars;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Word(String),
    Semi,       // ;
    DoubleSemi, // ;;
    Newline,    // \n
    Pipe,       // |
    AndIf,      // &&
    OrIf,       // ||
    Amp,        // &
    LParen,     // (
    RParen,     // )
    /// Raw here-document body lines, terminator line included.
    HereDoc(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word(s) => write!(f, "{s}"),
            Self::Semi => write!(f, ";"),
            Self::DoubleSemi => write!(f, ";;"),
            Self::Newline => writeln!(f),
            Self::Pipe => write!(f, "|"),
            Self::AndIf => write!(f, "&&"),
            Self::OrIf => write!(f, "||"),
            Self::Amp => write!(f, "&"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::HereDoc(body) => write!(f, "{body}"),
        }
    }
}

impl Token {
    pub fn word(&self) -> Option<&str> {
        match self {
            Self::Word(s) => Some(s),
            _ => None,
        }
    }
}

/// Tokenize a script into words and operators.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: input.chars().peekable(),
        tokens: Vec::new(),
        word: String::new(),
        marker: None,
        heredocs: Vec::new(),
    };
    lexer.run();
    lexer.tokens
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    tokens: Vec<Token>,
    word: String,
    /// Set after `<<` (true for `<<-`) until the marker word is read.
    marker: Option<bool>,
    /// Markers whose bodies start after the current line.
    heredocs: Vec<(String, bool)>,
}

impl Lexer<'_> {
    fn run(&mut self) {
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some('\n') => {}
                    Some(next) => {
                        self.word.push('\\');
                        self.word.push(next);
                    }
                    None => self.word.push('\\'),
                },
                '\'' => {
                    self.word.push('\'');
                    self.read_single_quoted();
                }
                '"' => {
                    self.word.push('"');
                    self.read_double_quoted();
                }
                '`' => {
                    self.word.push('`');
                    self.read_backtick();
                }
                '$' => {
                    self.word.push('$');
                    self.read_dollar();
                }
                ' ' | '\t' | '\r' => self.finish_word(),
                '\n' => {
                    self.finish_word();
                    self.tokens.push(Token::Newline);
                    self.read_heredoc_bodies();
                }
                '#' if self.word.is_empty() => {
                    while let Some(&next) = self.chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                ';' => {
                    self.finish_word();
                    if self.chars.peek() == Some(&';') {
                        self.chars.next();
                        self.tokens.push(Token::DoubleSemi);
                    } else {
                        self.tokens.push(Token::Semi);
                    }
                }
                '|' => {
                    self.finish_word();
                    if self.chars.peek() == Some(&'|') {
                        self.chars.next();
                        self.tokens.push(Token::OrIf);
                    } else {
                        self.tokens.push(Token::Pipe);
                    }
                }
                '&' => {
                    self.finish_word();
                    if self.chars.peek() == Some(&'&') {
                        self.chars.next();
                        self.tokens.push(Token::AndIf);
                    } else {
                        self.tokens.push(Token::Amp);
                    }
                }
                '(' => {
                    self.finish_word();
                    self.tokens.push(Token::LParen);
                }
                ')' => {
                    self.finish_word();
                    self.tokens.push(Token::RParen);
                }
                '<' | '>' => self.read_redirect(c),
                _ => self.word.push(c),
            }
        }
        self.finish_word();
    }

    fn finish_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.word);
        if let Some(strip_tabs) = self.marker.take() {
            let marker = word.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect();
            self.heredocs.push((marker, strip_tabs));
        }
        self.tokens.push(Token::Word(word));
    }

    fn read_heredoc_bodies(&mut self) {
        self.marker = None;
        let mut body = String::new();
        for (marker, strip_tabs) in std::mem::take(&mut self.heredocs) {
            loop {
                let mut line = String::new();
                let mut ended = false;
                for c in self.chars.by_ref() {
                    if c == '\n' {
                        ended = true;
                        break;
                    }
                    line.push(c);
                }
                body.push_str(&line);
                if ended {
                    body.push('\n');
                }
                let text = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
                if !ended || text == marker {
                    break;
                }
            }
        }
        if !body.is_empty() {
            self.tokens.push(Token::HereDoc(body));
        }
    }

    fn push_escaped(&mut self) {
        if let Some(next) = self.chars.next() {
            self.word.push(next);
        }
    }

    fn read_single_quoted(&mut self) {
        for c in self.chars.by_ref() {
            self.word.push(c);
            if c == '\'' {
                return;
            }
        }
    }

    fn read_double_quoted(&mut self) {
        while let Some(c) = self.chars.next() {
            self.word.push(c);
            match c {
                '"' => return,
                '\\' => self.push_escaped(),
                '$' => self.read_dollar(),
                '`' => self.read_backtick(),
                _ => {}
            }
        }
    }

    fn read_backtick(&mut self) {
        while let Some(c) = self.chars.next() {
            self.word.push(c);
            match c {
                '`' => return,
                '\\' => self.push_escaped(),
                _ => {}
            }
        }
    }

    fn read_dollar(&mut self) {
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                self.word.push('(');
                self.read_parens();
            }
            Some('{') => {
                self.chars.next();
                self.word.push('{');
                self.read_braces();
            }
            _ => {}
        }
    }

    /// Consume up to the `)` closing a `$(` (or `$((`) opener.
    fn read_parens(&mut self) {
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.chars.next() {
            self.word.push(c);
            if let Some(q) = quote {
                if c == '\\' && q != '\'' {
                    self.push_escaped();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\\' => self.push_escaped(),
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn read_braces(&mut self) {
        let mut depth = 1usize;
        while let Some(c) = self.chars.next() {
            self.word.push(c);
            match c {
                '\\' => self.push_escaped(),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn read_redirect(&mut self, first: char) {
        let mut op = if !self.word.is_empty() && self.word.chars().all(|d| d.is_ascii_digit()) {
            std::mem::take(&mut self.word)
        } else {
            self.finish_word();
            String::new()
        };
        op.push(first);

        match (first, self.chars.peek().copied()) {
            ('>', Some('>')) => {
                op.push('>');
                self.chars.next();
            }
            ('>', Some('|')) => {
                self.chars.next();
            }
            ('<', Some('<')) => {
                op.push('<');
                self.chars.next();
                let strip_tabs = self.chars.peek() == Some(&'-');
                if strip_tabs {
                    op.push('-');
                    self.chars.next();
                }
                self.marker = Some(strip_tabs);
            }
            (_, Some('&')) => {
                op.push('&');
                self.chars.next();
                while let Some(&d) = self.chars.peek() {
                    if d.is_ascii_digit() {
                        op.push(d);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                if self.chars.peek() == Some(&'-') {
                    op.push('-');
                    self.chars.next();
                }
            }
            _ => {}
        }

        self.tokens.push(Token::Word(op));
    }
}

/// Whether a raw word is a redirection operator produced by the lexer.
pub fn is_redirect_operator(word: &str) -> bool {
    let rest = word.trim_start_matches(|c: char| c.is_ascii_digit());
    match rest {
        "<" | ">" | ">>" | "<<" | "<<-" => true,
        _ => {
            let Some(target) = rest.strip_prefix(">&").or_else(|| rest.strip_prefix("<&")) else {
                return false;
            };
            target == "-" || (!target.is_empty() && target.chars().all(|c| c.is_ascii_digit()))
        }
    }
}

/// Whether a redirection operator consumes the following word as its target.
pub fn redirect_takes_target(op: &str) -> bool {
    !op.contains('&')
}

/// Reconstitute source text from a token slice.
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token == &Token::Newline {
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
            continue;
        }
        if let Token::HereDoc(body) = token {
            out.push_str(body);
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<String> {
        tokenize(input)
            .into_iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(
            tokenize("echo hello"),
            vec![Token::Word("echo".into()), Token::Word("hello".into())]
        );
    }

    #[test]
    fn test_quotes_are_kept_raw() {
        assert_eq!(words("echo \"hello world\" 'a $b'"), vec!["echo", "\"hello world\"", "'a $b'"]);
    }

    #[test]
    fn test_escape_is_preserved() {
        assert_eq!(words(r"echo a\ b \$x"), vec!["echo", r"a\ b", r"\$x"]);
    }

    #[test]
    fn test_command_substitution_nesting() {
        assert_eq!(
            words("echo $(echo a | tr a b) `date +%s` ${X:-a b}"),
            vec!["echo", "$(echo a | tr a b)", "`date +%s`", "${X:-a b}"]
        );
        assert_eq!(words("x=$(echo \")\")"), vec!["x=$(echo \")\")"]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokenize("a && b || c | d & e; f;;"),
            vec![
                Token::Word("a".into()),
                Token::AndIf,
                Token::Word("b".into()),
                Token::OrIf,
                Token::Word("c".into()),
                Token::Pipe,
                Token::Word("d".into()),
                Token::Amp,
                Token::Word("e".into()),
                Token::Semi,
                Token::Word("f".into()),
                Token::DoubleSemi,
            ]
        );
    }

    #[test]
    fn test_redirection_operators() {
        assert_eq!(
            words("cmd >out 2>>err <in 2>&1 >&2 1>&- <<EOF"),
            vec!["cmd", ">", "out", "2>>", "err", "<", "in", "2>&1", ">&2", "1>&-", "<<", "EOF"]
        );
        assert!(is_redirect_operator("2>&1"));
        assert!(is_redirect_operator(">>"));
        assert!(!is_redirect_operator("a>"));
        assert!(!redirect_takes_target("2>&-"));
    }

    #[test]
    fn test_comments() {
        assert_eq!(words("echo a # comment\necho b#c"), vec!["echo", "a", "\n", "echo", "b#c"]);
    }

    #[test]
    fn test_function_definition_tokens() {
        assert_eq!(
            tokenize("f() { echo; }"),
            vec![
                Token::Word("f".into()),
                Token::LParen,
                Token::RParen,
                Token::Word("{".into()),
                Token::Word("echo".into()),
                Token::Semi,
                Token::Word("}".into()),
            ]
        );
    }

    #[test]
    fn test_heredoc_body_is_raw() {
        assert_eq!(
            tokenize("cat <<'EOF'\nit's $x\nEOF\necho after"),
            vec![
                Token::Word("cat".into()),
                Token::Word("<<".into()),
                Token::Word("'EOF'".into()),
                Token::Newline,
                Token::HereDoc("it's $x\nEOF\n".into()),
                Token::Word("echo".into()),
                Token::Word("after".into()),
            ]
        );
    }

    #[test]
    fn test_heredoc_strip_tabs_and_join() {
        let tokens = tokenize("{ cat <<-END\n\tbody\n\tEND\necho x; }");
        assert_eq!(tokens[5], Token::HereDoc("\tbody\n\tEND\n".into()));
        assert_eq!(join_tokens(&tokens), "{ cat <<- END\n\tbody\n\tEND\necho x ; }");
    }
}
