use super::utils::match_glob_pattern;
use super::{BoxFuture, ExecContext, Input, Output};
use crate::error::{AshError, AshResult};
use crate::parser::is_name;
use crate::shell::Shell;

const DEFAULT_IFS: &str = " \t\n";

/// Accumulates the fields a word expands to. Text from quotes and literals
/// joins the current field; unquoted expansion results are split on IFS.
#[derive(Default)]
struct FieldBuilder {
    fields: Vec<String>,
    current: String,
    /// The current field exists even if empty (it contained quotes).
    started: bool,
}

impl FieldBuilder {
    fn push_literal(&mut self, s: &str) {
        self.current.push_str(s);
        self.started = true;
    }

    fn push_char(&mut self, c: char) {
        self.current.push(c);
        self.started = true;
    }

    fn push_split(&mut self, s: &str, ifs: &str) {
        for c in s.chars() {
            if !ifs.contains(c) {
                self.push_char(c);
            } else if c.is_whitespace() {
                self.break_field();
            } else {
                self.fields.push(std::mem::take(&mut self.current));
                self.started = false;
            }
        }
    }

    fn break_field(&mut self) {
        if self.started {
            self.fields.push(std::mem::take(&mut self.current));
            self.started = false;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.break_field();
        self.fields
    }
}

/// A `${...}` body split into parameter, operator and operand.
#[derive(Debug, PartialEq, Eq)]
enum BraceExpr<'a> {
    Plain(&'a str),
    Length(&'a str),
    Op {
        name: &'a str,
        op: &'static str,
        operand: &'a str,
    },
}

const BRACE_OPS: &[&str] = &[":-", ":=", ":+", ":?", "##", "%%", "-", "=", "+", "?", "#", "%"];

fn parse_brace(inner: &str) -> AshResult<BraceExpr<'_>> {
    let bad = || AshError::Runtime(format!("${{{inner}}}: bad substitution"));
    if inner.len() > 1 {
        if let Some(name) = inner.strip_prefix('#') {
            if is_parameter(name) {
                return Ok(BraceExpr::Length(name));
            }
        }
    }

    let first = inner.chars().next().ok_or_else(bad)?;
    let name_len = if first.is_ascii_digit() {
        inner.chars().take_while(char::is_ascii_digit).count()
    } else if "$?#!@*-".contains(first) {
        1
    } else {
        inner
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count()
    };
    if name_len == 0 {
        return Err(bad());
    }
    let (name, rest) = inner.split_at(name_len);
    if rest.is_empty() {
        return Ok(BraceExpr::Plain(name));
    }
    let op = BRACE_OPS
        .iter()
        .find(|op| rest.starts_with(**op))
        .ok_or_else(bad)?;
    Ok(BraceExpr::Op {
        name,
        op,
        operand: &rest[op.len()..],
    })
}

fn is_parameter(name: &str) -> bool {
    is_name(name)
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
        || matches!(name, "$" | "?" | "#" | "!" | "@" | "*" | "-")
}

/// Index of the character closing the construct whose body starts at
/// `start`, skipping quoted text and escapes.
fn find_closing(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn find_backtick(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '`' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn collect(chars: &[char], from: usize, to: usize) -> String {
    chars[from..to].iter().collect()
}

fn remove_prefix(value: &str, pattern: &str, greedy: bool) -> String {
    let mut cuts: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
    cuts.push(value.len());
    if greedy {
        cuts.reverse();
    }
    cuts.into_iter()
        .find(|&i| match_glob_pattern(pattern, &value[..i]))
        .map_or_else(|| value.to_string(), |i| value[i..].to_string())
}

fn remove_suffix(value: &str, pattern: &str, greedy: bool) -> String {
    let mut cuts: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
    cuts.push(value.len());
    if !greedy {
        cuts.reverse();
    }
    cuts.into_iter()
        .find(|&i| match_glob_pattern(pattern, &value[i..]))
        .map_or_else(|| value.to_string(), |i| value[..i].to_string())
}

impl Shell {
    /// Expand a raw word into fields: parameters, arithmetic, command
    /// substitution, IFS splitting of unquoted results and quote removal.
    pub(crate) async fn expand_word_fields(&mut self, raw: &str, ctx: &mut ExecContext) -> AshResult<Vec<String>> {
        let mut fields = FieldBuilder::default();
        self.expand_into(raw, &mut fields, true, ctx).await?;
        Ok(fields.finish())
    }

    /// Expand a raw word to a single string without field splitting.
    pub(crate) async fn expand_word(&mut self, raw: &str, ctx: &mut ExecContext) -> AshResult<String> {
        let mut fields = FieldBuilder::default();
        self.expand_into(raw, &mut fields, false, ctx).await?;
        Ok(fields.finish().join(" "))
    }

    fn expand_operand<'a>(&'a mut self, raw: &'a str, ctx: &'a mut ExecContext) -> BoxFuture<'a, AshResult<String>> {
        Box::pin(self.expand_word(raw, ctx))
    }

    fn ifs(&self, split: bool) -> String {
        if split {
            self.get_var("IFS").unwrap_or(DEFAULT_IFS).to_string()
        } else {
            String::new()
        }
    }

    async fn expand_into(
        &mut self,
        raw: &str,
        fields: &mut FieldBuilder,
        split: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<()> {
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;

        if chars.first() == Some(&'~') && matches!(chars.get(1), None | Some('/')) {
            if let Some(home) = self.home_dir() {
                fields.push_literal(&home);
                i = 1;
            }
        }

        while i < chars.len() {
            match chars[i] {
                '\'' => {
                    let end = (i + 1..chars.len()).find(|&j| chars[j] == '\'').unwrap_or(chars.len());
                    fields.push_literal(&collect(&chars, i + 1, end));
                    i = end + 1;
                }
                '"' => {
                    i = self.expand_double_quoted(&chars, i + 1, fields, ctx).await?;
                }
                '\\' => {
                    match chars.get(i + 1) {
                        Some(&c) => fields.push_char(c),
                        None => fields.push_char('\\'),
                    }
                    i += 2;
                }
                '$' => {
                    i = self.expand_dollar(&chars, i, fields, false, split, ctx).await?;
                }
                '`' => {
                    i = self.expand_backtick(&chars, i, fields, false, split, ctx).await?;
                }
                c => {
                    fields.push_char(c);
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// Expand a double-quoted segment starting after its opening quote.
    /// Returns the index after the closing quote.
    async fn expand_double_quoted(
        &mut self,
        chars: &[char],
        mut i: usize,
        fields: &mut FieldBuilder,
        ctx: &mut ExecContext,
    ) -> AshResult<usize> {
        let mut only_at = false;
        let mut saw_other = false;
        while i < chars.len() && chars[i] != '"' {
            match chars[i] {
                '\\' => {
                    saw_other = true;
                    match chars.get(i + 1) {
                        Some('\n') => {}
                        Some(&c @ ('$' | '`' | '"' | '\\')) => fields.push_char(c),
                        Some(&c) => {
                            fields.push_char('\\');
                            fields.push_char(c);
                        }
                        None => fields.push_char('\\'),
                    }
                    i += 2;
                }
                '$' => {
                    let is_at = matches!(chars.get(i + 1), Some('@'))
                        || chars[i..].starts_with(&['$', '{', '@', '}']);
                    if is_at {
                        only_at = true;
                    } else {
                        saw_other = true;
                    }
                    i = self.expand_dollar(chars, i, fields, true, false, ctx).await?;
                }
                '`' => {
                    saw_other = true;
                    i = self.expand_backtick(chars, i, fields, true, false, ctx).await?;
                }
                c => {
                    saw_other = true;
                    fields.push_char(c);
                    i += 1;
                }
            }
        }
        if !(only_at && !saw_other) {
            fields.started = true;
        }
        Ok(i + 1)
    }

    /// Expand the `$` construct at `chars[i]`, returning the index after it.
    async fn expand_dollar(
        &mut self,
        chars: &[char],
        i: usize,
        fields: &mut FieldBuilder,
        quoted: bool,
        split: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<usize> {
        let ifs = self.ifs(split && !quoted);
        let push = |fields: &mut FieldBuilder, value: &str| {
            if quoted || ifs.is_empty() {
                fields.push_literal(value);
            } else {
                fields.push_split(value, &ifs);
            }
        };

        match chars.get(i + 1).copied() {
            Some('(') if chars.get(i + 2) == Some(&'(') => {
                if let Some(end) = find_closing(chars, i + 3, '(', ')') {
                    if chars.get(end + 1) == Some(&')') {
                        let expr = collect(chars, i + 3, end);
                        let expanded = self.expand_operand(&expr, ctx).await?;
                        let value = self.evaluate_arithmetic(&expanded)?;
                        push(fields, &value.to_string());
                        return Ok(end + 2);
                    }
                }
                self.expand_command_sub_at(chars, i, fields, quoted, split, ctx).await
            }
            Some('(') => self.expand_command_sub_at(chars, i, fields, quoted, split, ctx).await,
            Some('{') => {
                let Some(end) = find_closing(chars, i + 2, '{', '}') else {
                    return Err(AshError::Runtime("missing '}'".to_string()));
                };
                let inner = collect(chars, i + 2, end);
                match parse_brace(&inner)? {
                    BraceExpr::Plain(name @ ("@" | "*")) => self.push_positional(name, fields, quoted, &ifs),
                    expr => {
                        let value = self.expand_brace(expr, ctx).await?;
                        push(fields, &value);
                    }
                }
                Ok(end + 1)
            }
            Some(c @ ('@' | '*')) => {
                self.push_positional(if c == '@' { "@" } else { "*" }, fields, quoted, &ifs);
                Ok(i + 2)
            }
            Some(c) if "$?#!-".contains(c) || c.is_ascii_digit() => {
                let name = c.to_string();
                let value = self.require_parameter(&name)?;
                push(fields, &value);
                Ok(i + 2)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let len = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .count();
                let name = collect(chars, i + 1, i + 1 + len);
                let value = self.require_parameter(&name)?;
                push(fields, &value);
                Ok(i + 1 + len)
            }
            _ => {
                fields.push_char('$');
                Ok(i + 1)
            }
        }
    }

    fn push_positional(&self, name: &str, fields: &mut FieldBuilder, quoted: bool, ifs: &str) {
        let args = &self.positional;
        if quoted && name == "*" {
            let sep = self.get_var("IFS").unwrap_or(DEFAULT_IFS).chars().next();
            let joined = args.join(&sep.map(String::from).unwrap_or_default());
            fields.push_literal(&joined);
            return;
        }
        for (n, arg) in args.iter().enumerate() {
            if n > 0 {
                if quoted {
                    fields.fields.push(std::mem::take(&mut fields.current));
                    fields.started = false;
                } else {
                    fields.break_field();
                }
            }
            if quoted || ifs.is_empty() {
                fields.push_literal(arg);
            } else {
                fields.push_split(arg, ifs);
            }
        }
    }

    async fn expand_command_sub_at(
        &mut self,
        chars: &[char],
        i: usize,
        fields: &mut FieldBuilder,
        quoted: bool,
        split: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<usize> {
        let Some(end) = find_closing(chars, i + 2, '(', ')') else {
            return Err(AshError::Runtime("missing ')'".to_string()));
        };
        if self.subst_depth > 0 {
            fields.push_literal(&collect(chars, i, end + 1));
            return Ok(end + 1);
        }
        let source = collect(chars, i + 2, end);
        let output = self.execute_command_sub(&source, ctx).await?;
        self.push_substitution(&output, fields, quoted, split);
        Ok(end + 1)
    }

    async fn expand_backtick(
        &mut self,
        chars: &[char],
        i: usize,
        fields: &mut FieldBuilder,
        quoted: bool,
        split: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<usize> {
        let Some(end) = find_backtick(chars, i + 1) else {
            return Err(AshError::Runtime("missing '`'".to_string()));
        };
        if self.subst_depth > 0 {
            fields.push_literal(&collect(chars, i, end + 1));
            return Ok(end + 1);
        }
        let mut source = String::new();
        let mut j = i + 1;
        while j < end {
            if chars[j] == '\\' && matches!(chars.get(j + 1), Some('`' | '\\' | '$')) {
                j += 1;
            }
            source.push(chars[j]);
            j += 1;
        }
        let output = self.execute_command_sub(&source, ctx).await?;
        self.push_substitution(&output, fields, quoted, split);
        Ok(end + 1)
    }

    fn push_substitution(&self, output: &str, fields: &mut FieldBuilder, quoted: bool, split: bool) {
        let ifs = self.ifs(split && !quoted);
        if ifs.is_empty() {
            fields.push_literal(output);
        } else {
            fields.push_split(output, &ifs);
        }
    }

    /// Run `source` in a subshell and capture its stdout with trailing
    /// newlines removed. Its status becomes `subst_status`.
    async fn execute_command_sub(&mut self, source: &str, ctx: &mut ExecContext) -> AshResult<String> {
        let mut sub = self.clone_for_subshell();
        sub.subst_depth += 1;
        let (stdout, buf) = Output::buffer();
        let mut sub_ctx = ExecContext::new(Input::Null, stdout, ctx.stderr.duplicate());

        let status = sub.execute_source(source, &mut sub_ctx).await?;
        let status = if sub.flags.exit_flag {
            sub.flags.exit_code
        } else {
            status
        };
        let status = sub.run_exit_trap(status, &mut sub_ctx).await;
        sub_ctx.flush().await;
        drop(sub_ctx);

        self.subst_status = Some(status);
        let output = buf
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();
        Ok(output.trim_end_matches('\n').to_string())
    }

    async fn expand_brace(&mut self, expr: BraceExpr<'_>, ctx: &mut ExecContext) -> AshResult<String> {
        let (name, op, operand) = match expr {
            BraceExpr::Plain(name) => return self.require_parameter(name),
            BraceExpr::Length(name) => {
                return Ok(self.require_parameter(name)?.chars().count().to_string());
            }
            BraceExpr::Op { name, op, operand } => (name, op, operand),
        };

        let value = self.get_variable_value(name);
        let colon = op.starts_with(':');
        let use_default = match &value {
            None => true,
            Some(v) => colon && v.is_empty(),
        };

        match op.trim_start_matches(':') {
            "-" => {
                if use_default {
                    self.expand_operand(operand, ctx).await
                } else {
                    Ok(value.unwrap_or_default())
                }
            }
            "=" => {
                if !use_default {
                    return Ok(value.unwrap_or_default());
                }
                if !is_name(name) {
                    return Err(AshError::InvalidArgument(format!("${name}: cannot assign in this way")));
                }
                let default = self.expand_operand(operand, ctx).await?;
                self.set_var(name, &default);
                Ok(default)
            }
            "+" => {
                if use_default {
                    Ok(String::new())
                } else {
                    self.expand_operand(operand, ctx).await
                }
            }
            "?" => {
                if !use_default {
                    return Ok(value.unwrap_or_default());
                }
                let message = self.expand_operand(operand, ctx).await?;
                let message = if message.is_empty() {
                    "parameter null or not set".to_string()
                } else {
                    message
                };
                Err(AshError::Runtime(format!("{name}: {message}")))
            }
            strip => {
                let value = self.require_parameter(name)?;
                let pattern = self.expand_operand(operand, ctx).await?;
                Ok(match strip {
                    "#" => remove_prefix(&value, &pattern, false),
                    "##" => remove_prefix(&value, &pattern, true),
                    "%" => remove_suffix(&value, &pattern, false),
                    _ => remove_suffix(&value, &pattern, true),
                })
            }
        }
    }

    /// Value of a parameter, or `None` when it is unset.
    pub(crate) fn get_variable_value(&self, name: &str) -> Option<String> {
        match name {
            "$" => Some(self.pid.to_string()),
            "?" => Some(self.flags.last_status.to_string()),
            "#" => Some(self.positional.len().to_string()),
            "!" => self.flags.last_bg_pid.map(|pid| pid.to_string()),
            "0" => Some(self.script_name.clone()),
            "-" => Some(self.options.flags()),
            "@" | "*" => Some(self.positional.join(" ")),
            _ => match name.parse::<usize>() {
                Ok(n) => n.checked_sub(1).and_then(|n| self.positional.get(n)).cloned(),
                Err(_) => self.get_var(name).map(str::to_string),
            },
        }
    }

    /// Like [`Shell::get_variable_value`], but an unset parameter is an
    /// error under `set -u`.
    fn require_parameter(&self, name: &str) -> AshResult<String> {
        match self.get_variable_value(name) {
            Some(value) => Ok(value),
            None if self.options.nounset => Err(AshError::Unbound(name.to_string())),
            None => Ok(String::new()),
        }
    }

    pub(crate) fn home_dir(&self) -> Option<String> {
        self.get_var("HOME")
            .map(str::to_string)
            .or_else(|| dirs::home_dir().map(|p| p.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellBuilder;

    fn shell() -> Shell {
        ShellBuilder::new()
            .inherit_env(false)
            .var("NAME", "world")
            .var("PATHISH", "/usr/local/lib/file.tar.gz")
            .var("SPACED", "a  b c")
            .var("EMPTY", "")
            .var("HOME", "/home/test")
            .build()
    }

    fn ctx() -> ExecContext {
        ExecContext::new(Input::Null, Output::Closed, Output::Closed)
    }

    async fn fields(shell: &mut Shell, raw: &str) -> Vec<String> {
        shell.expand_word_fields(raw, &mut ctx()).await.unwrap()
    }

    #[test]
    fn test_parse_brace_forms() {
        assert_eq!(parse_brace("x").unwrap(), BraceExpr::Plain("x"));
        assert_eq!(parse_brace("#x").unwrap(), BraceExpr::Length("x"));
        assert_eq!(parse_brace("#").unwrap(), BraceExpr::Plain("#"));
        assert_eq!(
            parse_brace("x:-a b").unwrap(),
            BraceExpr::Op { name: "x", op: ":-", operand: "a b" }
        );
        assert_eq!(
            parse_brace("10##*/").unwrap(),
            BraceExpr::Op { name: "10", op: "##", operand: "*/" }
        );
        assert!(parse_brace("x^y").is_err());
    }

    #[test]
    fn test_strip_patterns() {
        let v = "/usr/local/lib/file.tar.gz";
        assert_eq!(remove_prefix(v, "*/", false), "usr/local/lib/file.tar.gz");
        assert_eq!(remove_prefix(v, "*/", true), "file.tar.gz");
        assert_eq!(remove_suffix(v, ".*", false), "/usr/local/lib/file.tar");
        assert_eq!(remove_suffix(v, ".*", true), "/usr/local/lib/file");
        assert_eq!(remove_suffix(v, "nomatch", true), v);
    }

    #[tokio::test]
    async fn test_quotes_and_variables() {
        let mut sh = shell();
        assert_eq!(fields(&mut sh, "hello").await, vec!["hello"]);
        assert_eq!(fields(&mut sh, "'$NAME'").await, vec!["$NAME"]);
        assert_eq!(fields(&mut sh, "\"$NAME\"").await, vec!["world"]);
        assert_eq!(fields(&mut sh, "pre${NAME}post").await, vec!["preworldpost"]);
        assert_eq!(fields(&mut sh, "\\$NAME").await, vec!["$NAME"]);
        assert_eq!(fields(&mut sh, "\"a\\\"b\"").await, vec!["a\"b"]);
    }

    #[tokio::test]
    async fn test_field_splitting() {
        let mut sh = shell();
        assert_eq!(fields(&mut sh, "$SPACED").await, vec!["a", "b", "c"]);
        assert_eq!(fields(&mut sh, "\"$SPACED\"").await, vec!["a  b c"]);
        assert!(fields(&mut sh, "$EMPTY").await.is_empty());
        assert_eq!(fields(&mut sh, "\"$EMPTY\"").await, vec![""]);
        assert_eq!(fields(&mut sh, "''").await, vec![""]);
    }

    #[tokio::test]
    async fn test_positional_parameters() {
        let mut sh = shell();
        sh.set_positional(vec!["one".into(), "two words".into()]);
        assert_eq!(fields(&mut sh, "\"$@\"").await, vec!["one", "two words"]);
        assert_eq!(fields(&mut sh, "$@").await, vec!["one", "two", "words"]);
        assert_eq!(fields(&mut sh, "\"$*\"").await, vec!["one two words"]);
        assert_eq!(fields(&mut sh, "$#").await, vec!["2"]);
        assert_eq!(fields(&mut sh, "$2").await, vec!["two", "words"]);
        sh.set_positional(Vec::new());
        assert!(fields(&mut sh, "\"$@\"").await.is_empty());
    }

    #[tokio::test]
    async fn test_brace_operators() {
        let mut sh = shell();
        assert_eq!(sh.expand_word("${UNSET:-fallback}", &mut ctx()).await.unwrap(), "fallback");
        assert_eq!(sh.expand_word("${EMPTY:-fallback}", &mut ctx()).await.unwrap(), "fallback");
        assert_eq!(sh.expand_word("${EMPTY-fallback}", &mut ctx()).await.unwrap(), "");
        assert_eq!(sh.expand_word("${NAME:+set}", &mut ctx()).await.unwrap(), "set");
        assert_eq!(sh.expand_word("${UNSET+set}", &mut ctx()).await.unwrap(), "");
        assert_eq!(sh.expand_word("${#NAME}", &mut ctx()).await.unwrap(), "5");
        assert_eq!(sh.expand_word("${PATHISH##*/}", &mut ctx()).await.unwrap(), "file.tar.gz");
        assert_eq!(sh.expand_word("${PATHISH%%.*}", &mut ctx()).await.unwrap(), "/usr/local/lib/file");
        assert_eq!(sh.expand_word("${NEW:=$NAME}", &mut ctx()).await.unwrap(), "world");
        assert_eq!(sh.get_var("NEW"), Some("world"));
        assert!(sh.expand_word("${UNSET:?missing}", &mut ctx()).await.is_err());
    }

    #[tokio::test]
    async fn test_arithmetic_and_tilde() {
        let mut sh = shell();
        sh.set_var("X", "10");
        assert_eq!(sh.expand_word("$((X+5))", &mut ctx()).await.unwrap(), "15");
        assert_eq!(sh.expand_word("$(( $X * (2 + 1) ))", &mut ctx()).await.unwrap(), "30");
        assert_eq!(sh.expand_word("~/bin", &mut ctx()).await.unwrap(), "/home/test/bin");
        assert_eq!(sh.expand_word("a~", &mut ctx()).await.unwrap(), "a~");
    }

    #[tokio::test]
    async fn test_nounset() {
        let mut sh = shell();
        sh.options.nounset = true;
        let err = sh.expand_word("$UNSET", &mut ctx()).await.unwrap_err();
        assert!(matches!(err, AshError::Unbound(ref n) if n == "UNSET"));
        assert_eq!(sh.expand_word("${UNSET:-ok}", &mut ctx()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_command_substitution() {
        let mut sh = shell();
        assert_eq!(sh.expand_word("$(echo hi)", &mut ctx()).await.unwrap(), "hi");
        assert_eq!(sh.expand_word("`echo hi`", &mut ctx()).await.unwrap(), "hi");
        assert_eq!(fields(&mut sh, "$(echo a b)").await, vec!["a", "b"]);
        assert_eq!(sh.subst_status, Some(0));
        assert_eq!(sh.expand_word("$(false)", &mut ctx()).await.unwrap(), "");
        assert_eq!(sh.subst_status, Some(1));
    }

    #[tokio::test]
    async fn test_nested_substitution_stays_literal() {
        let mut sh = shell();
        let out = sh.expand_word("$(echo $(echo inner))", &mut ctx()).await.unwrap();
        assert_eq!(out, "$(echo inner)");
    }

    #[tokio::test]
    async fn test_substitutions_mixed_with_arithmetic() {
        let mut sh = shell();
        sh.set_var("x", "2");
        assert_eq!(sh.expand_word("$(( $(echo 1) + x ))", &mut ctx()).await.unwrap(), "3");
        assert_eq!(sh.expand_word("$(( ${x} * $(echo 4) ))", &mut ctx()).await.unwrap(), "8");
        assert_eq!(sh.expand_word("$(echo $((x + 1)))", &mut ctx()).await.unwrap(), "3");
        assert_eq!(sh.expand_word("\"$x:$((x * x)):$(echo $x)\"", &mut ctx()).await.unwrap(), "2:4:2");
    }
}
