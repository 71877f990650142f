//! Builtins that read input, write output or inspect the filesystem

use super::redirect::describe_io;
use super::utils::{interpret_escape_sequences, is_executable, normalize_path};
use super::{ExecContext, Input};
use crate::error::{AshError, AshResult};
use crate::shell::Shell;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tokio::io::AsyncBufReadExt;

/// Outcome of racing a line read against the signal queue.
enum ReadEvent {
    Line(std::io::Result<usize>),
    Signal(Option<i32>),
}

/// Split a `read` line into at most `count` fields; the last field keeps
/// the remainder of the line.
fn split_read_fields(line: &str, ifs: &str, count: usize) -> Vec<String> {
    let is_ws = |c: char| ifs.contains(c) && c.is_whitespace();
    let is_sep = |c: char| ifs.contains(c);
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start_matches(is_ws);

    while fields.len() + 1 < count && !rest.is_empty() {
        match rest.find(is_sep) {
            Some(end) => {
                fields.push(rest[..end].to_string());
                let mut tail = rest[end..].trim_start_matches(is_ws);
                if let Some(c) = tail.chars().next().filter(|&c| is_sep(c) && !is_ws(c)) {
                    tail = tail[c.len_utf8()..].trim_start_matches(is_ws);
                }
                rest = tail;
            }
            None => {
                fields.push(rest.to_string());
                rest = "";
            }
        }
    }
    if fields.len() < count && !rest.is_empty() {
        fields.push(rest.trim_end_matches(is_ws).to_string());
    }
    fields.resize(count, String::new());
    fields
}

/// Remove `read` backslash escapes. Returns true when the line ended in a
/// backslash that continues onto the next line.
fn unescape_read_line(line: &str, out: &mut String) -> bool {
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => return true,
            }
        } else {
            out.push(c);
        }
    }
    false
}

/// One `%` conversion of a printf format.
struct Conversion {
    left: bool,
    zero: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

impl Conversion {
    fn pad(&self, text: &str, numeric: bool) -> String {
        let len = text.chars().count();
        if len >= self.width {
            return text.to_string();
        }
        let fill = self.width - len;
        if self.left {
            format!("{text}{}", " ".repeat(fill))
        } else if self.zero && numeric {
            let (sign, digits) = match text.strip_prefix('-') {
                Some(digits) => ("-", digits),
                None => ("", text),
            };
            format!("{sign}{}{digits}", "0".repeat(fill))
        } else {
            format!("{}{text}", " ".repeat(fill))
        }
    }
}

/// Parse a printf numeric argument: decimal, `0x` hex, leading-zero
/// octal, or `'c` for a character code.
fn printf_number(arg: &str) -> Option<i64> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Some(0);
    }
    if let Some(rest) = arg.strip_prefix('\'').or_else(|| arg.strip_prefix('"')) {
        return Some(rest.chars().next().map_or(0, |c| i64::from(u32::from(c))));
    }
    let (negative, digits) = match arg.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, arg.strip_prefix('+').unwrap_or(arg)),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Result of formatting: the text, whether `\c` stopped output, and any
/// arguments that were not valid numbers.
struct Formatted {
    text: String,
    stopped: bool,
    bad_numbers: Vec<String>,
}

fn format_printf(format: &str, args: &[String]) -> Formatted {
    let mut out = Formatted {
        text: String::new(),
        stopped: false,
        bad_numbers: Vec::new(),
    };
    let mut next_arg = 0;
    loop {
        let consumed_before = next_arg;
        if format_once(format, args, &mut next_arg, &mut out) || out.stopped {
            break;
        }
        if next_arg >= args.len() || next_arg == consumed_before {
            break;
        }
    }
    out
}

/// Expand the format once. Returns true when output must stop.
fn format_once(format: &str, args: &[String], next_arg: &mut usize, out: &mut Formatted) -> bool {
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;
    let take = |next_arg: &mut usize| {
        let arg = args.get(*next_arg).cloned();
        *next_arg += 1;
        arg
    };

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let mut end = i + 2;
                if chars.get(i + 1) == Some(&'0') {
                    while end < chars.len() && end < i + 5 && chars[end].is_digit(8) {
                        end += 1;
                    }
                }
                let end = end.min(chars.len());
                let escape: String = chars[i..end].iter().collect();
                let (text, stop) = interpret_escape_sequences(&escape);
                out.text.push_str(&text);
                if stop {
                    out.stopped = true;
                    return true;
                }
                i = end;
            }
            '%' if chars.get(i + 1) == Some(&'%') => {
                out.text.push('%');
                i += 2;
            }
            '%' => {
                let mut conv = Conversion {
                    left: false,
                    zero: false,
                    plus: false,
                    width: 0,
                    precision: None,
                    kind: 's',
                };
                i += 1;
                while let Some(&flag) = chars.get(i) {
                    match flag {
                        '-' => conv.left = true,
                        '0' => conv.zero = true,
                        '+' => conv.plus = true,
                        ' ' | '#' => {}
                        _ => break,
                    }
                    i += 1;
                }
                while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
                    conv.width = conv.width * 10 + d as usize;
                    i += 1;
                }
                if chars.get(i) == Some(&'.') {
                    i += 1;
                    let mut precision = 0;
                    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
                        precision = precision * 10 + d as usize;
                        i += 1;
                    }
                    conv.precision = Some(precision);
                }
                let Some(&kind) = chars.get(i) else {
                    out.text.push('%');
                    break;
                };
                conv.kind = kind;
                i += 1;
                if convert(&conv, take(next_arg), out) {
                    return true;
                }
            }
            c => {
                out.text.push(c);
                i += 1;
            }
        }
    }
    false
}

/// Render one conversion. Returns true when `%b` hit `\c`.
fn convert(conv: &Conversion, arg: Option<String>, out: &mut Formatted) -> bool {
    let arg = arg.unwrap_or_default();
    let mut number = |arg: &str| {
        printf_number(arg).unwrap_or_else(|| {
            out.bad_numbers.push(arg.to_string());
            0
        })
    };
    let text = match conv.kind {
        's' => match conv.precision {
            Some(p) => conv.pad(&arg.chars().take(p).collect::<String>(), false),
            None => conv.pad(&arg, false),
        },
        'd' | 'i' => {
            let n = number(&arg);
            let text = if conv.plus && n >= 0 { format!("+{n}") } else { n.to_string() };
            conv.pad(&text, true)
        }
        'u' => conv.pad(&number(&arg).to_string(), true),
        'x' => conv.pad(&format!("{:x}", number(&arg)), true),
        'X' => conv.pad(&format!("{:X}", number(&arg)), true),
        'o' => conv.pad(&format!("{:o}", number(&arg)), true),
        'c' => conv.pad(&arg.chars().next().map(String::from).unwrap_or_default(), false),
        'b' => {
            let (text, stop) = interpret_escape_sequences(&arg);
            out.text.push_str(&conv.pad(&text, false));
            if stop {
                out.stopped = true;
            }
            return stop;
        }
        other => format!("%{other}"),
    };
    out.text.push_str(&text);
    false
}

#[allow(unsafe_code)]
fn access(path: &Path, mode: libc::c_int) -> bool {
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

fn parse_int(s: &str) -> AshResult<i64> {
    s.trim()
        .parse()
        .map_err(|_| AshError::InvalidArgument(format!("test: {s}: bad number")))
}

const FILE_TESTS: &[&str] = &["-e", "-f", "-d", "-s", "-r", "-w", "-x", "-L", "-h"];

impl Shell {
    pub(crate) fn cmd_echo(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let mut newline = true;
        let mut escapes = false;
        let mut start = 0;
        for arg in args {
            let Some(flags) = arg.strip_prefix('-') else {
                break;
            };
            if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for c in flags.chars() {
                match c {
                    'n' => newline = false,
                    'e' => escapes = true,
                    _ => escapes = false,
                }
            }
            start += 1;
        }

        let mut text = args[start..].join(" ");
        if escapes {
            let (expanded, stop) = interpret_escape_sequences(&text);
            text = expanded;
            if stop {
                newline = false;
            }
        }
        if newline {
            text.push('\n');
        }
        ctx.stdout
            .write(text.as_bytes())
            .map_err(|e| AshError::Runtime(format!("echo: write error: {}", describe_io(&e))))?;
        Ok(0)
    }

    pub(crate) fn cmd_printf(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let Some(format) = args.first() else {
            return Err(AshError::InvalidArgument("printf: usage: printf format [arg ...]".to_string()));
        };
        let formatted = format_printf(format, &args[1..]);
        ctx.stdout
            .write(formatted.text.as_bytes())
            .map_err(|e| AshError::Runtime(format!("printf: write error: {}", describe_io(&e))))?;
        for bad in &formatted.bad_numbers {
            ctx.write_err(&format!("ash: printf: {bad}: invalid number"));
        }
        Ok(i32::from(!formatted.bad_numbers.is_empty()))
    }

    /// Read one line into `buf`, acting on signals while blocked. Returns
    /// the status to finish with when a signal interrupted the read.
    async fn read_line(&mut self, buf: &mut Vec<u8>, ctx: &mut ExecContext) -> AshResult<Option<i32>> {
        if matches!(ctx.stdin, Input::Inherit) {
            ctx.stdin = Input::reader(tokio::io::stdin());
        }
        loop {
            let event = {
                let Input::Reader(reader) = &mut ctx.stdin else {
                    return Ok(None);
                };
                tokio::select! {
                    read = reader.read_until(b'\n', buf) => ReadEvent::Line(read),
                    sig = self.signals.recv() => ReadEvent::Signal(sig),
                }
            };
            match event {
                ReadEvent::Line(read) => {
                    read.map_err(|e| AshError::Runtime(format!("read: {}", describe_io(&e))))?;
                    return Ok(None);
                }
                ReadEvent::Signal(Some(sig)) => {
                    if self.handle_signal(sig, ctx).await {
                        return Ok(Some(128 + sig));
                    }
                }
                ReadEvent::Signal(None) => {}
            }
        }
    }

    pub(crate) async fn cmd_read(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let mut raw = false;
        let mut names = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-r" => raw = true,
                "-p" => {
                    if let Some(prompt) = iter.next() {
                        let _ = ctx.stderr.write(prompt.as_bytes());
                        let _ = ctx.stderr.flush().await;
                    }
                }
                "--" => names.extend(iter.by_ref().cloned()),
                opt if opt.starts_with('-') && names.is_empty() => {
                    return Err(AshError::InvalidArgument(format!("read: {opt}: invalid option")));
                }
                name => names.push(name.to_string()),
            }
        }
        if names.is_empty() {
            names.push("REPLY".to_string());
        }
        for name in &names {
            if !crate::parser::is_name(name) {
                return Err(AshError::InvalidArgument(format!("read: {name}: bad variable name")));
            }
        }

        let mut line = String::new();
        let mut complete = false;
        loop {
            let mut buf = Vec::new();
            if let Some(status) = self.read_line(&mut buf, ctx).await? {
                return Ok(status);
            }
            if buf.is_empty() {
                break;
            }
            complete = buf.ends_with(b"\n");
            if complete {
                buf.pop();
            }
            let chunk = String::from_utf8_lossy(&buf);
            if raw {
                line.push_str(&chunk);
                break;
            }
            if !unescape_read_line(&chunk, &mut line) || !complete {
                break;
            }
        }

        let ifs = self.get_var("IFS").unwrap_or(" \t\n").to_string();
        let fields = if names.len() == 1 {
            let trimmed = line
                .trim_matches(|c: char| ifs.contains(c) && c.is_whitespace())
                .to_string();
            vec![trimmed]
        } else {
            split_read_fields(&line, &ifs, names.len())
        };
        for (name, value) in names.iter().zip(fields) {
            self.set_var(name, &value);
        }
        Ok(i32::from(!complete))
    }

    pub(crate) fn cmd_cd(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if self.options.restricted {
            return Err(AshError::Restricted("cd".to_string()));
        }
        let mut physical = self.options.physical;
        let mut operands = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-P" => physical = true,
                "-L" => physical = false,
                _ => operands.push(arg.as_str()),
            }
        }

        let (target, announce) = match operands.first() {
            None => (
                self.get_var("HOME")
                    .map(str::to_string)
                    .ok_or_else(|| AshError::Runtime("cd: HOME not set".to_string()))?,
                false,
            ),
            Some(&"-") => (
                self.get_var("OLDPWD")
                    .map(str::to_string)
                    .ok_or_else(|| AshError::Runtime("cd: OLDPWD not set".to_string()))?,
                true,
            ),
            Some(dir) => ((*dir).to_string(), false),
        };

        let mut new_dir = normalize_path(&self.cwd, &target);
        if !new_dir.is_dir() {
            return Err(AshError::Runtime(format!("cd: can't cd to {target}")));
        }
        if physical {
            new_dir = std::fs::canonicalize(&new_dir)
                .map_err(|e| AshError::Runtime(format!("cd: {target}: {}", describe_io(&e))))?;
        }

        let old = std::mem::replace(&mut self.cwd, new_dir);
        self.set_var("OLDPWD", &old.display().to_string());
        let pwd = self.cwd.display().to_string();
        self.set_var("PWD", &pwd);
        if announce {
            ctx.stdout.writeln(&pwd)?;
        }
        Ok(0)
    }

    pub(crate) fn cmd_pwd(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let mut physical = self.options.physical;
        for arg in args {
            match arg.as_str() {
                "-P" => physical = true,
                "-L" => physical = false,
                other => return Err(AshError::InvalidArgument(format!("pwd: {other}: invalid option"))),
            }
        }
        let dir = if physical {
            std::fs::canonicalize(&self.cwd)?
        } else {
            self.cwd.clone()
        };
        ctx.stdout.writeln(&dir.display().to_string())?;
        Ok(0)
    }

    pub(crate) fn cmd_test(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(i32::from(!self.evaluate_test(&args)?))
    }

    pub(crate) fn cmd_bracket(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        match args.split_last() {
            Some((last, rest)) if last == "]" => self.cmd_test(rest, ctx),
            _ => Err(AshError::InvalidArgument("[: missing ]".to_string())),
        }
    }

    fn file_test(&self, op: &str, operand: &str) -> bool {
        let path = self.resolve_path(operand);
        match op {
            "-e" => path.exists(),
            "-f" => path.is_file(),
            "-d" => path.is_dir(),
            "-s" => path.metadata().is_ok_and(|m| m.len() > 0),
            "-r" => access(&path, libc::R_OK),
            "-w" => access(&path, libc::W_OK),
            "-x" => is_executable(&path) || (path.is_dir() && access(&path, libc::X_OK)),
            "-L" | "-h" => path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()),
            _ => false,
        }
    }

    fn evaluate_test(&self, args: &[&str]) -> AshResult<bool> {
        if let Some(pos) = args.iter().rposition(|a| *a == "-o").filter(|&p| p > 0 && p + 1 < args.len()) {
            return Ok(self.evaluate_test(&args[..pos])? || self.evaluate_test(&args[pos + 1..])?);
        }
        if let Some(pos) = args.iter().rposition(|a| *a == "-a").filter(|&p| p > 0 && p + 1 < args.len()) {
            return Ok(self.evaluate_test(&args[..pos])? && self.evaluate_test(&args[pos + 1..])?);
        }

        let result = match args {
            [] => false,
            [s] => !s.is_empty(),
            ["!", rest @ ..] => !self.evaluate_test(rest)?,
            ["(", inner @ .., ")"] => self.evaluate_test(inner)?,
            ["-n", s] => !s.is_empty(),
            ["-z", s] => s.is_empty(),
            [op, path] if FILE_TESTS.contains(op) => self.file_test(op, path),
            [s1, "=" | "==", s2] => s1 == s2,
            [s1, "!=", s2] => s1 != s2,
            [s1, "<", s2] => s1 < s2,
            [s1, ">", s2] => s1 > s2,
            [n1, "-eq", n2] => parse_int(n1)? == parse_int(n2)?,
            [n1, "-ne", n2] => parse_int(n1)? != parse_int(n2)?,
            [n1, "-lt", n2] => parse_int(n1)? < parse_int(n2)?,
            [n1, "-le", n2] => parse_int(n1)? <= parse_int(n2)?,
            [n1, "-gt", n2] => parse_int(n1)? > parse_int(n2)?,
            [n1, "-ge", n2] => parse_int(n1)? >= parse_int(n2)?,
            [_, op, _] => return Err(AshError::InvalidArgument(format!("test: {op}: unknown operator"))),
            _ => return Err(AshError::InvalidArgument("test: too many arguments".to_string())),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellBuilder;

    fn shell() -> Shell {
        ShellBuilder::new().inherit_env(false).build()
    }

    fn fields(line: &str, count: usize) -> Vec<String> {
        split_read_fields(line, " \t\n", count)
    }

    #[test]
    fn test_split_read_fields() {
        assert_eq!(fields("  a  b  c  ", 2), vec!["a", "b  c"]);
        assert_eq!(fields("one", 3), vec!["one", "", ""]);
        assert_eq!(split_read_fields("x:y:z", ":", 2), vec!["x", "y:z"]);
    }

    #[test]
    fn test_printf_formatting() {
        let args = |a: &[&str]| a.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        assert_eq!(format_printf("%s-%d\\n", &args(&["a", "7"])).text, "a-7\n");
        assert_eq!(format_printf("%5s|%-3d|%03d", &args(&["ab", "4", "5"])).text, "   ab|4  |005");
        assert_eq!(format_printf("%x %X %o %c", &args(&["255", "255", "8", "zed"])).text, "ff FF 10 z");
        assert_eq!(format_printf("<%s>", &args(&["a", "b", "c"])).text, "<a><b><c>");
        assert_eq!(format_printf("%b|", &args(&["x\\ty"])).text, "x\ty|");
        assert_eq!(format_printf("100%%", &[]).text, "100%");
        let bad = format_printf("%d", &args(&["abc"]));
        assert_eq!(bad.text, "0");
        assert_eq!(bad.bad_numbers, vec!["abc"]);
    }

    #[test]
    fn test_printf_number_forms() {
        assert_eq!(printf_number("0x1f"), Some(31));
        assert_eq!(printf_number("010"), Some(8));
        assert_eq!(printf_number("'A"), Some(65));
        assert_eq!(printf_number("-3"), Some(-3));
        assert_eq!(printf_number("x"), None);
    }

    #[tokio::test]
    async fn test_echo_options() {
        let mut sh = shell();
        let out = sh.execute_capture("echo -n a; echo -e 'b\\tc'; echo -e 'd\\ce'; echo -x").await.unwrap();
        assert_eq!(out.stdout_str(), "ab\tc\nd-x\n");
    }

    #[tokio::test]
    async fn test_echo_to_closed_stdout_fails() {
        let mut sh = shell();
        let out = sh.execute_capture("echo hi >&-; echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "1\n");
    }

    #[tokio::test]
    async fn test_read_splits_fields() {
        let mut sh = shell();
        let mut ctx = ExecContext::new(
            Input::from_bytes("alpha beta gamma\nsecond\\\n line\n"),
            super::super::Output::Closed,
            super::super::Output::Closed,
        );
        let status = sh.execute_with("read a b; read c", &mut ctx).await.unwrap();
        assert_eq!(status, 0);
        assert_eq!(sh.get_var("a"), Some("alpha"));
        assert_eq!(sh.get_var("b"), Some("beta gamma"));
        assert_eq!(sh.get_var("c"), Some("second line"));
    }

    #[tokio::test]
    async fn test_read_eof_status() {
        let mut sh = shell();
        let out = sh.execute_capture("read x; echo $? \"[$x]\"").await.unwrap();
        assert_eq!(out.stdout_str(), "1 []\n");
    }

    #[tokio::test]
    async fn test_read_interrupted_by_trapped_signal() {
        let mut sh = shell();
        let (_writer, reader) = tokio::io::duplex(16);
        let (stdout, buf) = super::super::Output::buffer();
        let mut ctx = ExecContext::new(Input::reader(reader), stdout, super::super::Output::Closed);
        let tx = sh.signal_sender();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let _ = tx.send(libc::SIGUSR1).await;
        });
        let status = sh
            .execute_with("trap 'echo caught' USR1; read line; echo status $?", &mut ctx)
            .await
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(
            String::from_utf8_lossy(&buf.lock().unwrap()),
            "caught\nstatus 138\n"
        );
    }

    #[tokio::test]
    async fn test_cd_and_pwd() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(base.join("sub")).unwrap();
        let mut sh = ShellBuilder::new().inherit_env(false).cwd(&base).build();
        let out = sh.execute_capture("cd sub; pwd; cd ..; pwd; cd -; echo $OLDPWD").await.unwrap();
        let base = base.display().to_string();
        assert_eq!(
            out.stdout_str(),
            format!("{base}/sub\n{base}\n{base}/sub\n{base}\n")
        );
        let out = sh.execute_capture("cd missing").await.unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr_str().contains("can't cd to missing"));
    }

    #[tokio::test]
    async fn test_cd_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().display().to_string();
        let mut sh = ShellBuilder::new().inherit_env(false).env("HOME", &home).cwd("/").build();
        let out = sh.execute_capture("cd; pwd").await.unwrap();
        assert_eq!(out.stdout_str(), format!("{home}\n"));
    }

    #[tokio::test]
    async fn test_test_predicates() {
        let mut sh = shell();
        let script = "[ a = a ] && echo eq; \
                      [ 3 -lt 10 ] && echo lt; \
                      test -z '' && echo empty; \
                      [ ! -n '' ] && echo negated; \
                      [ -d / ] && echo dir; \
                      [ -f /nonexistent ] || echo nofile; \
                      [ a = b -o 1 -eq 1 ] && echo or";
        let out = sh.execute_capture(script).await.unwrap();
        assert_eq!(out.stdout_str(), "eq\nlt\nempty\nnegated\ndir\nnofile\nor\n");
    }

    #[tokio::test]
    async fn test_test_usage_errors() {
        let mut sh = shell();
        let out = sh.execute_capture("[ 1 = 1; echo $?; [ x -eq 1 ]; echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "2\n2\n");
    }
}
