//! Builtin registry and the builtins that manage interpreter state

use super::{BoxFuture, ExecContext};
use crate::error::{AshError, AshResult};
use crate::parser::{is_name, KEYWORDS};
use crate::shell::Shell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Host-provided builtin, registered through [`Shell::register_builtin`].
pub type BuiltinFn = Arc<dyn Fn(&[String], &mut Shell) -> AshResult<i32> + Send + Sync>;

pub type SyncBuiltin = fn(&mut Shell, &[String], &mut ExecContext) -> AshResult<i32>;

pub type AsyncBuiltin =
    for<'a> fn(&'a mut Shell, &'a [String], &'a mut ExecContext) -> BoxFuture<'a, AshResult<i32>>;

/// A builtin command. Handlers receive the arguments after the command name.
#[derive(Clone)]
pub enum Builtin {
    Sync(SyncBuiltin),
    Async(AsyncBuiltin),
    Host(BuiltinFn),
}

pub type BuiltinTable = HashMap<String, Builtin>;

/// Nesting limit for `source`.
const MAX_SOURCE_DEPTH: usize = 100;

macro_rules! sync_builtin {
    ($method:ident) => {
        Builtin::Sync(|sh: &mut Shell, args: &[String], ctx: &mut ExecContext| sh.$method(args, ctx))
    };
}

macro_rules! async_builtin {
    ($method:ident) => {{
        fn run<'a>(
            sh: &'a mut Shell,
            args: &'a [String],
            ctx: &'a mut ExecContext,
        ) -> BoxFuture<'a, AshResult<i32>> {
            Box::pin(sh.$method(args, ctx))
        }
        Builtin::Async(run)
    }};
}

/// The builtins every shell starts with.
pub fn default_builtins() -> BuiltinTable {
    let table = [
        (":", sync_builtin!(cmd_true)),
        ("true", sync_builtin!(cmd_true)),
        ("false", sync_builtin!(cmd_false)),
        ("exit", sync_builtin!(cmd_exit)),
        ("return", sync_builtin!(cmd_return)),
        ("break", sync_builtin!(cmd_break)),
        ("continue", sync_builtin!(cmd_continue)),
        ("export", sync_builtin!(cmd_export)),
        ("unset", sync_builtin!(cmd_unset)),
        ("local", sync_builtin!(cmd_local)),
        ("set", sync_builtin!(cmd_set)),
        ("shift", sync_builtin!(cmd_shift)),
        ("alias", sync_builtin!(cmd_alias)),
        ("unalias", sync_builtin!(cmd_unalias)),
        ("type", sync_builtin!(cmd_type)),
        ("hash", sync_builtin!(cmd_hash)),
        ("getopts", sync_builtin!(cmd_getopts)),
        ("source", async_builtin!(cmd_source)),
        (".", async_builtin!(cmd_source)),
        ("eval", async_builtin!(cmd_eval)),
        ("exec", async_builtin!(cmd_exec)),
        ("echo", sync_builtin!(cmd_echo)),
        ("printf", sync_builtin!(cmd_printf)),
        ("read", async_builtin!(cmd_read)),
        ("cd", sync_builtin!(cmd_cd)),
        ("pwd", sync_builtin!(cmd_pwd)),
        ("test", sync_builtin!(cmd_test)),
        ("[", sync_builtin!(cmd_bracket)),
        ("wait", async_builtin!(cmd_wait)),
        ("jobs", sync_builtin!(cmd_jobs)),
        ("fg", async_builtin!(cmd_fg)),
        ("bg", sync_builtin!(cmd_bg)),
        ("kill", sync_builtin!(cmd_kill)),
        ("trap", sync_builtin!(cmd_trap)),
    ];
    table
        .into_iter()
        .map(|(name, builtin)| (name.to_string(), builtin))
        .collect()
}

/// Quote a value so the shell reads it back unchanged.
pub(crate) fn quote_value(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:,+-=@%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Parse a numeric builtin operand.
fn parse_count(cmd: &str, arg: Option<&String>, default: i32) -> AshResult<i32> {
    match arg {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| AshError::InvalidArgument(format!("{cmd}: Illegal number: {s}"))),
    }
}

const OPTION_NAMES: &[&str] = &[
    "errexit",
    "noexec",
    "nounset",
    "physical",
    "pipefail",
    "restricted",
    "xtrace",
];

impl Shell {
    #[allow(clippy::unnecessary_wraps)]
    fn cmd_true(&mut self, _args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        Ok(0)
    }

    #[allow(clippy::unnecessary_wraps)]
    fn cmd_false(&mut self, _args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        Ok(1)
    }

    fn cmd_exit(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        let code = parse_count("exit", args.first(), self.flags.last_status)?;
        self.flags.exit_flag = true;
        self.flags.exit_code = code;
        Ok(code)
    }

    fn cmd_return(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        if self.function_depth == 0 && self.source_depth == 0 {
            return Err(AshError::Runtime("return: not in a function".to_string()));
        }
        let code = parse_count("return", args.first(), self.flags.last_status)?;
        self.flags.return_flag = true;
        self.flags.return_code = code;
        Ok(code)
    }

    fn loop_count(&self, cmd: &str, args: &[String]) -> AshResult<usize> {
        let n = parse_count(cmd, args.first(), 1)?;
        let n = usize::try_from(n)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| AshError::InvalidArgument(format!("{cmd}: Illegal number: {n}")))?;
        Ok(n.min(self.loop_depth))
    }

    fn cmd_break(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        self.flags.break_depth = self.loop_count("break", args)?;
        Ok(0)
    }

    fn cmd_continue(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        self.flags.continue_depth = self.loop_count("continue", args)?;
        Ok(0)
    }

    fn check_assignable(&self, cmd: &str, name: &str) -> AshResult<()> {
        if !is_name(name) {
            return Err(AshError::InvalidArgument(format!("{cmd}: {name}: bad variable name")));
        }
        if self.options.restricted && matches!(name, "PATH" | "SHELL" | "ENV") {
            return Err(AshError::Restricted(name.to_string()));
        }
        Ok(())
    }

    fn cmd_export(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let names: Vec<&String> = args.iter().filter(|a| a.as_str() != "-p").collect();
        if names.is_empty() {
            let mut exported: Vec<&String> = self.exported.iter().collect();
            exported.sort();
            for name in exported {
                let line = match self.vars.get(name) {
                    Some(value) => format!("export {name}={}", quote_value(value)),
                    None => format!("export {name}"),
                };
                ctx.stdout.writeln(&line)?;
            }
            return Ok(0);
        }

        for arg in names {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            self.check_assignable("export", name)?;
            if let Some(value) = value {
                self.set_var(name, value);
            }
            self.export_var(name);
        }
        Ok(0)
    }

    fn cmd_unset(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        let mut functions = false;
        for arg in args {
            match arg.as_str() {
                "-f" => functions = true,
                "-v" => functions = false,
                name if functions => {
                    self.functions.remove(name);
                }
                name => {
                    self.check_assignable("unset", name)?;
                    self.unset_var(name);
                }
            }
        }
        Ok(0)
    }

    fn cmd_local(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        if self.local_frames.is_empty() {
            return Err(AshError::Runtime("local: not in a function".to_string()));
        }
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            self.check_assignable("local", name)?;
            let old = self.vars.get(name).cloned();
            if let Some(frame) = self.local_frames.last_mut() {
                frame.entry(name.to_string()).or_insert(old);
            }
            if let Some(value) = value {
                self.set_var(name, value);
            }
        }
        Ok(0)
    }

    fn option_mut(&mut self, name: &str) -> Option<&mut bool> {
        let options = &mut self.options;
        Some(match name {
            "errexit" | "e" => &mut options.errexit,
            "xtrace" | "x" => &mut options.xtrace,
            "nounset" | "u" => &mut options.nounset,
            "noexec" | "n" => &mut options.noexec,
            "physical" | "P" => &mut options.physical,
            "pipefail" => &mut options.pipefail,
            "restricted" | "r" => &mut options.restricted,
            _ => return None,
        })
    }

    fn set_option(&mut self, name: &str, on: bool) -> AshResult<()> {
        if !on && matches!(name, "r" | "restricted") && self.options.restricted {
            return Err(AshError::Restricted("set +r".to_string()));
        }
        let Some(slot) = self.option_mut(name) else {
            let flag = if name.len() == 1 { "" } else { "o " };
            return Err(AshError::InvalidArgument(format!("set: illegal option -{flag}{name}")));
        };
        *slot = on;
        debug!(option = name, on, "set option");
        Ok(())
    }

    fn print_options(&mut self, ctx: &mut ExecContext) -> AshResult<()> {
        for name in OPTION_NAMES {
            let on = self.option_mut(name).is_some_and(|slot| *slot);
            ctx.stdout.writeln(&format!("{name:<15} {}", if on { "on" } else { "off" }))?;
        }
        Ok(())
    }

    fn cmd_set(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.is_empty() {
            let mut vars: Vec<(&String, &String)> = self.vars.iter().collect();
            vars.sort();
            for (name, value) in vars {
                ctx.stdout.writeln(&format!("{name}={}", quote_value(value)))?;
            }
            return Ok(0);
        }

        let mut iter = args.iter().enumerate();
        while let Some((i, arg)) = iter.next() {
            match arg.as_str() {
                "--" => {
                    self.positional = args[i + 1..].to_vec();
                    return Ok(0);
                }
                "-o" | "+o" => match iter.next() {
                    Some((_, name)) => self.set_option(name, arg == "-o")?,
                    None => self.print_options(ctx)?,
                },
                flags if (flags.starts_with('-') || flags.starts_with('+')) && flags.len() > 1 => {
                    let on = flags.starts_with('-');
                    for c in flags[1..].chars() {
                        self.set_option(c.encode_utf8(&mut [0; 4]), on)?;
                    }
                }
                _ => {
                    self.positional = args[i..].to_vec();
                    return Ok(0);
                }
            }
        }
        Ok(0)
    }

    fn cmd_shift(&mut self, args: &[String], _ctx: &mut ExecContext) -> AshResult<i32> {
        let n = parse_count("shift", args.first(), 1)?;
        let n = usize::try_from(n)
            .ok()
            .filter(|&n| n <= self.positional.len())
            .ok_or_else(|| AshError::Runtime("shift: can't shift that many".to_string()))?;
        self.positional.drain(..n);
        Ok(0)
    }

    fn cmd_alias(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.is_empty() {
            let mut aliases: Vec<_> = self.aliases.iter().collect();
            aliases.sort_by_key(|(k, _)| k.as_str());
            for (name, value) in aliases {
                ctx.stdout.writeln(&format!("alias {name}={}", quote_value(value)))?;
            }
            return Ok(0);
        }

        let mut status = 0;
        for arg in args {
            if let Some((name, value)) = arg.split_once('=') {
                self.aliases.insert(name.to_string(), value.to_string());
            } else if let Some(value) = self.aliases.get(arg) {
                ctx.stdout.writeln(&format!("alias {arg}={}", quote_value(value)))?;
            } else {
                ctx.write_err(&format!("ash: alias: {arg} not found"));
                status = 1;
            }
        }
        Ok(status)
    }

    fn cmd_unalias(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.first().is_some_and(|a| a == "-a") {
            self.aliases.clear();
            return Ok(0);
        }
        let mut status = 0;
        for name in args {
            if self.aliases.remove(name).is_none() {
                ctx.write_err(&format!("ash: unalias: {name} not found"));
                status = 1;
            }
        }
        Ok(status)
    }

    fn cmd_type(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let mut status = 0;
        for name in args {
            let description = if KEYWORDS.contains(&name.as_str()) {
                format!("{name} is a shell keyword")
            } else if let Some(value) = self.aliases.get(name) {
                format!("{name} is an alias for {value}")
            } else if self.builtins.contains_key(name) {
                format!("{name} is a shell builtin")
            } else if self.functions.contains_key(name) {
                format!("{name} is a shell function")
            } else if let Some(path) = self.lookup_command(name) {
                format!("{name} is {}", path.display())
            } else {
                ctx.write_err(&format!("ash: type: {name}: not found"));
                status = 1;
                continue;
            };
            ctx.stdout.writeln(&description)?;
        }
        Ok(status)
    }

    fn cmd_hash(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.first().is_some_and(|a| a == "-r") {
            self.hashed.clear();
            return Ok(0);
        }
        if args.is_empty() {
            let mut entries: Vec<_> = self.hashed.iter().collect();
            entries.sort_by_key(|(name, _)| name.as_str());
            ctx.stdout.writeln("hits\tcommand")?;
            for (_, (path, hits)) in entries {
                ctx.stdout.writeln(&format!("{hits:4}\t{}", path.display()))?;
            }
            return Ok(0);
        }

        let mut status = 0;
        for name in args {
            if self.builtins.contains_key(name) || self.functions.contains_key(name) {
                continue;
            }
            match self.find_in_path(name) {
                Some(path) => {
                    self.hashed.insert(name.clone(), (path, 0));
                }
                None => {
                    ctx.write_err(&format!("ash: hash: {name}: not found"));
                    status = 1;
                }
            }
        }
        Ok(status)
    }

    /// `getopts optstring name [arg...]`
    fn cmd_getopts(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let [optstring, name, rest @ ..] = args else {
            return Err(AshError::InvalidArgument(
                "getopts: usage: getopts optstring var [arg ...]".to_string(),
            ));
        };
        self.check_assignable("getopts", name)?;
        let params: Vec<String> = if rest.is_empty() {
            self.positional.clone()
        } else {
            rest.to_vec()
        };

        let mut optind: usize = self
            .get_var("OPTIND")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(1);
        let mut offset = if optind == self.getopts_state.0 {
            self.getopts_state.1
        } else {
            1
        };

        let arg = params.get(optind - 1).map(|a| a.chars().collect::<Vec<_>>());
        let arg = match arg {
            Some(arg) if offset > 1 && offset < arg.len() => arg,
            Some(arg) if arg.len() > 1 && arg[0] == '-' && arg[1..] != ['-'] => {
                offset = 1;
                arg
            }
            Some(arg) => {
                if arg == ['-', '-'] {
                    optind += 1;
                }
                return Ok(self.getopts_done(name, optind));
            }
            None => return Ok(self.getopts_done(name, optind)),
        };

        let silent = optstring.starts_with(':');
        let spec = optstring.trim_start_matches(':');
        let c = arg[offset];
        offset += 1;
        let at_end = offset >= arg.len();
        let advance = |optind: &mut usize, offset: &mut usize, words: usize| {
            *optind += words;
            *offset = 1;
        };

        let found = spec.find(c).filter(|_| c != ':');
        let result = match found {
            None => {
                if silent {
                    self.set_var("OPTARG", &c.to_string());
                } else {
                    ctx.write_err(&format!("{}: illegal option -- {c}", self.script_name));
                    self.unset_var("OPTARG");
                }
                if at_end {
                    advance(&mut optind, &mut offset, 1);
                }
                "?".to_string()
            }
            Some(pos) if spec[pos + c.len_utf8()..].starts_with(':') => {
                if !at_end {
                    let value: String = arg[offset..].iter().collect();
                    self.set_var("OPTARG", &value);
                    advance(&mut optind, &mut offset, 1);
                    c.to_string()
                } else if let Some(value) = params.get(optind) {
                    self.set_var("OPTARG", value);
                    advance(&mut optind, &mut offset, 2);
                    c.to_string()
                } else {
                    advance(&mut optind, &mut offset, 1);
                    if silent {
                        self.set_var("OPTARG", &c.to_string());
                        ":".to_string()
                    } else {
                        ctx.write_err(&format!("{}: option requires an argument -- {c}", self.script_name));
                        self.unset_var("OPTARG");
                        "?".to_string()
                    }
                }
            }
            Some(_) => {
                self.unset_var("OPTARG");
                if at_end {
                    advance(&mut optind, &mut offset, 1);
                }
                c.to_string()
            }
        };

        self.set_var(name, &result);
        self.set_var("OPTIND", &optind.to_string());
        self.getopts_state = (optind, offset);
        Ok(0)
    }

    fn getopts_done(&mut self, name: &str, optind: usize) -> i32 {
        self.set_var(name, "?");
        self.set_var("OPTIND", &optind.to_string());
        self.getopts_state = (optind, 1);
        1
    }

    async fn cmd_source(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let Some(file) = args.first() else {
            return Err(AshError::InvalidArgument(".: filename argument required".to_string()));
        };
        if self.source_depth >= MAX_SOURCE_DEPTH {
            return Err(AshError::Runtime(format!("{file}: maximum source nesting level exceeded")));
        }
        let path = if file.contains('/') {
            self.resolve_path(file)
        } else {
            self.find_in_path(file)
                .filter(|p| p.is_file())
                .unwrap_or_else(|| self.resolve_path(file))
        };
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AshError::Runtime(format!("{file}: {}", super::redirect::describe_io(&e))))?;

        let saved_positional = if args.len() > 1 {
            Some(std::mem::replace(&mut self.positional, args[1..].to_vec()))
        } else {
            None
        };
        self.source_depth += 1;
        let result = self.execute_source(&source, ctx).await;
        self.source_depth -= 1;
        if let Some(positional) = saved_positional {
            self.positional = positional;
        }

        let status = result?;
        if self.flags.return_flag && self.function_depth == 0 {
            self.flags.return_flag = false;
            return Ok(self.flags.return_code);
        }
        Ok(status)
    }

    async fn cmd_eval(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.is_empty() {
            return Ok(0);
        }
        self.execute_source(&args.join(" "), ctx).await
    }

    /// `exec cmd args`: run the command, then end the shell with its status.
    async fn cmd_exec(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.is_empty() {
            return Ok(0);
        }
        let status = match self.dispatch(args, ctx).await {
            Ok(status) => status,
            Err(e) => self.report_error(&e, ctx),
        };
        self.flags.exit_flag = true;
        self.flags.exit_code = status;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellBuilder;

    fn shell() -> Shell {
        ShellBuilder::new().inherit_env(false).build()
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value("plain"), "plain");
        assert_eq!(quote_value("two words"), "'two words'");
        assert_eq!(quote_value("it's"), "'it'\\''s'");
        assert_eq!(quote_value(""), "''");
    }

    #[test]
    fn test_default_builtins_registered() {
        let table = default_builtins();
        for name in ["echo", "[", "test", "trap", "wait", "getopts", ".", ":"] {
            assert!(table.contains_key(name), "missing builtin {name}");
        }
    }

    #[tokio::test]
    async fn test_exit_stops_script() {
        let mut sh = shell();
        let out = sh.execute_capture("echo a; exit 4; echo b").await.unwrap();
        assert_eq!(out.stdout_str(), "a\n");
        assert_eq!(out.exit_code, 4);
    }

    #[tokio::test]
    async fn test_return_outside_function() {
        let mut sh = shell();
        let out = sh.execute_capture("return 2; echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "1\n");
        assert!(out.stderr_str().contains("return: not in a function"));
    }

    #[tokio::test]
    async fn test_local_restores_outer_value() {
        let mut sh = shell();
        let out = sh
            .execute_capture("x=outer; f() { local x=inner y=new; echo $x $y; }; f; echo $x ${y-unset}")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "inner new\nouter unset\n");
    }

    #[tokio::test]
    async fn test_set_options_and_positional() {
        let mut sh = shell();
        let out = sh.execute_capture("set -eu; echo $-; set +e; echo $-").await.unwrap();
        assert_eq!(out.stdout_str(), "eu\nu\n");
        let out = sh.execute_capture("set a b c; echo $# $2; shift 2; echo $1").await.unwrap();
        assert_eq!(out.stdout_str(), "3 b\nc\n");
        let out = sh.execute_capture("set -o pipefail; set -o").await.unwrap();
        assert!(out.stdout_str().contains("pipefail        on"));
    }

    #[tokio::test]
    async fn test_restricted_is_one_way() {
        let mut sh = shell();
        let out = sh.execute_capture("set -r; set +r; echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "1\n");
        assert!(sh.options().restricted);
    }

    #[tokio::test]
    async fn test_unset_and_default() {
        let mut sh = shell();
        let out = sh.execute_capture("FOO=bar; unset FOO; echo ${FOO:-empty}").await.unwrap();
        assert_eq!(out.stdout_str(), "empty\n");
    }

    #[tokio::test]
    async fn test_export_listing() {
        let mut sh = shell();
        let out = sh.execute_capture("export GREETING='hi there'; export -p").await.unwrap();
        assert!(out.stdout_str().contains("export GREETING='hi there'\n"));
    }

    #[tokio::test]
    async fn test_type_reports_kinds() {
        let mut sh = shell();
        let out = sh
            .execute_capture("f() { :; }; alias ll='ls -l'; type if f ll echo nosuchthing")
            .await
            .unwrap();
        assert_eq!(
            out.stdout_str(),
            "if is a shell keyword\nf is a shell function\nll is an alias for ls -l\necho is a shell builtin\n"
        );
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn test_getopts_loop() {
        let mut sh = shell();
        let script = "set -- -a -b val -cx rest; \
                      while getopts ab:c opt; do echo \"$opt ${OPTARG-}\"; done; \
                      shift $((OPTIND-1)); echo \"left: $*\"";
        let out = sh.execute_capture(script).await.unwrap();
        assert_eq!(out.stdout_str(), "a \nb val\nc \n? \nleft: rest\n");
        assert!(out.stderr_str().contains("illegal option -- x"));
    }

    #[tokio::test]
    async fn test_getopts_missing_argument_silent() {
        let mut sh = shell();
        let out = sh
            .execute_capture("getopts :f: opt -f; echo \"$opt $OPTARG\"")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), ": f\n");
    }

    #[tokio::test]
    async fn test_source_and_return() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.sh"), "LOADED=$1; return 5; echo no\n").unwrap();
        let mut sh = ShellBuilder::new().inherit_env(false).cwd(dir.path()).build();
        let out = sh.execute_capture(". ./lib.sh one; echo $? $LOADED").await.unwrap();
        assert_eq!(out.stdout_str(), "5 one\n");
    }

    #[tokio::test]
    async fn test_eval_joins_arguments() {
        let mut sh = shell();
        let out = sh.execute_capture("cmd='echo'; eval $cmd joined 'words here'").await.unwrap();
        assert_eq!(out.stdout_str(), "joined words here\n");
    }

    #[tokio::test]
    async fn test_exec_ends_shell() {
        let mut sh = shell();
        let out = sh.execute_capture("exec false; echo unreachable").await.unwrap();
        assert_eq!(out.stdout_str(), "");
        assert_eq!(out.exit_code, 1);
    }
}
