//! Simple command execution: assignments, aliases, redirections and
//! dispatch to builtins, functions or external programs.

use super::redirect::{split_redirects, RedirectWord};
use super::{Builtin, ExecContext};
use crate::ast::CompoundCommand;
use crate::error::{AshError, AshResult};
use crate::parser::is_name;
use crate::shell::Shell;
use std::collections::HashMap;
use tracing::trace;

/// Nesting limit for function calls.
const MAX_CALL_DEPTH: usize = 100;

/// Split `NAME=value` into its parts when `word` is an assignment.
pub(crate) fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    is_name(name).then_some((name, value))
}

/// Raw command words sorted into their roles.
struct CommandWords {
    assignments: Vec<String>,
    words: Vec<String>,
    redirects: Vec<RedirectWord>,
}

fn classify(raw: &[String]) -> CommandWords {
    let (plain, redirects) = split_redirects(raw);
    let prefix = plain.iter().take_while(|w| split_assignment(w).is_some()).count();
    let mut plain = plain;
    let words = plain.split_off(prefix);
    CommandWords {
        assignments: plain,
        words,
        redirects,
    }
}

fn is_plain_literal(word: &str) -> bool {
    !word.contains(['$', '`', '\'', '"', '\\'])
}

impl Shell {
    /// Run one simple command. Errors are reported on stderr and become the
    /// command's status; they never abort the enclosing script except where
    /// [`AshError::is_fatal`] says so.
    pub(crate) async fn run_simple_command(&mut self, raw: &[String], ctx: &mut ExecContext) -> i32 {
        match self.try_simple_command(raw, ctx).await {
            Ok(status) => status,
            Err(e) => self.report_error(&e, ctx),
        }
    }

    pub(crate) fn report_error(&mut self, e: &AshError, ctx: &mut ExecContext) -> i32 {
        ctx.write_err(&format!("ash: {e}"));
        let status = e.status();
        if e.is_fatal() {
            self.flags.exit_flag = true;
            self.flags.exit_code = status;
        }
        status
    }

    async fn try_simple_command(&mut self, raw: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        self.subst_status = None;
        let parts = classify(raw);

        if let Some(first) = parts.words.first() {
            if !self.alias_active && is_plain_literal(first) {
                if let Some(replacement) = self.aliases.get(first).cloned() {
                    return self.run_alias(&replacement, raw, first, ctx).await;
                }
            }
        }

        let mut args = Vec::new();
        for word in &parts.words {
            args.extend(self.expand_word_fields(word, ctx).await?);
        }
        let mut assignments = Vec::with_capacity(parts.assignments.len());
        for word in &parts.assignments {
            if let Some((name, value)) = split_assignment(word) {
                let value = self.expand_word(value, ctx).await?;
                assignments.push((name.to_string(), value));
            }
        }

        if args.is_empty() {
            return self.run_assignments_only(assignments, &parts.redirects, ctx).await;
        }

        if self.options.xtrace {
            let mut trace_line: Vec<String> = assignments.iter().map(|(n, v)| format!("{n}={v}")).collect();
            trace_line.extend(args.iter().cloned());
            ctx.write_err(&format!("+ {}", trace_line.join(" ")));
        }

        if self.options.restricted && args[0].contains('/') {
            return Err(AshError::Restricted(args[0].clone()));
        }

        if args.len() == 1 && args[0] == "exec" {
            // Redirections on a bare `exec` stay in effect.
            self.apply_redirects(&parts.redirects, ctx).await?;
            return Ok(0);
        }

        let saved_streams = self.apply_redirects(&parts.redirects, ctx).await?;
        let saved_vars = self.apply_temporary_assignments(&assignments);
        let result = self.dispatch(&args, ctx).await;
        self.restore_temporary_assignments(saved_vars);
        self.restore_streams(saved_streams, ctx).await;
        result
    }

    /// Substitute an alias for the first command word and run the result.
    async fn run_alias(&mut self, replacement: &str, raw: &[String], name: &str, ctx: &mut ExecContext) -> AshResult<i32> {
        trace!(alias = name, "expanding alias");
        let mut source = String::new();
        let mut replaced = false;
        for word in raw {
            if !replaced && word == name {
                source.push_str(replacement);
                replaced = true;
            } else {
                source.push_str(word);
            }
            source.push(' ');
        }
        self.alias_active = true;
        let result = self.execute_source(&source, ctx).await;
        self.alias_active = false;
        result
    }

    /// `NAME=value` with no command: assignments are permanent.
    async fn run_assignments_only(
        &mut self,
        assignments: Vec<(String, String)>,
        redirects: &[RedirectWord],
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        if self.options.xtrace && !assignments.is_empty() {
            let line: Vec<String> = assignments.iter().map(|(n, v)| format!("{n}={v}")).collect();
            ctx.write_err(&format!("+ {}", line.join(" ")));
        }
        for (name, value) in &assignments {
            if self.options.restricted && matches!(name.as_str(), "PATH" | "SHELL" | "ENV") {
                return Err(AshError::Restricted(name.clone()));
            }
            self.set_var(name, value);
        }
        let saved = self.apply_redirects(redirects, ctx).await?;
        self.restore_streams(saved, ctx).await;
        Ok(self.subst_status.unwrap_or(0))
    }

    fn apply_temporary_assignments(&mut self, assignments: &[(String, String)]) -> Vec<(String, Option<String>, bool)> {
        let mut saved = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            saved.push((name.clone(), self.get_var(name).map(str::to_string), self.is_exported(name)));
            self.set_var(name, value);
            self.export_var(name);
        }
        saved
    }

    fn restore_temporary_assignments(&mut self, saved: Vec<(String, Option<String>, bool)>) {
        for (name, value, exported) in saved.into_iter().rev() {
            match value {
                Some(value) => {
                    self.set_var(&name, &value);
                    if !exported {
                        self.exported.remove(&name);
                    }
                }
                None => self.unset_var(&name),
            }
        }
    }

    /// Run expanded `args` as a builtin, function or external command.
    pub(crate) async fn dispatch(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let name = args[0].as_str();
        if let Some(builtin) = self.builtins.get(name).cloned() {
            trace!(builtin = name, "dispatching builtin");
            return match builtin {
                Builtin::Sync(f) => f(self, &args[1..], ctx),
                Builtin::Async(f) => f(self, &args[1..], ctx).await,
                Builtin::Host(f) => f(&args[1..], self),
            };
        }
        if let Some(body) = self.functions.get(name).cloned() {
            return self.call_function(&body, args, ctx).await;
        }
        self.run_external(args, ctx).await
    }

    /// Call a function: positional parameters, locals and loop nesting are
    /// scoped to the call, and `return` ends only this call.
    async fn call_function(&mut self, body: &str, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if self.function_depth >= MAX_CALL_DEPTH {
            return Err(AshError::Runtime(format!(
                "{}: maximum function nesting level exceeded ({MAX_CALL_DEPTH})",
                args[0]
            )));
        }

        let saved_positional = std::mem::replace(&mut self.positional, args[1..].to_vec());
        let saved_loop_depth = std::mem::take(&mut self.loop_depth);
        self.local_frames.push(HashMap::new());
        self.function_depth += 1;

        let result = self.execute_source(body, ctx).await;

        self.function_depth -= 1;
        if let Some(frame) = self.local_frames.pop() {
            for (name, old) in frame {
                match old {
                    Some(value) => {
                        self.vars.insert(name, value);
                    }
                    None => {
                        self.vars.remove(&name);
                    }
                }
            }
        }
        self.loop_depth = saved_loop_depth;
        self.positional = saved_positional;

        let status = result?;
        if self.flags.return_flag {
            self.flags.return_flag = false;
            return Ok(self.flags.return_code);
        }
        Ok(status)
    }

    /// Run a compound command with its trailing redirections.
    pub(crate) async fn run_compound(
        &mut self,
        body: &CompoundCommand,
        redirects: &[String],
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        if redirects.is_empty() {
            return self.execute_compound(body, ctx).await;
        }
        let (_, redirects) = split_redirects(redirects);
        let saved = self.apply_redirects(&redirects, ctx).await?;
        let result = self.execute_compound(body, ctx).await;
        self.restore_streams(saved, ctx).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellBuilder;

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("A=1"), Some(("A", "1")));
        assert_eq!(split_assignment("A="), Some(("A", "")));
        assert_eq!(split_assignment("1A=x"), None);
        assert_eq!(split_assignment("--opt=x"), None);
        assert_eq!(split_assignment("plain"), None);
    }

    #[test]
    fn test_classify_words() {
        let parts = classify(&words(&["A=1", "B=2", "cmd", "C=3", ">", "out"]));
        assert_eq!(parts.assignments, words(&["A=1", "B=2"]));
        assert_eq!(parts.words, words(&["cmd", "C=3"]));
        assert_eq!(parts.redirects.len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_assignment_is_temporary() {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        shell.set_var("A", "outer");
        let out = shell.execute_capture("A=inner eval 'echo $A'; echo $A").await.unwrap();
        assert_eq!(out.stdout_str(), "inner\nouter\n");
        assert!(!shell.is_exported("A"));
    }

    #[tokio::test]
    async fn test_assignment_status_follows_substitution() {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        let out = shell.execute_capture("X=$(false); echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "1\n");
    }

    #[tokio::test]
    async fn test_function_return_is_local() {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        let out = shell.execute_capture("f() { return 3; echo no; }; f; echo after $?").await.unwrap();
        assert_eq!(out.stdout_str(), "after 3\n");
    }

    #[tokio::test]
    async fn test_alias_substitution() {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        let out = shell
            .execute_capture("alias greet='echo hello'; greet world; alias echo='echo x'; echo y")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "hello world\nx y\n");
    }

    #[tokio::test]
    async fn test_xtrace_writes_to_stderr() {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        let out = shell.execute_capture("set -x; echo traced").await.unwrap();
        assert_eq!(out.stdout_str(), "traced\n");
        assert!(out.stderr_str().contains("+ echo traced"));
    }
}
