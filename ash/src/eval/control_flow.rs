use super::utils::match_case_pattern;
use super::ExecContext;
use crate::ast::{CaseArm, CompoundCommand, Script};
use crate::error::{AshError, AshResult};
use crate::parser::is_name;
use crate::shell::Shell;
use tracing::warn;

/// What a loop does after its body ran.
enum LoopControl {
    Next,
    Break,
    Continue,
}

impl Shell {
    pub(crate) async fn execute_compound(&mut self, body: &CompoundCommand, ctx: &mut ExecContext) -> AshResult<i32> {
        match body {
            CompoundCommand::If { branches, else_body } => self.execute_if(branches, else_body.as_ref(), ctx).await,
            CompoundCommand::While { condition, body, until } => {
                self.execute_while(condition, body, *until, ctx).await
            }
            CompoundCommand::For { variable, words, body } => {
                self.execute_for(variable, words.as_deref(), body, ctx).await
            }
            CompoundCommand::Case { word, arms } => self.execute_case(word, arms, ctx).await,
            CompoundCommand::Group(body) => self.execute_script(body, ctx).await,
            CompoundCommand::Subshell(body) => self.execute_subshell(body, ctx).await,
        }
    }

    /// Run a condition list; failures inside it never trigger `set -e`.
    async fn execute_condition(&mut self, condition: &Script, ctx: &mut ExecContext) -> AshResult<i32> {
        self.condition_depth += 1;
        let result = self.execute_script(condition, ctx).await;
        self.condition_depth -= 1;
        result
    }

    async fn execute_if(
        &mut self,
        branches: &[(Script, Script)],
        else_body: Option<&Script>,
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        for (condition, then_body) in branches {
            let status = self.execute_condition(condition, ctx).await?;
            if self.flags.unwinding() {
                return Ok(status);
            }
            if status == 0 {
                return self.execute_script(then_body, ctx).await;
            }
        }
        match else_body {
            Some(body) => self.execute_script(body, ctx).await,
            None => Ok(0),
        }
    }

    /// Consume a pending `break`/`continue` at this loop level.
    fn take_loop_control(&mut self) -> LoopControl {
        if self.flags.break_depth > 0 {
            self.flags.break_depth -= 1;
            return LoopControl::Break;
        }
        if self.flags.continue_depth > 0 {
            self.flags.continue_depth -= 1;
            // `continue N` with N > 1 ends this loop and continues an outer one.
            if self.flags.continue_depth > 0 {
                return LoopControl::Break;
            }
            return LoopControl::Continue;
        }
        LoopControl::Next
    }

    async fn execute_while(
        &mut self,
        condition: &Script,
        body: &Script,
        until: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        let limit = self.limits.loop_limit;
        let mut status = 0;
        let mut iterations = 0usize;
        self.loop_depth += 1;

        let result = loop {
            if limit > 0 && iterations >= limit {
                warn!(limit, "loop iteration limit reached");
                ctx.write_err(&format!("ash: loop iteration limit ({limit}) reached"));
                break Ok(status);
            }
            iterations += 1;

            let cond = match self.execute_condition(condition, ctx).await {
                Ok(cond) => cond,
                Err(e) => break Err(e),
            };
            if self.flags.exit_flag || self.flags.return_flag {
                break Ok(status);
            }
            match self.take_loop_control() {
                LoopControl::Break => break Ok(status),
                LoopControl::Continue => continue,
                LoopControl::Next => {}
            }
            if (cond == 0) == until {
                break Ok(status);
            }

            status = match self.execute_script(body, ctx).await {
                Ok(status) => status,
                Err(e) => break Err(e),
            };
            if self.flags.exit_flag || self.flags.return_flag {
                break Ok(status);
            }
            if let LoopControl::Break = self.take_loop_control() {
                break Ok(status);
            }
        };

        self.loop_depth -= 1;
        result
    }

    async fn execute_for(
        &mut self,
        variable: &str,
        words: Option<&[String]>,
        body: &Script,
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        if !is_name(variable) {
            return Err(AshError::InvalidArgument(format!("for: `{variable}': not a valid identifier")));
        }
        let items = match words {
            Some(words) => {
                let mut items = Vec::new();
                for word in words {
                    items.extend(self.expand_word_fields(word, ctx).await?);
                }
                items
            }
            None => self.positional.clone(),
        };

        let mut status = 0;
        self.loop_depth += 1;
        let mut result = Ok(0);
        for item in items {
            self.set_var(variable, &item);
            status = match self.execute_script(body, ctx).await {
                Ok(status) => status,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            if self.flags.exit_flag || self.flags.return_flag {
                break;
            }
            if let LoopControl::Break = self.take_loop_control() {
                break;
            }
        }
        self.loop_depth -= 1;
        result.map(|_| status)
    }

    async fn execute_case(&mut self, word: &str, arms: &[CaseArm], ctx: &mut ExecContext) -> AshResult<i32> {
        let word = self.expand_word(word, ctx).await?;
        for arm in arms {
            for pattern in &arm.patterns {
                let pattern = self.expand_word(pattern, ctx).await?;
                if match_case_pattern(&pattern, &word) {
                    return self.execute_script(&arm.body, ctx).await;
                }
            }
        }
        Ok(0)
    }

    /// `( ... )`: run in a copy of the shell; nothing but output escapes.
    async fn execute_subshell(&mut self, body: &Script, ctx: &mut ExecContext) -> AshResult<i32> {
        let mut sub = self.clone_for_subshell();
        let status = sub.execute_script(body, ctx).await?;
        let status = if sub.flags.exit_flag {
            sub.flags.exit_code
        } else {
            status
        };
        Ok(sub.run_exit_trap(status, ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use crate::shell::{Shell, ShellBuilder};

    fn shell() -> Shell {
        ShellBuilder::new().inherit_env(false).build()
    }

    async fn stdout(script: &str) -> String {
        shell().execute_capture(script).await.unwrap().stdout_str()
    }

    #[tokio::test]
    async fn test_if_elif_else() {
        assert_eq!(stdout("if false; then echo a; elif true; then echo b; else echo c; fi").await, "b\n");
        assert_eq!(stdout("if false; then echo a; else echo c; fi").await, "c\n");
        assert_eq!(stdout("if false; then echo a; fi; echo $?").await, "0\n");
    }

    #[tokio::test]
    async fn test_for_loop() {
        assert_eq!(stdout("for x in a b; do echo $x; done").await, "a\nb\n");
        assert_eq!(stdout("set -- p q; for x; do echo $x; done").await, "p\nq\n");
    }

    #[tokio::test]
    async fn test_while_and_until() {
        assert_eq!(
            stdout("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done").await,
            "0\n1\n2\n"
        );
        assert_eq!(stdout("i=0; until [ $i -ge 2 ]; do i=$((i+1)); done; echo $i").await, "2\n");
    }

    #[tokio::test]
    async fn test_break_and_continue() {
        assert_eq!(
            stdout("for i in 1 2 3 4; do if [ $i = 2 ]; then continue; fi; if [ $i = 4 ]; then break; fi; echo $i; done").await,
            "1\n3\n"
        );
        assert_eq!(
            stdout("for a in x y; do for b in 1 2; do echo $a$b; break 2; done; done").await,
            "x1\n"
        );
        assert_eq!(
            stdout("for a in x y; do for b in 1 2; do continue 2; echo no; done; echo no; done; echo end").await,
            "end\n"
        );
    }

    #[tokio::test]
    async fn test_loop_limit() {
        let mut sh = ShellBuilder::new().inherit_env(false).loop_limit(5).build();
        let out = sh.execute_capture("n=0; while true; do n=$((n+1)); done; echo $n").await.unwrap();
        assert_eq!(out.stdout_str(), "5\n");
        assert!(out.stderr_str().contains("loop iteration limit (5) reached"));
    }

    #[tokio::test]
    async fn test_case_patterns() {
        let script = "for w in apple banana cherry kiwi; do case $w in a*) echo A;; *na*) echo NA;; *rry|x) echo RY;; *) echo other;; esac; done";
        assert_eq!(stdout(script).await, "A\nNA\nRY\nother\n");
    }

    #[tokio::test]
    async fn test_subshell_isolation() {
        assert_eq!(stdout("X=1; (X=2; echo $X); echo $X").await, "2\n1\n");
        let mut sh = shell();
        let out = sh.execute_capture("(exit 7); echo $?").await.unwrap();
        assert_eq!(out.stdout_str(), "7\n");
    }

    #[tokio::test]
    async fn test_compound_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = ShellBuilder::new().inherit_env(false).cwd(dir.path()).build();
        let out = sh
            .execute_capture("for i in 1 2; do echo $i; done > nums; while read n; do echo got $n; done < nums")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "got 1\ngot 2\n");
    }
}
