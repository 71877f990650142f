//! Pipelines: every stage runs concurrently on its own copy of the shell,
//! connected by in-process pipes.

use super::command::split_assignment;
use super::redirect::split_redirects;
use super::{ExecContext, Input, Output, PipeWriter, STREAM_CHUNK_SIZE};
use crate::ast::Command;
use crate::error::AshResult;
use crate::parser::KEYWORDS;
use crate::shell::Shell;
use tracing::{debug, warn};

/// What a finished stage hands back: its status and, for the first stage,
/// the pipeline's input so the caller can keep reading from it.
type StageResult = (i32, Input);

impl Shell {
    /// Whether `cmd` will run as an external program: its command word is
    /// plain text naming no builtin, function, alias or keyword.
    pub(crate) fn is_external_command(&self, cmd: &Command) -> bool {
        let (Command::Simple(simple) | Command::Unparsed(simple)) = cmd else {
            return false;
        };
        let (plain, _) = split_redirects(&simple.words);
        let Some(name) = plain.iter().find(|w| split_assignment(w).is_none()) else {
            return false;
        };
        !name.contains(['$', '`', '\'', '"', '\\'])
            && !KEYWORDS.contains(&name.as_str())
            && !self.builtins.contains_key(name.as_str())
            && !self.functions.contains_key(name.as_str())
            && !self.aliases.contains_key(name.as_str())
    }

    /// Run `commands` as a pipeline. External stages are started before
    /// builtin stages; statuses are collected in stage order.
    pub(crate) async fn run_pipeline(&mut self, commands: &[Command], ctx: &mut ExecContext) -> AshResult<i32> {
        let _ = ctx.stdout.flush().await;
        let count = commands.len();

        let mut contexts = Vec::with_capacity(count);
        let mut upstream = Some(std::mem::replace(&mut ctx.stdin, Input::Null));
        for i in 0..count {
            let stdin = upstream.take().unwrap_or(Input::Null);
            let stdout = if i + 1 < count {
                let (writer, reader) = tokio::io::duplex(STREAM_CHUNK_SIZE);
                upstream = Some(Input::reader(reader));
                Output::Pipe(PipeWriter::new(writer, self.limits.write_timeout))
            } else {
                ctx.stdout.duplicate()
            };
            let mut stage_ctx = ExecContext::new(stdin, stdout, ctx.stderr.duplicate());
            if i + 1 == count {
                stage_ctx.pid_report = ctx.pid_report.take();
            }
            contexts.push(Some(stage_ctx));
        }

        let external: Vec<bool> = commands.iter().map(|cmd| self.is_external_command(cmd)).collect();
        let start_order = (0..count).filter(|&i| external[i]).chain((0..count).filter(|&i| !external[i]));

        let mut handles: Vec<Option<tokio::task::JoinHandle<StageResult>>> = (0..count).map(|_| None).collect();
        for i in start_order {
            let Some(stage_ctx) = contexts[i].take() else {
                continue;
            };
            handles[i] = Some(self.spawn_stage(i, commands[i].clone(), stage_ctx, external[i]));
        }

        let mut statuses = Vec::with_capacity(count);
        for (i, handle) in handles.into_iter().enumerate() {
            let Some(handle) = handle else {
                statuses.push(1);
                continue;
            };
            match handle.await {
                Ok((status, stdin)) => {
                    if i == 0 {
                        ctx.stdin = stdin;
                    }
                    statuses.push(status);
                }
                Err(e) => {
                    warn!(stage = i, error = %e, "pipeline stage failed");
                    statuses.push(1);
                }
            }
        }
        debug!(?statuses, "pipeline finished");

        let last = statuses.last().copied().unwrap_or(0);
        if self.options.pipefail {
            Ok(statuses.iter().fold(0, |acc, &s| if s != 0 { s } else { acc }))
        } else {
            Ok(last)
        }
    }

    fn spawn_stage(
        &self,
        index: usize,
        cmd: Command,
        mut stage_ctx: ExecContext,
        external: bool,
    ) -> tokio::task::JoinHandle<StageResult> {
        let mut stage_shell = self.clone_for_subshell();
        let deadline = self.limits.stage_timeout;
        tokio::spawn(async move {
            let run = async {
                let status = match stage_shell.execute_command(&cmd, &mut stage_ctx).await {
                    Ok(status) => status,
                    Err(e) => stage_shell.report_error(&e, &mut stage_ctx),
                };
                let status = if stage_shell.flags.exit_flag {
                    stage_shell.flags.exit_code
                } else {
                    status
                };
                stage_ctx.flush().await;
                status
            };
            let status = if external && !deadline.is_zero() {
                match tokio::time::timeout(deadline, run).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(stage = index, command = %cmd, ?deadline, "pipeline stage timed out");
                        1
                    }
                }
            } else {
                run.await
            };
            let stdin = std::mem::replace(&mut stage_ctx.stdin, Input::Null);
            (status, stdin)
        })
    }
}
