//! Redirections on simple and compound commands

use super::{ExecContext, Input, Output};
use crate::error::{AshError, AshResult};
use crate::lexer::{is_redirect_operator, redirect_takes_target};
use crate::shell::Shell;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;

/// Mode for files created by `>` and `>>`.
const CREATE_MODE: u32 = 0o600;

/// A redirection operator with its raw (unexpanded) target word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RedirectWord {
    pub op: String,
    pub target: Option<String>,
}

/// Split raw command words into plain words and redirections.
pub(crate) fn split_redirects(words: &[String]) -> (Vec<String>, Vec<RedirectWord>) {
    let mut plain = Vec::new();
    let mut redirects = Vec::new();
    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        if is_redirect_operator(word) {
            let target = if redirect_takes_target(word) {
                iter.next().cloned()
            } else {
                None
            };
            redirects.push(RedirectWord {
                op: word.clone(),
                target,
            });
        } else {
            plain.push(word.clone());
        }
    }
    (plain, redirects)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Redirect {
    Read { fd: u32, target: String },
    Write { fd: u32, target: String, append: bool },
    Dup { fd: u32, to: u32 },
    Close(u32),
    HereDoc,
}

impl Redirect {
    /// Build a redirect from its operator and expanded target.
    fn parse(op: &str, target: Option<String>) -> AshResult<Self> {
        let digits: String = op.chars().take_while(char::is_ascii_digit).collect();
        let rest = &op[digits.len()..];
        let explicit_fd = digits.parse::<u32>().ok();
        let missing = || AshError::InvalidArgument(format!("{op}: missing redirection target"));

        let redirect = match rest {
            "<<" | "<<-" => Self::HereDoc,
            "<" => Self::Read {
                fd: explicit_fd.unwrap_or(0),
                target: target.ok_or_else(missing)?,
            },
            ">" | ">>" => Self::Write {
                fd: explicit_fd.unwrap_or(1),
                target: target.ok_or_else(missing)?,
                append: rest == ">>",
            },
            _ => {
                let default_fd = if rest.starts_with('<') { 0 } else { 1 };
                let fd = explicit_fd.unwrap_or(default_fd);
                match &rest[2..] {
                    "-" => Self::Close(fd),
                    to => Self::Dup {
                        fd,
                        to: to
                            .parse()
                            .map_err(|_| AshError::InvalidArgument(format!("{op}: bad file descriptor")))?,
                    },
                }
            }
        };
        Ok(redirect)
    }
}

/// Streams replaced by redirections, put back by [`Shell::restore_streams`].
#[derive(Default)]
pub(crate) struct SavedStreams {
    stdin: Option<Input>,
    stdout: Option<Output>,
    stderr: Option<Output>,
}

impl SavedStreams {
    fn save_output(&mut self, fd: u32, ctx: &mut ExecContext, replacement: Output) {
        let old = match fd {
            1 => std::mem::replace(&mut ctx.stdout, replacement),
            _ => std::mem::replace(&mut ctx.stderr, replacement),
        };
        let slot = if fd == 1 { &mut self.stdout } else { &mut self.stderr };
        if slot.is_none() {
            *slot = Some(old);
        }
    }

    fn save_input(&mut self, ctx: &mut ExecContext, replacement: Input) {
        let old = std::mem::replace(&mut ctx.stdin, replacement);
        if self.stdin.is_none() {
            self.stdin = Some(old);
        }
    }
}

fn check_fd(fd: u32) -> AshResult<()> {
    if fd > 2 {
        return Err(AshError::InvalidArgument(format!("{fd}: bad file descriptor")));
    }
    Ok(())
}

impl Shell {
    /// Expand targets and apply redirections left to right. On error the
    /// streams already replaced are restored before returning.
    pub(crate) async fn apply_redirects(
        &mut self,
        redirects: &[RedirectWord],
        ctx: &mut ExecContext,
    ) -> AshResult<SavedStreams> {
        let mut saved = SavedStreams::default();
        for redirect in redirects {
            if let Err(e) = self.apply_redirect(redirect, &mut saved, ctx).await {
                self.restore_streams(saved, ctx).await;
                return Err(e);
            }
        }
        Ok(saved)
    }

    async fn apply_redirect(
        &mut self,
        word: &RedirectWord,
        saved: &mut SavedStreams,
        ctx: &mut ExecContext,
    ) -> AshResult<()> {
        let target = match (&word.target, word.op.ends_with("<<") || word.op.ends_with("<<-")) {
            (Some(raw), false) => Some(self.expand_word(raw, ctx).await?),
            (raw, _) => raw.clone(),
        };

        match Redirect::parse(&word.op, target)? {
            Redirect::HereDoc => saved.save_input(ctx, Input::Null),
            Redirect::Read { fd, target } => {
                if fd != 0 {
                    return Err(AshError::InvalidArgument(format!("{fd}: bad file descriptor")));
                }
                self.check_restricted_target(&target)?;
                let path = self.resolve_path(&target);
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| AshError::Runtime(format!("{target}: {}", describe_io(&e))))?;
                saved.save_input(ctx, Input::reader(file));
            }
            Redirect::Write { fd, target, append } => {
                check_fd(fd)?;
                if fd == 0 {
                    return Err(AshError::InvalidArgument("0: bad file descriptor".to_string()));
                }
                self.check_restricted_target(&target)?;
                let path = self.resolve_path(&target);
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(append)
                    .truncate(!append)
                    .mode(CREATE_MODE)
                    .open(&path)
                    .map_err(|e| AshError::Runtime(format!("{target}: {}", describe_io(&e))))?;
                saved.save_output(fd, ctx, Output::File(Arc::new(file)));
            }
            Redirect::Dup { fd, to } => {
                check_fd(fd)?;
                check_fd(to)?;
                match (fd, to) {
                    (1, 2) => {
                        let dup = ctx.stderr.duplicate();
                        saved.save_output(1, ctx, dup);
                    }
                    (2, 1) => {
                        let dup = ctx.stdout.duplicate();
                        saved.save_output(2, ctx, dup);
                    }
                    _ => {}
                }
            }
            Redirect::Close(0) => saved.save_input(ctx, Input::Null),
            Redirect::Close(fd) => {
                check_fd(fd)?;
                saved.save_output(fd, ctx, Output::Closed);
            }
        }
        Ok(())
    }

    fn check_restricted_target(&self, target: &str) -> AshResult<()> {
        if self.options.restricted && target.contains('/') {
            return Err(AshError::Restricted(target.to_string()));
        }
        Ok(())
    }

    /// Flush redirected streams and put the saved ones back.
    pub(crate) async fn restore_streams(&mut self, saved: SavedStreams, ctx: &mut ExecContext) {
        if let Some(stdout) = saved.stdout {
            let _ = ctx.stdout.flush().await;
            ctx.stdout = stdout;
        }
        if let Some(stderr) = saved.stderr {
            let _ = ctx.stderr.flush().await;
            ctx.stderr = stderr;
        }
        if let Some(stdin) = saved.stdin {
            ctx.stdin = stdin;
        }
    }
}

/// An io error as a shell would print it, without the "(os error N)" tail.
pub(crate) fn describe_io(e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
        std::io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        _ => {
            let text = e.to_string();
            match text.find(" (os error") {
                Some(idx) => text[..idx].to_string(),
                None => text,
            }
        }
    }
}
