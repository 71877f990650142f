//! External commands

use super::utils::is_executable;
use super::{ExecContext, Input, Output, STREAM_CHUNK_SIZE};
use crate::error::{AshError, AshResult};
use crate::shell::Shell;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, trace};

fn output_stdio(out: &Output, fallback: fn() -> Stdio) -> std::io::Result<Stdio> {
    Ok(match out {
        Output::Stdout => Stdio::from(std::io::stdout()),
        Output::Stderr => Stdio::from(std::io::stderr()),
        Output::File(file) => Stdio::from(file.try_clone()?),
        Output::Closed => Stdio::null(),
        Output::Buffer(_) | Output::Pipe(_) => fallback(),
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

/// Copy a child's output stream into an [`Output`] until EOF. The pipe is
/// cleared at EOF; a dropped call can be resumed with the same pipe.
async fn drain(pipe: &mut Option<impl AsyncRead + Unpin>, out: &mut Output) {
    let Some(reader) = pipe.as_mut() else {
        return;
    };
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if out.write(&buf[..n]).is_err() || out.flush().await.is_err() {
                    break;
                }
            }
        }
    }
    *pipe = None;
}

/// Shell input on its way into a child's stdin. Bytes read but not yet
/// written stay here while a trap runs.
struct Feed {
    pipe: Option<ChildStdin>,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl Feed {
    fn new(pipe: Option<ChildStdin>) -> Self {
        Self {
            pipe,
            buf: vec![0u8; STREAM_CHUNK_SIZE],
            pos: 0,
            len: 0,
        }
    }

    /// Copy until EOF, then close the child's stdin.
    async fn run(&mut self, input: &mut Input) {
        let Input::Reader(reader) = input else {
            self.pipe = None;
            return;
        };
        let Some(pipe) = self.pipe.as_mut() else {
            return;
        };
        loop {
            if self.pos == self.len {
                match reader.read(&mut self.buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        self.pos = 0;
                        self.len = n;
                    }
                }
            }
            match pipe.write(&self.buf[self.pos..self.len]).await {
                Ok(0) | Err(_) => break,
                Ok(n) => self.pos += n,
            }
        }
        if let Some(mut pipe) = self.pipe.take() {
            let _ = pipe.shutdown().await;
        }
    }
}

#[allow(unsafe_code)]
pub(crate) fn send_signal(pid: u32, sig: i32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, sig) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

enum ChildEvent {
    Exited(std::io::Result<ExitStatus>),
    InputDone,
    Signal(Option<i32>),
}

impl Shell {
    /// Run an external program and wait for it. Trapped signals run their
    /// trap while the child is still running; others are forwarded to it.
    pub(crate) async fn run_external(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let name = &args[0];
        let path = self
            .lookup_command(name)
            .ok_or_else(|| AshError::CommandNotFound(name.clone()))?;
        if !is_executable(&path) {
            return Err(if path.exists() {
                AshError::NotExecutable(name.clone())
            } else {
                AshError::CommandNotFound(name.clone())
            });
        }

        let _ = ctx.stdout.flush().await;
        let _ = ctx.stderr.flush().await;

        let mut command = Command::new(&path);
        command
            .arg0(name)
            .args(&args[1..])
            .env_clear()
            .envs(self.child_env())
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .stdin(match ctx.stdin {
                Input::Inherit => Stdio::inherit(),
                Input::Null => Stdio::null(),
                Input::Reader(_) => Stdio::piped(),
            })
            .stdout(output_stdio(&ctx.stdout, Stdio::piped)?)
            .stderr(output_stdio(&ctx.stderr, Stdio::piped)?);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.raw_os_error() == Some(libc::ENOEXEC) => {
                return self.run_script_file(&path, args, ctx).await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(AshError::NotExecutable(name.clone()));
            }
            Err(e) => return Err(AshError::Runtime(format!("{name}: {e}"))),
        };

        let pid = child.id().unwrap_or_default();
        debug!(pid, command = %name, "spawned external command");
        if let Some(report) = ctx.pid_report.take() {
            let _ = report.send(pid);
        }

        let mut feed = Feed::new(child.stdin.take());
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut feeding = feed.pipe.is_some();
        let mut deferred = Vec::new();

        // The wait is rebuilt after each trap, which needs the context back.
        let status = loop {
            let wake = {
                let ExecContext {
                    stdin,
                    stdout,
                    stderr,
                    ..
                } = &mut *ctx;
                let mut input = std::pin::pin!(feed.run(stdin));
                let mut run = std::pin::pin!(async {
                    let (status, (), ()) = tokio::join!(
                        child.wait(),
                        drain(&mut stdout_pipe, stdout),
                        drain(&mut stderr_pipe, stderr)
                    );
                    status
                });
                loop {
                    let event = tokio::select! {
                        status = &mut run => ChildEvent::Exited(status),
                        () = &mut input, if feeding => ChildEvent::InputDone,
                        sig = self.signals.recv() => ChildEvent::Signal(sig),
                    };
                    match event {
                        ChildEvent::Exited(status) => break ChildEvent::Exited(status),
                        ChildEvent::InputDone => feeding = false,
                        ChildEvent::Signal(Some(sig)) => {
                            let name = super::signal_name(sig);
                            if name.is_some_and(|n| self.ignored.contains(n)) {
                                continue;
                            }
                            if name.is_some_and(|n| self.traps.contains_key(n)) {
                                break ChildEvent::Signal(Some(sig));
                            }
                            if sig != libc::SIGCHLD {
                                trace!(pid, signal = sig, "forwarding signal to child");
                                let _ = send_signal(pid, sig);
                            }
                            deferred.push(sig);
                        }
                        ChildEvent::Signal(None) => {}
                    }
                }
            };
            match wake {
                ChildEvent::Exited(status) => break status?,
                ChildEvent::Signal(Some(sig)) => {
                    debug!(pid, signal = sig, "running trap while child runs");
                    self.handle_signal(sig, ctx).await;
                    if self.flags.exit_flag {
                        let _ = child.start_kill();
                    }
                }
                ChildEvent::InputDone | ChildEvent::Signal(None) => {}
            }
        };

        for sig in deferred {
            self.handle_signal(sig, ctx).await;
        }
        Ok(exit_code(status))
    }

    /// Run a file without an interpreter line as an ash script in a subshell.
    async fn run_script_file(&mut self, path: &std::path::Path, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let source = tokio::fs::read_to_string(path).await?;
        let mut sub = self.clone_for_subshell();
        sub.set_script_name(&args[0]);
        sub.set_positional(args[1..].to_vec());
        let status = sub.execute_source(&source, ctx).await?;
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
    use super::*;
    use crate::shell::ShellBuilder;

    fn shell() -> Shell {
        ShellBuilder::new()
            .inherit_env(false)
            .env("PATH", "/usr/bin:/bin")
            .build()
    }

    #[tokio::test]
    async fn test_external_output_is_captured() {
        let mut sh = shell();
        let out = sh.execute_capture("sh -c 'echo out; echo err >&2; exit 3'").await.unwrap();
        assert_eq!(out.stdout_str(), "out\n");
        assert_eq!(out.stderr_str(), "err\n");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_missing_command() {
        let mut sh = shell();
        let out = sh.execute_capture("no-such-command-here").await.unwrap();
        assert_eq!(out.exit_code, 127);
        assert_eq!(out.stderr_str(), "ash: no-such-command-here: not found\n");
    }

    #[tokio::test]
    async fn test_exported_variables_reach_child() {
        let mut sh = shell();
        let out = sh.execute_capture("export FOO=bar; HIDDEN=1; sh -c 'echo $FOO-$HIDDEN'").await.unwrap();
        assert_eq!(out.stdout_str(), "bar-\n");
    }

    #[tokio::test]
    async fn test_script_without_shebang_runs_in_ash() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("plain");
        std::fs::write(&script, "echo from script $1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut sh = shell();
        let out = sh
            .execute_capture(&format!("{} arg", script.display()))
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "from script arg\n");
    }

    #[tokio::test]
    async fn test_trap_runs_while_child_is_running() {
        let mut sh = shell();
        let tx = sh.signal_sender();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            let _ = tx.send(libc::SIGUSR1).await;
        });
        let started = std::time::Instant::now();
        let out = sh
            .execute_capture("trap 'echo trapped' USR1; sh -c 'sleep 1; echo child'; echo after $?")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "trapped\nchild\nafter 0\n");
        assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_trap_exit_stops_child() {
        let mut sh = shell();
        let tx = sh.signal_sender();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            let _ = tx.send(libc::SIGUSR1).await;
        });
        let started = std::time::Instant::now();
        let out = sh
            .execute_capture("trap 'echo bye; exit 4' USR1; sleep 5; echo unreachable")
            .await
            .unwrap();
        assert_eq!(out.stdout_str(), "bye\n");
        assert_eq!(out.exit_code, 4);
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_signal_exit_status() {
        let mut sh = shell();
        let out = sh.execute_capture("sh -c 'kill -TERM $$'").await.unwrap();
        assert_eq!(out.exit_code, 128 + libc::SIGTERM);
    }
}
