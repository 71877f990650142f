//! Evaluator for ash scripts

use crate::ast::{Command, ListOp, Pipeline, Script, Statement};
use crate::error::AshResult;
use crate::shell::Shell;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::oneshot;

mod arithmetic;
mod builtins_io;
mod builtins_jobs;
mod builtins_shell;
mod command;
mod control_flow;
mod expansion;
pub(crate) mod jobs;
mod pipeline;
mod process;
mod redirect;
pub(crate) mod signals;
mod utils;

pub use builtins_shell::{default_builtins, Builtin, BuiltinFn, BuiltinTable};
pub use signals::{signal_name, signal_number, SignalQueue, HANDLED_SIGNALS};

pub(crate) const STREAM_CHUNK_SIZE: usize = 64 * 1024;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write end of an in-process pipe between pipeline stages.
///
/// Writes are buffered and pushed into the pipe on `flush`, under a timeout
/// so a stalled reader cannot hang the writer forever.
pub struct PipeWriter {
    stream: Arc<tokio::sync::Mutex<DuplexStream>>,
    pending: Vec<u8>,
    timeout: Duration,
}

impl PipeWriter {
    pub(crate) fn new(stream: DuplexStream, timeout: Duration) -> Self {
        Self {
            stream: Arc::new(tokio::sync::Mutex::new(stream)),
            pending: Vec::new(),
            timeout,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.pending);
        let mut stream = self.stream.lock().await;
        match tokio::time::timeout(self.timeout, stream.write_all(&data)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "pipe write timed out",
            )),
        }
    }
}

pub enum Output {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
    File(Arc<std::fs::File>),
    Pipe(PipeWriter),
    /// A stream closed with `>&-`; every write fails.
    Closed,
}

impl Output {
    pub fn buffer() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (Self::Buffer(buf.clone()), buf)
    }

    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = std::io::stdout();
                out.write_all(data)?;
                out.flush()
            }
            Self::Stderr => {
                let mut err = std::io::stderr();
                err.write_all(data)?;
                err.flush()
            }
            Self::Buffer(buf) => {
                buf.lock()
                    .map_err(|_| std::io::Error::other("output buffer poisoned"))?
                    .extend_from_slice(data);
                Ok(())
            }
            Self::File(file) => (&**file).write_all(data),
            Self::Pipe(pipe) => {
                pipe.pending.extend_from_slice(data);
                Ok(())
            }
            Self::Closed => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Bad file descriptor",
            )),
        }
    }

    pub fn writeln(&mut self, s: &str) -> std::io::Result<()> {
        self.write(s.as_bytes())?;
        self.write(b"\n")
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout => std::io::stdout().flush(),
            Self::Stderr => std::io::stderr().flush(),
            Self::Pipe(pipe) => pipe.flush().await,
            Self::Buffer(_) | Self::File(_) | Self::Closed => Ok(()),
        }
    }

    /// A second handle on the same destination. Pending pipe data stays
    /// with `self`.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Stdout => Self::Stdout,
            Self::Stderr => Self::Stderr,
            Self::Buffer(buf) => Self::Buffer(buf.clone()),
            Self::File(file) => Self::File(file.clone()),
            Self::Pipe(pipe) => Self::Pipe(PipeWriter {
                stream: pipe.stream.clone(),
                pending: Vec::new(),
                timeout: pipe.timeout,
            }),
            Self::Closed => Self::Closed,
        }
    }
}

pub enum Input {
    /// The process's own standard input.
    Inherit,
    Null,
    Reader(BufReader<Box<dyn AsyncRead + Send + Unpin>>),
}

impl Input {
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(BufReader::new(Box::new(reader)))
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::reader(std::io::Cursor::new(data.into()))
    }
}

pub struct ExecContext {
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    /// Receives the pid of the first external process spawned under this
    /// context; used to report `$!` for background jobs.
    pub(crate) pid_report: Option<oneshot::Sender<u32>>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self {
            stdin: Input::Inherit,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
            pid_report: None,
        }
    }
}

impl ExecContext {
    pub fn new(stdin: Input, stdout: Output, stderr: Output) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            pid_report: None,
        }
    }

    pub fn write_err(&mut self, msg: &str) {
        let _ = self.stderr.write(format!("{msg}\n").as_bytes());
    }

    pub async fn flush(&mut self) {
        let _ = self.stdout.flush().await;
        let _ = self.stderr.flush().await;
    }

    /// Context for a concurrent task: same outputs, no input.
    pub(crate) fn fork(&self) -> Self {
        Self::new(Input::Null, self.stdout.duplicate(), self.stderr.duplicate())
    }
}

impl Shell {
    /// Run every statement of `script`, stopping early once an `exit`,
    /// `return`, `break` or `continue` is pending.
    pub async fn execute_script(&mut self, script: &Script, ctx: &mut ExecContext) -> AshResult<i32> {
        let mut status = self.flags.last_status;

        for stmt in &script.statements {
            self.process_signals(ctx).await;
            if self.flags.unwinding() {
                break;
            }
            if self.options.noexec {
                continue;
            }

            status = self.execute_statement_boxed(stmt, ctx).await?;
            self.flags.last_status = status;
            let _ = ctx.stdout.flush().await;

            self.process_signals(ctx).await;
            if self.flags.unwinding() {
                break;
            }
        }

        Ok(status)
    }

    /// Parse and run source text in the current shell. Syntax errors are
    /// reported on `ctx.stderr` and yield status 2.
    pub(crate) async fn execute_source(&mut self, source: &str, ctx: &mut ExecContext) -> AshResult<i32> {
        match crate::parser::parse(source) {
            Ok(script) => self.execute_script(&script, ctx).await,
            Err(e) => {
                ctx.write_err(&format!("ash: {e}"));
                self.flags.last_status = e.status();
                Ok(e.status())
            }
        }
    }

    pub(crate) fn execute_statement_boxed<'a>(
        &'a mut self,
        stmt: &'a Statement,
        ctx: &'a mut ExecContext,
    ) -> BoxFuture<'a, AshResult<i32>> {
        Box::pin(self.execute_statement(stmt, ctx))
    }

    async fn execute_statement(&mut self, stmt: &Statement, ctx: &mut ExecContext) -> AshResult<i32> {
        if stmt.background {
            return self.spawn_background(stmt, ctx).await;
        }

        let count = stmt.rest.len();
        let mut status = self.execute_list_element(&stmt.first, count > 0, ctx).await?;
        let mut decisive = &stmt.first;
        let mut ran_last = count == 0;

        for (i, (op, pipeline)) in stmt.rest.iter().enumerate() {
            if self.flags.unwinding() {
                break;
            }
            let run = match op {
                ListOp::And => status == 0,
                ListOp::Or => status != 0,
            };
            if run {
                let is_last = i + 1 == count;
                status = self.execute_list_element(pipeline, !is_last, ctx).await?;
                decisive = pipeline;
                ran_last = is_last;
            }
        }

        if status != 0
            && ran_last
            && !decisive.negated
            && self.options.errexit
            && self.condition_depth == 0
            && !self.flags.exit_flag
        {
            self.flags.exit_flag = true;
            self.flags.exit_code = status;
        }

        Ok(status)
    }

    async fn execute_list_element(
        &mut self,
        pipeline: &Pipeline,
        in_condition: bool,
        ctx: &mut ExecContext,
    ) -> AshResult<i32> {
        let in_condition = in_condition || pipeline.negated;
        if in_condition {
            self.condition_depth += 1;
        }
        let result = self.execute_pipeline(pipeline, ctx).await;
        if in_condition {
            self.condition_depth -= 1;
        }
        result
    }

    async fn execute_pipeline(&mut self, pipeline: &Pipeline, ctx: &mut ExecContext) -> AshResult<i32> {
        let status = match pipeline.commands.as_slice() {
            [] => 0,
            [single] => self.execute_command(single, ctx).await?,
            commands => self.run_pipeline(commands, ctx).await?,
        };
        let status = if pipeline.negated {
            i32::from(status == 0)
        } else {
            status
        };
        self.flags.last_status = status;
        Ok(status)
    }

    pub(crate) async fn execute_command(&mut self, cmd: &Command, ctx: &mut ExecContext) -> AshResult<i32> {
        match cmd {
            Command::Simple(simple) | Command::Unparsed(simple) => {
                Ok(self.run_simple_command(&simple.words, ctx).await)
            }
            Command::Compound { body, redirects } => match self.run_compound(body, redirects, ctx).await {
                Ok(status) => Ok(status),
                Err(e) => Ok(self.report_error(&e, ctx)),
            },
            Command::FunctionDef { name, body } => {
                self.define_function(name, body);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_output_collects_writes() {
        let (mut out, buf) = Output::buffer();
        out.write(b"hello ").unwrap();
        out.writeln("world").unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"hello world\n");
    }

    #[test]
    fn test_closed_output_rejects_writes() {
        let mut out = Output::Closed;
        assert!(out.write(b"x").is_err());
    }

    #[tokio::test]
    async fn test_pipe_output_delivers_on_flush() {
        use tokio::io::AsyncReadExt;

        let (writer, mut reader) = tokio::io::duplex(1024);
        let mut out = Output::Pipe(PipeWriter::new(writer, Duration::from_secs(1)));
        out.write(b"data").unwrap();
        out.flush().await.unwrap();
        drop(out);

        let mut received = String::new();
        reader.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "data");
    }

    #[tokio::test]
    async fn test_pipe_write_times_out_when_reader_stalls() {
        let (writer, _reader) = tokio::io::duplex(4);
        let mut out = Output::Pipe(PipeWriter::new(writer, Duration::from_millis(50)));
        out.write(b"more than four bytes").unwrap();
        let err = out.flush().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_execute_script_runs_statements_in_order() {
        let mut shell = Shell::new();
        let (stdout, buf) = Output::buffer();
        let mut ctx = ExecContext::new(Input::Null, stdout, Output::Stderr);
        let script = crate::parser::parse("echo one; echo two").unwrap();
        let status = shell.execute_script(&script, &mut ctx).await.unwrap();
        assert_eq!(status, 0);
        assert_eq!(String::from_utf8_lossy(&buf.lock().unwrap()), "one\ntwo\n");
    }
}
