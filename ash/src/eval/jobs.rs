//! Background jobs
//!
//! A job owns the receiving end of a one-shot channel; the task running the
//! job posts its exit status there and never touches interpreter state.

use super::ExecContext;
use crate::ast::Statement;
use crate::error::{AshResult, EXIT_NOT_FOUND};
use crate::shell::Shell;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

/// Base for pids handed to jobs that never spawn a process.
const SYNTHETIC_PID_BASE: u32 = 1 << 22;

pub(crate) struct Job {
    pub id: usize,
    pub pid: u32,
    pub command: String,
    result: Option<oneshot::Receiver<i32>>,
    pub status: Option<i32>,
    abort: AbortHandle,
    /// Signal used to cancel an in-process job with `kill`.
    pub killed_by: Option<i32>,
}

impl Job {
    /// Collect the exit status if the job has finished.
    pub fn poll(&mut self) -> Option<i32> {
        if self.status.is_some() {
            return self.status;
        }
        let rx = self.result.as_mut()?;
        match rx.try_recv() {
            Ok(code) => self.finish(Ok(code)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => self.finish(Err(())),
        }
    }

    fn finish(&mut self, result: Result<i32, ()>) -> Option<i32> {
        let status = match result {
            Ok(code) => code,
            Err(()) => self.killed_by.map_or(1, |sig| 128 + sig),
        };
        self.result = None;
        self.status = Some(status);
        self.status
    }

    pub fn is_synthetic(&self) -> bool {
        self.pid >= SYNTHETIC_PID_BASE
    }

    /// Cancel an in-process job as if it had received `sig`.
    pub fn cancel(&mut self, sig: i32) {
        self.killed_by = Some(sig);
        self.abort.abort();
    }
}

#[derive(Default)]
pub(crate) struct JobTable {
    jobs: HashMap<usize, Job>,
    order: Vec<usize>,
    by_pid: HashMap<u32, usize>,
    next_id: usize,
}

impl JobTable {
    fn allocate_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, job: Job) {
        self.order.push(job.id);
        self.by_pid.insert(job.pid, job.id);
        self.jobs.insert(job.id, job);
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        self.order.retain(|&j| j != id);
        self.by_pid.remove(&job.pid);
        Some(job)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    /// Job ids in submission order.
    pub fn ids(&self) -> Vec<usize> {
        self.order.clone()
    }

    pub fn current(&self) -> Option<usize> {
        self.order.last().copied()
    }

    pub fn by_pid(&self, pid: u32) -> Option<usize> {
        self.by_pid.get(&pid).copied()
    }

    /// Resolve `%N`, `%%`, `%+`, `%-` or a pid to a job id.
    pub fn resolve(&self, spec: &str) -> Option<usize> {
        match spec {
            "%%" | "%+" | "%" => self.current(),
            "%-" => self.order.iter().rev().nth(1).copied(),
            _ => match spec.strip_prefix('%') {
                Some(n) => n.parse().ok().filter(|id| self.jobs.contains_key(id)),
                None => spec.parse().ok().and_then(|pid| self.by_pid(pid)),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

enum WaitEvent {
    Done(Result<i32, oneshot::error::RecvError>),
    Signal(Option<i32>),
}

impl Shell {
    /// Launch `stmt` as a background job and return immediately with
    /// status 0. `$!` becomes the job's process id, or a synthetic id when
    /// the job runs entirely in-process.
    pub(crate) async fn spawn_background(&mut self, stmt: &Statement, ctx: &mut ExecContext) -> AshResult<i32> {
        let mut foreground = stmt.clone();
        foreground.background = false;
        let command = foreground.to_string();

        let mut job_shell = self.clone_for_subshell();
        let mut job_ctx = ctx.fork();
        let reports_pid = foreground.rest.is_empty()
            && foreground
                .first
                .commands
                .last()
                .is_some_and(|cmd| self.is_external_command(cmd));
        let (pid_tx, pid_rx) = oneshot::channel();
        if reports_pid {
            job_ctx.pid_report = Some(pid_tx);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let status = match job_shell.execute_statement_boxed(&foreground, &mut job_ctx).await {
                Ok(status) => status,
                Err(e) => {
                    job_ctx.write_err(&format!("ash: {e}"));
                    e.status()
                }
            };
            let status = if job_shell.flags.exit_flag {
                job_shell.flags.exit_code
            } else {
                status
            };
            job_ctx.flush().await;
            let _ = result_tx.send(status);
        });

        let id = self.jobs.allocate_id();
        let synthetic = SYNTHETIC_PID_BASE + id as u32;
        let pid = if reports_pid {
            pid_rx.await.unwrap_or(synthetic)
        } else {
            synthetic
        };

        debug!(job = id, pid, command = %command, "started background job");
        self.jobs.insert(Job {
            id,
            pid,
            command,
            result: Some(result_rx),
            status: None,
            abort: handle.abort_handle(),
            killed_by: None,
        });
        self.flags.last_bg_pid = Some(pid);
        Ok(0)
    }

    /// Wait for job `id`, acting on signals that arrive meanwhile. A trapped
    /// or fatal signal interrupts the wait with status 128+N and leaves the
    /// job in the table.
    pub(crate) async fn wait_job(&mut self, id: usize, ctx: &mut ExecContext) -> i32 {
        loop {
            let Some(job) = self.jobs.get_mut(id) else {
                return EXIT_NOT_FOUND;
            };
            if let Some(status) = job.poll() {
                debug!(job = id, status, "reaped background job");
                self.jobs.remove(id);
                return status;
            }
            let Some(rx) = job.result.as_mut() else {
                return EXIT_NOT_FOUND;
            };

            let event = tokio::select! {
                result = rx => WaitEvent::Done(result),
                sig = self.signals.recv() => WaitEvent::Signal(sig),
            };

            match event {
                WaitEvent::Done(result) => {
                    if let Some(job) = self.jobs.get_mut(id) {
                        job.finish(result.map_err(|_| ()));
                    }
                }
                WaitEvent::Signal(Some(sig)) => {
                    if self.handle_signal(sig, ctx).await {
                        return 128 + sig;
                    }
                }
                WaitEvent::Signal(None) => {}
            }
        }
    }

    /// Wait for a process the job table does not know about.
    pub(crate) async fn os_wait(&self, pid: u32) -> i32 {
        let Ok(raw) = i32::try_from(pid) else {
            return EXIT_NOT_FOUND;
        };
        tokio::task::spawn_blocking(move || wait_pid(raw))
            .await
            .unwrap_or(EXIT_NOT_FOUND)
    }
}

#[allow(unsafe_code)]
fn wait_pid(pid: i32) -> i32 {
    let mut status: libc::c_int = 0;
    // SAFETY: waitpid only writes the status through the valid pointer.
    let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
    if rc < 0 {
        return EXIT_NOT_FOUND;
    }
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        1
    }
}
