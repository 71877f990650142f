//! Job control and signal builtins: wait, jobs, fg, bg, kill, trap

use super::builtins_shell::quote_value;
use super::process::send_signal;
use super::signals::is_trappable;
use super::{signal_name, signal_number, ExecContext, HANDLED_SIGNALS};
use crate::error::{AshError, AshResult, EXIT_NOT_FOUND};
use crate::shell::Shell;
use std::collections::BTreeMap;
use tracing::debug;

const KILL_USAGE: &str = "kill: usage: kill [-s sigspec | -signum | -sigspec] pid | jobspec ...";

impl Shell {
    pub(crate) async fn cmd_wait(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        if args.is_empty() {
            for id in self.jobs.ids() {
                let status = self.wait_job(id, ctx).await;
                if self.jobs.get_mut(id).is_some() {
                    // Interrupted by a signal before the job finished.
                    return Ok(status);
                }
                if self.flags.exit_flag {
                    break;
                }
            }
            return Ok(0);
        }

        let mut status = 0;
        for arg in args {
            status = if let Some(id) = self.jobs.resolve(arg) {
                self.wait_job(id, ctx).await
            } else if arg.starts_with('%') {
                ctx.write_err(&format!("ash: wait: {arg}: no such job"));
                EXIT_NOT_FOUND
            } else {
                let pid: u32 = arg
                    .parse()
                    .map_err(|_| AshError::InvalidArgument(format!("wait: Illegal number: {arg}")))?;
                self.os_wait(pid).await
            };
            if self.flags.exit_flag {
                break;
            }
        }
        Ok(status)
    }

    pub(crate) fn cmd_jobs(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let pids_only = args.iter().any(|a| a == "-p");
        let long = args.iter().any(|a| a == "-l");
        let ids = self.jobs.ids();
        let current = ids.last().copied();
        let previous = ids.iter().rev().nth(1).copied();

        let mut finished = Vec::new();
        for id in ids {
            let Some(job) = self.jobs.get_mut(id) else {
                continue;
            };
            let status = job.poll();
            if status.is_some() {
                finished.push(id);
            }
            if pids_only {
                ctx.stdout.writeln(&job.pid.to_string())?;
                continue;
            }
            let marker = if Some(id) == current {
                '+'
            } else if Some(id) == previous {
                '-'
            } else {
                ' '
            };
            let state = match status {
                None => "Running".to_string(),
                Some(0) => "Done".to_string(),
                Some(code) => format!("Exit {code}"),
            };
            let line = if long {
                format!("[{id}]{marker} {} {state:<24}{}", job.pid, job.command)
            } else {
                format!("[{id}]{marker}  {state:<24}{}", job.command)
            };
            ctx.stdout.writeln(&line)?;
        }
        for id in finished {
            self.jobs.remove(id);
        }
        Ok(0)
    }

    fn resolve_job(&self, cmd: &str, args: &[String]) -> AshResult<usize> {
        let spec = args.first().map_or("%+", String::as_str);
        self.jobs
            .resolve(spec)
            .ok_or_else(|| AshError::Runtime(format!("{cmd}: {spec}: no such job")))
    }

    /// Jobs never stop, so `fg` just waits for the job in the foreground.
    pub(crate) async fn cmd_fg(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let id = self.resolve_job("fg", args)?;
        if let Some(job) = self.jobs.get_mut(id) {
            let command = job.command.clone();
            ctx.stdout.writeln(&command)?;
        }
        let _ = ctx.stdout.flush().await;
        Ok(self.wait_job(id, ctx).await)
    }

    pub(crate) fn cmd_bg(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let id = self.resolve_job("bg", args)?;
        ctx.write_err(&format!("ash: bg: job {id} already in background"));
        Ok(0)
    }

    fn list_signals(ctx: &mut ExecContext, args: &[String]) -> AshResult<i32> {
        if args.is_empty() {
            let names: Vec<&str> = (1..=64).filter_map(signal_name).collect();
            ctx.stdout.writeln(&names.join(" "))?;
            return Ok(0);
        }
        for arg in args {
            let name = arg
                .parse::<i32>()
                .ok()
                .map(|n| if n > 128 { n - 128 } else { n })
                .and_then(signal_name)
                .ok_or_else(|| AshError::InvalidArgument(format!("kill: {arg}: invalid signal specification")))?;
            ctx.stdout.writeln(name)?;
        }
        Ok(0)
    }

    pub(crate) fn cmd_kill(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let bad_signal = |spec: &str| AshError::InvalidArgument(format!("kill: {spec}: invalid signal specification"));
        let mut sig = libc::SIGTERM;
        let mut rest = args;
        match args.first().map(String::as_str) {
            Some("-l") => return Self::list_signals(ctx, &args[1..]),
            Some("-s") => {
                let spec = args.get(1).ok_or_else(|| AshError::InvalidArgument(KILL_USAGE.to_string()))?;
                sig = signal_number(spec).ok_or_else(|| bad_signal(spec))?;
                rest = &args[2..];
            }
            Some("--") => rest = &args[1..],
            Some(opt) if opt.len() > 1 && opt.starts_with('-') => {
                sig = signal_number(&opt[1..]).ok_or_else(|| bad_signal(&opt[1..]))?;
                rest = &args[1..];
            }
            _ => {}
        }
        if rest.first().is_some_and(|a| a == "--") {
            rest = &rest[1..];
        }
        if rest.is_empty() {
            return Err(AshError::InvalidArgument(KILL_USAGE.to_string()));
        }

        let mut status = 0;
        for target in rest {
            if let Err(message) = self.signal_target(target, sig) {
                ctx.write_err(&format!("ash: kill: {message}"));
                status = 1;
            }
        }
        Ok(status)
    }

    fn signal_target(&mut self, target: &str, sig: i32) -> Result<(), String> {
        let job_id = if target.starts_with('%') {
            Some(self.jobs.resolve(target).ok_or_else(|| format!("{target}: no such job"))?)
        } else {
            let pid: u32 = target
                .parse()
                .map_err(|_| format!("{target}: arguments must be process or job IDs"))?;
            if pid == self.pid && is_trappable(sig) && sig != 0 {
                debug!(signal = sig, "delivering signal to self");
                self.signals.deliver(sig);
                return Ok(());
            }
            self.jobs.by_pid(pid)
        };

        let pid = match job_id.and_then(|id| self.jobs.get_mut(id)) {
            Some(job) if job.is_synthetic() => {
                if sig != 0 && job.status.is_none() {
                    debug!(job = job.id, signal = sig, "cancelling in-process job");
                    job.cancel(sig);
                }
                return Ok(());
            }
            Some(job) => job.pid,
            None => target
                .parse()
                .map_err(|_| format!("{target}: no such job"))?,
        };
        send_signal(pid, sig).map_err(|_| format!("({pid}) - No such process"))
    }

    fn print_traps(&self, filter: &[String], ctx: &mut ExecContext) -> AshResult<()> {
        let mut entries: BTreeMap<&str, &str> = self.traps.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        for name in &self.ignored {
            entries.insert(name.as_str(), "");
        }
        let wanted: Vec<&str> = filter
            .iter()
            .filter_map(|spec| signal_number(spec).and_then(signal_name))
            .collect();
        for (name, action) in entries {
            if !wanted.is_empty() && !wanted.contains(&name) {
                continue;
            }
            ctx.stdout.writeln(&format!("trap -- {} {name}", quote_action(action)))?;
        }
        Ok(())
    }

    pub(crate) fn cmd_trap(&mut self, args: &[String], ctx: &mut ExecContext) -> AshResult<i32> {
        let args = match args.first().map(String::as_str) {
            Some("--") => &args[1..],
            _ => args,
        };
        match args.first().map(String::as_str) {
            None => {
                self.print_traps(&[], ctx)?;
                return Ok(0);
            }
            Some("-p") => {
                self.print_traps(&args[1..], ctx)?;
                return Ok(0);
            }
            Some("-l") => {
                for (name, num) in HANDLED_SIGNALS {
                    ctx.stdout.writeln(&format!("{num:2}) SIG{name}"))?;
                }
                return Ok(0);
            }
            _ => {}
        }

        let (action, specs) = match args {
            [action] => (action.as_str(), vec!["EXIT".to_string()]),
            [action, specs @ ..] => (action.as_str(), specs.to_vec()),
            [] => return Ok(0),
        };

        let mut status = 0;
        for spec in &specs {
            let Some(sig) = signal_number(spec).filter(|&n| is_trappable(n)) else {
                ctx.write_err(&format!("ash: trap: {spec}: bad trap"));
                status = 1;
                continue;
            };
            let name = signal_name(sig).unwrap_or("EXIT").to_string();
            match action {
                "-" => {
                    self.traps.remove(&name);
                    self.ignored.remove(&name);
                }
                "" => {
                    self.traps.remove(&name);
                    self.ignored.insert(name.clone());
                    self.signals.subscribe(sig);
                }
                _ => {
                    self.traps.insert(name.clone(), action.to_string());
                    self.ignored.remove(&name);
                    self.signals.subscribe(sig);
                }
            }
            debug!(signal = %name, action, "trap updated");
        }
        Ok(status)
    }
}

fn quote_action(action: &str) -> String {
    if action.is_empty() {
        "''".to_string()
    } else {
        let quoted = quote_value(action);
        if quoted.starts_with('\'') {
            quoted
        } else {
            format!("'{quoted}'")
        }
    }
}
