//! Signal queue, trap dispatch and default signal actions
//!
//! OS signals are never acted on asynchronously. Forwarder tasks push the
//! signal number into a bounded queue, and the evaluator drains that queue
//! at checkpoints: between statements and inside blocking waits.

use super::{BoxFuture, ExecContext};
use crate::shell::Shell;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const QUEUE_CAPACITY: usize = 32;

/// Signals the shell subscribes to and lets scripts trap.
pub const HANDLED_SIGNALS: &[(&str, i32)] = &[
    ("HUP", libc::SIGHUP),
    ("INT", libc::SIGINT),
    ("QUIT", libc::SIGQUIT),
    ("TERM", libc::SIGTERM),
    ("USR1", libc::SIGUSR1),
    ("USR2", libc::SIGUSR2),
    ("CHLD", libc::SIGCHLD),
    ("ALRM", libc::SIGALRM),
    ("PIPE", libc::SIGPIPE),
];

/// Signals `kill` can send but scripts cannot trap.
const OTHER_SIGNALS: &[(&str, i32)] = &[
    ("KILL", libc::SIGKILL),
    ("STOP", libc::SIGSTOP),
    ("CONT", libc::SIGCONT),
    ("TSTP", libc::SIGTSTP),
];

/// Parse a signal given as a number, a name, or a name with a `SIG` prefix.
/// `EXIT` is signal 0.
pub fn signal_number(spec: &str) -> Option<i32> {
    let spec = spec.trim();
    if let Ok(n) = spec.parse::<i32>() {
        return (0..=64).contains(&n).then_some(n);
    }
    let upper = spec.to_ascii_uppercase();
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    if name == "EXIT" {
        return Some(0);
    }
    HANDLED_SIGNALS
        .iter()
        .chain(OTHER_SIGNALS)
        .find(|(n, _)| *n == name)
        .map(|(_, num)| *num)
}

/// Name of a signal without the `SIG` prefix; 0 is `EXIT`.
pub fn signal_name(sig: i32) -> Option<&'static str> {
    if sig == 0 {
        return Some("EXIT");
    }
    HANDLED_SIGNALS
        .iter()
        .chain(OTHER_SIGNALS)
        .find(|(_, num)| *num == sig)
        .map(|(name, _)| *name)
}

pub(crate) fn is_trappable(sig: i32) -> bool {
    sig == 0 || HANDLED_SIGNALS.iter().any(|(_, n)| *n == sig)
}

/// Bounded queue of pending signal numbers.
pub struct SignalQueue {
    tx: mpsc::Sender<i32>,
    rx: mpsc::Receiver<i32>,
    subscribed: HashSet<i32>,
    os_enabled: bool,
    forwarders: Vec<JoinHandle<()>>,
}

impl SignalQueue {
    /// A queue that forwards OS signals only when `os_enabled` is set;
    /// otherwise signals arrive solely through [`SignalQueue::sender`].
    pub fn new(os_enabled: bool) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            subscribed: HashSet::new(),
            os_enabled,
            forwarders: Vec::new(),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<i32> {
        self.tx.clone()
    }

    pub fn try_recv(&mut self) -> Option<i32> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next signal. Never resolves to `None` while the queue
    /// holds its own sender.
    pub async fn recv(&mut self) -> Option<i32> {
        self.rx.recv().await
    }

    /// Queue a signal directly, dropping it if the queue is full.
    pub fn deliver(&self, sig: i32) {
        if self.tx.try_send(sig).is_err() {
            warn!(signal = sig, "signal queue full, dropping signal");
        }
    }

    /// Start forwarding `sig` from the OS into the queue.
    pub fn subscribe(&mut self, sig: i32) {
        if !self.os_enabled || sig == 0 || !self.subscribed.insert(sig) {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            self.subscribed.remove(&sig);
            return;
        }
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::from_raw(sig)) {
            Ok(mut stream) => {
                let tx = self.tx.clone();
                self.forwarders.push(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        trace!(signal = sig, "signal received");
                        if tx.send(sig).await.is_err() {
                            break;
                        }
                    }
                }));
                debug!(signal = sig, "subscribed to signal");
            }
            Err(e) => {
                self.subscribed.remove(&sig);
                warn!(signal = sig, error = %e, "failed to subscribe to signal");
            }
        }
    }

    pub fn subscribe_all(&mut self) {
        for (_, sig) in HANDLED_SIGNALS {
            self.subscribe(*sig);
        }
    }
}

impl Drop for SignalQueue {
    fn drop(&mut self) {
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
    }
}

impl Shell {
    /// Checkpoint: act on every signal queued so far.
    pub(crate) async fn process_signals(&mut self, ctx: &mut ExecContext) {
        while let Some(sig) = self.signals.try_recv() {
            self.handle_signal(sig, ctx).await;
        }
    }

    /// Run the trap for `sig`, or its default action. Returns true when the
    /// signal interrupted the script: a trap ran or the shell is exiting.
    pub(crate) fn handle_signal<'a>(&'a mut self, sig: i32, ctx: &'a mut ExecContext) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let name = signal_name(sig).map(str::to_string).unwrap_or_else(|| sig.to_string());
            if self.ignored.contains(&name) {
                trace!(signal = %name, "signal ignored");
                return false;
            }
            if let Some(action) = self.traps.get(&name).cloned() {
                debug!(signal = %name, "running trap");
                self.run_trap(&action, ctx).await;
                return true;
            }
            match sig {
                libc::SIGCHLD => return false,
                libc::SIGHUP => ctx.write_err("Hangup"),
                libc::SIGUSR2 => ctx.write_err("User defined signal 2"),
                _ => {}
            }
            debug!(signal = %name, "untrapped signal, exiting");
            self.flags.exit_flag = true;
            self.flags.exit_code = 128 + sig;
            true
        })
    }

    /// Run trap source text without disturbing `$?` or pending control flow,
    /// unless the trap itself calls `exit`.
    async fn run_trap(&mut self, action: &str, ctx: &mut ExecContext) {
        let saved = self.flags.clone();
        self.flags.exit_flag = false;
        self.flags.return_flag = false;
        self.flags.break_depth = 0;
        self.flags.continue_depth = 0;

        let _ = self.execute_source(action, ctx).await;

        let exited = self.flags.exit_flag;
        let exit_code = self.flags.exit_code;
        let last_bg_pid = self.flags.last_bg_pid;
        self.flags = saved;
        self.flags.last_bg_pid = last_bg_pid;
        if exited {
            self.flags.exit_flag = true;
            self.flags.exit_code = exit_code;
        }
    }

    /// Run the `EXIT` trap once, returning the shell's final status.
    pub async fn run_exit_trap(&mut self, status: i32, ctx: &mut ExecContext) -> i32 {
        let Some(action) = self.traps.remove("EXIT") else {
            return status;
        };
        self.flags.exit_flag = false;
        self.flags.last_status = status;
        let _ = self.execute_source(&action, ctx).await;
        ctx.flush().await;
        if self.flags.exit_flag {
            self.flags.exit_code
        } else {
            status
        }
    }
}
