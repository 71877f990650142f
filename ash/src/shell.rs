//! Shell state and execution engine

use crate::error::AshResult;
use crate::eval::jobs::JobTable;
use crate::eval::{default_builtins, Builtin, BuiltinFn, BuiltinTable, ExecContext, Input, Output, SignalQueue};
use ash_config::AshConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default cap on `while`/`until` iterations.
pub const DEFAULT_LOOP_LIMIT: usize = 100_000;
/// Default deadline for an external pipeline stage.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for a single write into a pipeline pipe.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Feature flag exported to every child process.
pub const FEATURE_FLAG: (&str, &str) = ("ASH_FEATURES", "jobs,traps,pipefail");

/// Pending non-local control flow plus the last statuses.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    pub break_depth: usize,
    pub continue_depth: usize,
    pub return_flag: bool,
    pub return_code: i32,
    pub exit_flag: bool,
    pub exit_code: i32,
    pub last_status: i32,
    pub last_bg_pid: Option<u32>,
}

impl ControlFlags {
    /// Whether the statement loop should stop and unwind.
    pub fn unwinding(&self) -> bool {
        self.exit_flag || self.return_flag || self.break_depth > 0 || self.continue_depth > 0
    }
}

/// Options toggled by `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellOptions {
    pub errexit: bool,
    pub xtrace: bool,
    pub nounset: bool,
    pub noexec: bool,
    pub physical: bool,
    pub pipefail: bool,
    pub restricted: bool,
}

impl ShellOptions {
    /// Single-letter flags for `$-`.
    pub fn flags(&self) -> String {
        [
            (self.errexit, 'e'),
            (self.noexec, 'n'),
            (self.physical, 'P'),
            (self.restricted, 'r'),
            (self.nounset, 'u'),
            (self.xtrace, 'x'),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, c)| *c)
        .collect()
    }
}

/// Operational safety limits, read from `ASH_*` variables.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum `while`/`until` iterations; 0 disables the cap.
    pub loop_limit: usize,
    pub stage_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            loop_limit: DEFAULT_LOOP_LIMIT,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl Limits {
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut limits = Self::default();
        if let Some(n) = vars.get("ASH_LOOP_LIMIT").and_then(|v| v.trim().parse().ok()) {
            limits.loop_limit = n;
        }
        if let Some(ms) = vars.get("ASH_STAGE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            limits.stage_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = vars.get("ASH_WRITE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            limits.write_timeout = Duration::from_millis(ms);
        }
        limits
    }
}

/// Captured result of [`Shell::execute_capture`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Interpreter state. Owned by one evaluation task; concurrent work
/// (pipeline stages, background jobs) runs on clones and reports back only
/// through channels.
pub struct Shell {
    pub(crate) vars: HashMap<String, String>,
    pub(crate) exported: HashSet<String>,
    pub(crate) functions: HashMap<String, String>,
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) traps: BTreeMap<String, String>,
    pub(crate) ignored: BTreeSet<String>,
    pub(crate) positional: Vec<String>,
    pub(crate) script_name: String,
    pub(crate) flags: ControlFlags,
    pub(crate) options: ShellOptions,
    pub(crate) limits: Limits,
    pub(crate) jobs: JobTable,
    pub(crate) signals: SignalQueue,
    pub(crate) builtins: Arc<BuiltinTable>,
    /// Saved outer values for `local`, one frame per active function call.
    pub(crate) local_frames: Vec<HashMap<String, Option<String>>>,
    /// `hash` cache: command name to resolved path and hit count.
    pub(crate) hashed: HashMap<String, (PathBuf, usize)>,
    /// Logical working directory; the process directory is never changed.
    pub(crate) cwd: PathBuf,
    pub(crate) pid: u32,
    pub(crate) subst_depth: usize,
    pub(crate) loop_depth: usize,
    pub(crate) function_depth: usize,
    pub(crate) source_depth: usize,
    pub(crate) condition_depth: usize,
    pub(crate) alias_active: bool,
    /// Status of the last command substitution in the word being expanded.
    pub(crate) subst_status: Option<i32>,
    /// `getopts` position: the OPTIND it last wrote and the offset inside
    /// the current option cluster.
    pub(crate) getopts_state: (usize, usize),
}

impl Shell {
    /// A shell seeded from the process environment.
    pub fn new() -> Self {
        ShellBuilder::new().build()
    }

    /// Execute a command string on the process's standard streams.
    pub async fn execute(&mut self, input: &str) -> AshResult<i32> {
        let mut ctx = ExecContext::default();
        self.execute_with(input, &mut ctx).await
    }

    /// Execute a command string against explicit streams.
    pub async fn execute_with(&mut self, input: &str, ctx: &mut ExecContext) -> AshResult<i32> {
        self.flags = ControlFlags {
            last_status: self.flags.last_status,
            last_bg_pid: self.flags.last_bg_pid,
            ..ControlFlags::default()
        };

        let status = self.execute_source(input, ctx).await?;
        ctx.flush().await;

        if self.flags.exit_flag {
            self.flags.last_status = self.flags.exit_code;
            return Ok(self.flags.exit_code);
        }
        Ok(status)
    }

    /// Execute a command string and capture its exit code, stdout and stderr.
    pub async fn execute_capture(&mut self, input: &str) -> AshResult<CapturedOutput> {
        let (stdout, out_buf) = Output::buffer();
        let (stderr, err_buf) = Output::buffer();
        let mut ctx = ExecContext::new(Input::Null, stdout, stderr);

        let exit_code = self.execute_with(input, &mut ctx).await?;
        drop(ctx);

        let take = |buf: &std::sync::Mutex<Vec<u8>>| {
            buf.lock().map(|mut b| std::mem::take(&mut *b)).unwrap_or_default()
        };
        Ok(CapturedOutput {
            exit_code,
            stdout: take(&out_buf),
            stderr: take(&err_buf),
        })
    }

    /// Set a shell variable, keeping its export flag.
    pub fn set_var(&mut self, name: &str, value: &str) {
        if name == "PATH" {
            self.hashed.clear();
        }
        self.vars.insert(name.to_string(), value.to_string());
    }

    /// Get a shell variable
    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn unset_var(&mut self, name: &str) {
        if name == "PATH" {
            self.hashed.clear();
        }
        self.vars.remove(name);
        self.exported.remove(name);
    }

    /// Mark a variable for export to child processes.
    pub fn export_var(&mut self, name: &str) {
        self.exported.insert(name.to_string());
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exported.contains(name)
    }

    /// Define a function from its body source.
    pub fn define_function(&mut self, name: &str, body: &str) {
        self.functions.insert(name.to_string(), body.to_string());
    }

    /// Get a function definition
    pub fn get_function(&self, name: &str) -> Option<&str> {
        self.functions.get(name).map(String::as_str)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    pub fn set_script_name(&mut self, name: &str) {
        self.script_name = name.to_string();
    }

    pub fn last_status(&self) -> i32 {
        self.flags.last_status
    }

    pub fn options(&self) -> ShellOptions {
        self.options
    }

    pub fn cwd(&self) -> &std::path::Path {
        &self.cwd
    }

    /// Register a host builtin at runtime.
    pub fn register_builtin<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[String], &mut Shell) -> AshResult<i32> + Send + Sync + 'static,
    {
        let handler: BuiltinFn = Arc::new(handler);
        Arc::make_mut(&mut self.builtins).insert(name.to_string(), Builtin::Host(handler));
    }

    /// Sender feeding this shell's signal queue, for delivering signals
    /// without involving the OS.
    pub fn signal_sender(&self) -> mpsc::Sender<i32> {
        self.signals.sender()
    }

    /// Subscribe to every handled OS signal.
    pub fn install_signal_handlers(&mut self) {
        self.signals.subscribe_all();
    }

    /// Name/value pairs exported to child processes.
    pub(crate) fn child_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .exported
            .iter()
            .filter_map(|name| self.vars.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        env.push((FEATURE_FLAG.0.to_string(), FEATURE_FLAG.1.to_string()));
        env
    }

    /// A copy for subshells, pipeline stages and background jobs: variables,
    /// functions and aliases are inherited; traps, ignored signals, the
    /// signal queue and the job table start fresh.
    pub fn clone_for_subshell(&self) -> Self {
        Self {
            vars: self.vars.clone(),
            exported: self.exported.clone(),
            functions: self.functions.clone(),
            aliases: self.aliases.clone(),
            traps: BTreeMap::new(),
            ignored: BTreeSet::new(),
            positional: self.positional.clone(),
            script_name: self.script_name.clone(),
            flags: ControlFlags {
                last_status: self.flags.last_status,
                last_bg_pid: self.flags.last_bg_pid,
                ..ControlFlags::default()
            },
            options: self.options,
            limits: self.limits,
            jobs: JobTable::default(),
            signals: SignalQueue::new(false),
            builtins: self.builtins.clone(),
            local_frames: Vec::new(),
            hashed: self.hashed.clone(),
            cwd: self.cwd.clone(),
            pid: self.pid,
            subst_depth: self.subst_depth,
            loop_depth: 0,
            function_depth: self.function_depth,
            source_depth: self.source_depth,
            condition_depth: self.condition_depth,
            alias_active: false,
            subst_status: None,
            getopts_state: self.getopts_state,
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a [`Shell`] before use.
pub struct ShellBuilder {
    env: Vec<(String, String)>,
    vars: Vec<(String, String)>,
    inherit_env: bool,
    config: Option<AshConfig>,
    builtins: Vec<(String, BuiltinFn)>,
    os_signals: bool,
    loop_limit: Option<usize>,
    cwd: Option<PathBuf>,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuilder {
    pub fn new() -> Self {
        Self {
            env: Vec::new(),
            vars: Vec::new(),
            inherit_env: true,
            config: None,
            builtins: Vec::new(),
            os_signals: false,
            loop_limit: None,
            cwd: None,
        }
    }

    /// Set an exported variable.
    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push((name.to_string(), value.to_string()));
        self
    }

    /// Set a plain (unexported) shell variable.
    pub fn var(mut self, name: &str, value: &str) -> Self {
        self.vars.push((name.to_string(), value.to_string()));
        self
    }

    /// Seed variables from the process environment (default: on).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Merge configuration entries; they never override inherited variables.
    pub fn config(mut self, config: AshConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn builtin<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&[String], &mut Shell) -> AshResult<i32> + Send + Sync + 'static,
    {
        self.builtins.push((name.to_string(), Arc::new(handler)));
        self
    }

    /// Forward OS signals into the shell once handlers are installed.
    pub fn os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    pub fn loop_limit(mut self, limit: usize) -> Self {
        self.loop_limit = Some(limit);
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn build(self) -> Shell {
        let mut vars = HashMap::new();
        let mut exported = HashSet::new();

        if self.inherit_env {
            for (name, value) in std::env::vars() {
                exported.insert(name.clone());
                vars.insert(name, value);
            }
        }
        if let Some(config) = &self.config {
            for (name, value) in config.iter() {
                if !vars.contains_key(name) {
                    vars.insert(name.to_string(), value.to_string());
                    exported.insert(name.to_string());
                }
            }
        }
        for (name, value) in self.env {
            exported.insert(name.clone());
            vars.insert(name, value);
        }
        for (name, value) in self.vars {
            vars.insert(name, value);
        }

        let cwd = self
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        vars.insert("PWD".to_string(), cwd.display().to_string());
        vars.entry("IFS".to_string()).or_insert_with(|| " \t\n".to_string());

        let mut limits = Limits::from_vars(&vars);
        if let Some(limit) = self.loop_limit {
            limits.loop_limit = limit;
        }

        let mut builtins = default_builtins();
        for (name, handler) in self.builtins {
            builtins.insert(name, Builtin::Host(handler));
        }

        Shell {
            vars,
            exported,
            functions: HashMap::new(),
            aliases: HashMap::new(),
            traps: BTreeMap::new(),
            ignored: BTreeSet::new(),
            positional: Vec::new(),
            script_name: "ash".to_string(),
            flags: ControlFlags::default(),
            options: ShellOptions::default(),
            limits,
            jobs: JobTable::default(),
            signals: SignalQueue::new(self.os_signals),
            builtins: Arc::new(builtins),
            local_frames: Vec::new(),
            hashed: HashMap::new(),
            cwd,
            pid: std::process::id(),
            subst_depth: 0,
            loop_depth: 0,
            function_depth: 0,
            source_depth: 0,
            condition_depth: 0,
            alias_active: false,
            subst_status: None,
            getopts_state: (1, 1),
        }
    }
}
