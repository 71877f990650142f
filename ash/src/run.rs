//! Process entry point shared by the binary and embedders

use crate::error::{AshError, EXIT_FAILURE, EXIT_USAGE};
use crate::eval::{ExecContext, Input};
use crate::shell::{Shell, ShellBuilder};
use ash_config::AshConfig;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Run ash with command-line style `args` against `ctx`, returning the
/// process exit code.
///
/// - no args: the whole of standard input is the script
/// - `-c script [name [args...]]`: run `script` with `$0` and positional parameters
/// - `file [args...]`: run a readable file with positional parameters
/// - anything else: the arguments joined with spaces form one command line
pub async fn run(args: &[String], ctx: &mut ExecContext) -> i32 {
    let config = ash_config::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load configuration");
        AshConfig::default()
    });
    let mut shell = ShellBuilder::new().config(config).os_signals(true).build();
    shell.install_signal_handlers();
    run_with(&mut shell, args, ctx).await
}

/// [`run`] on a caller-supplied shell.
pub async fn run_with(shell: &mut Shell, args: &[String], ctx: &mut ExecContext) -> i32 {
    let script = match script_source(shell, args, ctx).await {
        Ok(script) => script,
        Err(status) => return status,
    };
    let status = match shell.execute_with(&script, ctx).await {
        Ok(status) => status,
        Err(e) => shell.report_error(&e, ctx),
    };
    let status = shell.run_exit_trap(status, ctx).await;
    ctx.flush().await;
    status
}

/// Parse the script selected by `args` and print its tree as JSON instead of
/// running it. Returns 2 on a syntax error.
pub async fn dump_ast(args: &[String], ctx: &mut ExecContext) -> i32 {
    let mut shell = ShellBuilder::new().inherit_env(false).build();
    let script = match script_source(&mut shell, args, ctx).await {
        Ok(script) => script,
        Err(status) => return status,
    };
    let status = match crate::parser::parse(&script).and_then(|tree| {
        serde_json::to_string_pretty(&tree).map_err(|e| AshError::Runtime(format!("dump-ast: {e}")))
    }) {
        Ok(json) => match ctx.stdout.writeln(&json) {
            Ok(()) => 0,
            Err(e) => shell.report_error(&AshError::Io(e), ctx),
        },
        Err(e) => shell.report_error(&e, ctx),
    };
    ctx.flush().await;
    status
}

async fn script_source(shell: &mut Shell, args: &[String], ctx: &mut ExecContext) -> Result<String, i32> {
    match args {
        [] => {
            debug!("reading script from standard input");
            read_input(ctx).await.map_err(|e| {
                ctx.write_err(&format!("ash: {e}"));
                EXIT_FAILURE
            })
        }
        [flag] if flag == "-c" => {
            ctx.write_err("ash: -c: option requires an argument");
            Err(EXIT_USAGE)
        }
        [flag, script, rest @ ..] if flag == "-c" => {
            if let Some((name, params)) = rest.split_first() {
                shell.set_script_name(name);
                shell.set_positional(params.to_vec());
            }
            Ok(script.clone())
        }
        [first, rest @ ..] => {
            if Path::new(first).is_file() {
                match tokio::fs::read_to_string(first).await {
                    Ok(source) => {
                        debug!(script = %first, "running script file");
                        shell.set_script_name(first);
                        shell.set_positional(rest.to_vec());
                        return Ok(source);
                    }
                    Err(e) => debug!(script = %first, error = %e, "script not readable"),
                }
            }
            Ok(args.join(" "))
        }
    }
}

async fn read_input(ctx: &mut ExecContext) -> std::io::Result<String> {
    let mut source = String::new();
    match &mut ctx.stdin {
        Input::Inherit => {
            tokio::io::stdin().read_to_string(&mut source).await?;
        }
        Input::Reader(reader) => {
            reader.read_to_string(&mut source).await?;
        }
        Input::Null => {}
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Output;
    use std::sync::{Arc, Mutex};

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| (*a).to_string()).collect()
    }

    async fn run_args(args: &[&str], stdin: Input) -> (i32, String, String) {
        let mut shell = ShellBuilder::new().inherit_env(false).build();
        let (stdout, out): (Output, Arc<Mutex<Vec<u8>>>) = Output::buffer();
        let (stderr, err) = Output::buffer();
        let mut ctx = ExecContext::new(stdin, stdout, stderr);
        let status = run_with(&mut shell, &strings(args), &mut ctx).await;
        let text = |buf: &Arc<Mutex<Vec<u8>>>| String::from_utf8_lossy(&buf.lock().unwrap()).into_owned();
        (status, text(&out), text(&err))
    }

    #[tokio::test]
    async fn test_script_from_stdin() {
        let (status, out, _) = run_args(&[], Input::from_bytes("echo from stdin\nexit 3\n")).await;
        assert_eq!(status, 3);
        assert_eq!(out, "from stdin\n");
    }

    #[tokio::test]
    async fn test_dash_c_sets_name_and_positional() {
        let (status, out, _) = run_args(&["-c", "echo $0 $1 $#", "myname", "first", "second"], Input::Null).await;
        assert_eq!(status, 0);
        assert_eq!(out, "myname first 2\n");
    }

    #[tokio::test]
    async fn test_dash_c_without_script() {
        let (status, out, err) = run_args(&["-c"], Input::Null).await;
        assert_eq!(status, 2);
        assert_eq!(out, "");
        assert_eq!(err, "ash: -c: option requires an argument\n");
    }

    #[tokio::test]
    async fn test_script_file_with_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greet.ash");
        std::fs::write(&path, "echo hello $1\n").unwrap();
        let path = path.display().to_string();
        let (status, out, _) = run_args(&[&path, "world"], Input::Null).await;
        assert_eq!(status, 0);
        assert_eq!(out, "hello world\n");
    }

    #[tokio::test]
    async fn test_joined_arguments() {
        let (status, out, _) = run_args(&["echo", "joined", "line"], Input::Null).await;
        assert_eq!(status, 0);
        assert_eq!(out, "joined line\n");
    }

    #[tokio::test]
    async fn test_dump_ast() {
        let (stdout, out) = Output::buffer();
        let (stderr, _) = Output::buffer();
        let mut ctx = ExecContext::new(Input::Null, stdout, stderr);
        let status = dump_ast(&strings(&["-c", "if true"]), &mut ctx).await;
        assert_eq!(status, 0);
        let json = String::from_utf8_lossy(&out.lock().unwrap()).into_owned();
        assert!(json.contains("\"Unparsed\""));
        assert!(!json.contains("\"Compound\""));
    }

    #[tokio::test]
    async fn test_dump_ast_syntax_error() {
        let (stdout, _) = Output::buffer();
        let (stderr, err) = Output::buffer();
        let mut ctx = ExecContext::new(Input::Null, stdout, stderr);
        let status = dump_ast(&strings(&["-c", "echo a; ;; b"]), &mut ctx).await;
        assert_eq!(status, 2);
        assert!(String::from_utf8_lossy(&err.lock().unwrap()).starts_with("ash: syntax error"));
    }

    #[tokio::test]
    async fn test_exit_trap_runs_at_end() {
        let (status, out, _) = run_args(&["-c", "trap 'echo cleanup' EXIT; echo work; exit 4"], Input::Null).await;
        assert_eq!(status, 4);
        assert_eq!(out, "work\ncleanup\n");
    }
}
