//! Drive ash from a Rust host: seed state, add builtins, run scripts and
//! inspect what they printed.
//!
//! Run:  cargo run -p ash --example embed

use ash::{AshError, AshResult, CapturedOutput, Shell, ShellBuilder};

fn show(label: &str, out: &CapturedOutput) {
    println!("-- {label} (exit {})", out.exit_code);
    for line in out.stdout_str().lines() {
        println!("   out| {line}");
    }
    for line in out.stderr_str().lines() {
        println!("   err| {line}");
    }
}

#[tokio::main]
async fn main() -> AshResult<()> {
    let mut shell = ShellBuilder::new()
        .env("APP_NAME", "embed-demo")
        .var("RETRIES", "3")
        .loop_limit(1_000)
        .builtin("remember", |args: &[String], shell: &mut Shell| {
            let value = args.first().map_or("nothing", String::as_str);
            shell.set_var("REMEMBERED", value);
            Ok(0)
        })
        .build();

    let out = shell.execute_capture("remember $APP_NAME; echo stored").await?;
    show("builder builtin", &out);
    println!("REMEMBERED = {:?}", shell.get_var("REMEMBERED"));

    let out = shell
        .execute_capture("i=0; while [ $i -lt $RETRIES ]; do i=$((i+1)); echo \"attempt $i\"; done")
        .await?;
    show("loop over a seeded variable", &out);

    let out = shell
        .execute_capture("printf 'apple\\nbanana\\napricot\\n' | grep ap | wc -l")
        .await?;
    show("pipeline", &out);

    let out = shell
        .execute_capture("sleep 1 & echo \"started $!\"; wait %%; echo \"job finished: $?\"")
        .await?;
    show("background job", &out);

    let out = shell
        .execute_capture("trap 'echo caught USR1' USR1; kill -USR1 $$; echo continuing")
        .await?;
    show("trap on a self-directed signal", &out);

    shell.register_builtin("deny", |args: &[String], _shell: &mut Shell| {
        Err(AshError::Runtime(format!("deny: refusing {}", args.join(" "))))
    });
    let out = shell.execute_capture("deny rm -rf; echo \"status $?\"").await?;
    show("host error surfaces as a status", &out);

    let out = shell.execute_capture("if true").await?;
    show("incomplete if runs as a command", &out);

    let status = shell.execute("exit 0").await?;
    println!("final status: {status}");
    Ok(())
}
