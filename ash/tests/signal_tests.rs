//! Traps driven by real OS signals sent to this test process
//!
//! Signal dispositions are process-wide, so these tests live in their own
//! binary and take turns through `SERIAL`.

use ash::{ExecContext, Input, Output, Shell, ShellBuilder};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

static SERIAL: Mutex<()> = Mutex::const_new(());

fn shell() -> Shell {
    let mut sh = ShellBuilder::new()
        .inherit_env(false)
        .env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .os_signals(true)
        .build();
    sh.install_signal_handlers();
    sh
}

#[allow(unsafe_code)]
fn raise_later(sig: i32, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let pid = libc::pid_t::try_from(std::process::id()).unwrap();
        // SAFETY: kill has no memory-safety preconditions.
        unsafe {
            libc::kill(pid, sig);
        }
    });
}

#[tokio::test]
async fn test_trap_fires_during_external_command() {
    let _serial = SERIAL.lock().await;
    let mut sh = shell();
    raise_later(libc::SIGUSR1, Duration::from_millis(300));

    let out = sh
        .execute_capture("trap 'echo trapped' USR1; sh -c 'sleep 1; echo child'; echo after $?")
        .await
        .unwrap();
    assert_eq!(out.stdout_str(), "trapped\nchild\nafter 0\n");
}

#[tokio::test]
async fn test_trap_interrupts_wait() {
    let _serial = SERIAL.lock().await;
    let mut sh = shell();
    raise_later(libc::SIGUSR1, Duration::from_millis(300));

    let started = Instant::now();
    let out = sh
        .execute_capture("trap 'echo trapped' USR1; sleep 3 & wait; echo status $?")
        .await
        .unwrap();
    assert_eq!(out.stdout_str(), "trapped\nstatus 138\n");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_trap_interrupts_read() {
    let _serial = SERIAL.lock().await;
    let mut sh = shell();
    let (_writer, reader) = tokio::io::duplex(16);
    let (stdout, buf) = Output::buffer();
    let mut ctx = ExecContext::new(Input::reader(reader), stdout, Output::Closed);
    raise_later(libc::SIGUSR1, Duration::from_millis(300));

    let status = sh
        .execute_with("trap 'echo caught' USR1; read line; echo status $?", &mut ctx)
        .await
        .unwrap();
    assert_eq!(status, 0);
    assert_eq!(String::from_utf8_lossy(&buf.lock().unwrap()), "caught\nstatus 138\n");
}
