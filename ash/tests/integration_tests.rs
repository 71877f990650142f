//! Integration tests for the ash binary
//!
//! This test harness:
//! 1. Discovers all .ash test scripts
//! 2. Runs each script with the built `ash` binary in a scratch directory
//! 3. Compares stdout (and the exit status, if recorded) with the expected .out file
//! 4. Reports differences

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Wildcard accepted anywhere in an expected line, matching any text.
const WILDCARD: &str = "<*>";

/// Prefix of the last expected line carrying the script's exit status.
const STATUS_MARKER: &str = "# status: ";

/// Discover all .ash test scripts
fn discover_test_scripts() -> Vec<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let scripts_dir = manifest_dir.join("tests/integration/scripts");

    if !scripts_dir.exists() {
        return Vec::new();
    }

    let mut scripts = Vec::new();
    if let Ok(entries) = fs::read_dir(&scripts_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "ash") {
                scripts.push(path);
            }
        }
    }

    scripts.sort();
    scripts
}

/// Split an expected file into its stdout text and optional status line.
fn split_expected(expected: &str) -> (String, Option<i32>) {
    let mut lines: Vec<&str> = expected.lines().collect();
    let status = lines
        .last()
        .and_then(|line| line.strip_prefix(STATUS_MARKER))
        .and_then(|code| code.trim().parse().ok());
    if status.is_some() {
        lines.pop();
    }
    (lines.join("\n"), status)
}

/// Run a single test script and compare output
fn run_test_script(ash_bin: &Path, script_path: &Path) -> Result<TestResult, Box<dyn std::error::Error>> {
    let expected_path = script_path.with_extension("out");

    let expected = if expected_path.exists() {
        fs::read_to_string(&expected_path)?
    } else {
        return Ok(TestResult::Skipped {
            reason: format!("Missing expected output file: {expected_path:?}"),
        });
    };
    let (expected, expected_status) = split_expected(&expected);

    let scratch = tempfile::tempdir()?;
    let output = Command::new(ash_bin)
        .arg(script_path)
        .current_dir(scratch.path())
        .env_clear()
        .env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .env("HOME", scratch.path())
        .env("ASH_LOG", "off")
        .stdin(Stdio::null())
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    let status_ok = expected_status.map_or(true, |code| code == exit_code);
    if status_ok && matches_pattern(&expected, &stdout) {
        Ok(TestResult::Passed)
    } else {
        Ok(TestResult::Failed {
            expected,
            actual: stdout,
            stderr,
            exit_code,
        })
    }
}

#[derive(Debug)]
enum TestResult {
    Passed,
    Failed {
        expected: String,
        actual: String,
        stderr: String,
        exit_code: i32,
    },
    Skipped {
        reason: String,
    },
}

#[test]
fn integration_tests() {
    let scripts = discover_test_scripts();
    if scripts.is_empty() {
        println!("No test scripts found in tests/integration/scripts/");
        return;
    }

    let ash_bin = PathBuf::from(env!("CARGO_BIN_EXE_ash"));

    let mut passed = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for script in &scripts {
        let name = script.file_stem().unwrap().to_string_lossy();
        print!("Running {name}... ");

        match run_test_script(&ash_bin, script) {
            Ok(TestResult::Passed) => {
                println!("PASSED");
                passed += 1;
            }
            Ok(TestResult::Failed {
                expected,
                actual,
                stderr,
                exit_code,
            }) => {
                println!("FAILED");
                println!("  Exit code: {exit_code}");
                println!("  Expected:\n{}", indent(&expected, "    "));
                println!("  Actual:\n{}", indent(&actual, "    "));
                if !stderr.is_empty() {
                    println!("  Stderr:\n{}", indent(&stderr, "    "));
                }
                failed += 1;
            }
            Ok(TestResult::Skipped { reason }) => {
                println!("SKIPPED: {reason}");
                skipped += 1;
            }
            Err(e) => {
                println!("ERROR: {e}");
                failed += 1;
            }
        }
    }

    println!();
    println!("Results: {passed} passed, {failed} failed, {skipped} skipped");

    if failed > 0 {
        panic!("{failed} tests failed");
    }
}

fn indent(s: &str, prefix: &str) -> String {
    s.lines().map(|line| format!("{prefix}{line}")).collect::<Vec<_>>().join("\n")
}

/// Check if actual output matches the expected pattern line by line.
fn matches_pattern(expected: &str, actual: &str) -> bool {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();

    expected_lines.len() == actual_lines.len()
        && expected_lines.iter().zip(actual_lines.iter()).all(|(exp, act)| line_matches(exp, act))
}

/// Check if a single line matches, treating `<*>` as "any text".
fn line_matches(pattern: &str, actual: &str) -> bool {
    let parts: Vec<&str> = pattern.split(WILDCARD).collect();

    if parts.len() == 1 {
        return pattern == actual;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !actual.starts_with(first) || actual.len() < first.len() + last.len() || !actual.ends_with(last) {
        return false;
    }

    let mut pos = first.len();
    let end = actual.len() - last.len();
    for part in &parts[1..parts.len() - 1] {
        match actual[pos..end].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    true
}

#[test]
fn test_line_matches_wildcards() {
    assert!(line_matches("pid <*> started", "pid 4242 started"));
    assert!(line_matches("<*>", ""));
    assert!(line_matches("a<*>b<*>c", "a-x-b-y-c"));
    assert!(!line_matches("ab<*>ba", "aba"));
    assert!(!line_matches("exact", "exactly"));
}

#[test]
fn test_split_expected_status() {
    assert_eq!(split_expected("one\ntwo\n# status: 3\n"), ("one\ntwo".to_string(), Some(3)));
    assert_eq!(split_expected("one\n"), ("one".to_string(), None));
}
