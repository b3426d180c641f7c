//! Runs the `sf` binary on expressions and script files and checks what it
//! prints.

use std::io::Write;
use std::process::{Command, Output};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Run the binary with no config file.
fn sf(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sf"))
        .args(args)
        .arg("-f")
        .env_remove("SF_LOG")
        .output()
        .expect("failed to run sf")
}

fn stdout_lines(out: &Output) -> Vec<String> {
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

fn script(src: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(src.as_bytes()).unwrap();
    file
}

// ── Expressions ───────────────────────────────────────────────────────────────

#[test]
fn expression_result_is_printed() {
    let out = sf(&["-e", "2*3+4"]);
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), ["14"]);
}

#[test]
fn typed_expression_result() {
    let out = sf(&["-te", "6*7"]);
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), ["(INTEGER,\"42\")"]);
}

#[test]
fn bad_expression_fails() {
    let out = sf(&["-e", "1/0"]);
    assert!(!out.status.success());
    assert!(stdout_lines(&out).is_empty());
}

#[test]
fn bad_option_prints_usage() {
    let out = sf(&["-z"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage: sf"));
}

// ── Scripts ───────────────────────────────────────────────────────────────────

#[test]
fn script_runs_init_then_main() {
    let file = script("int n;\nprint(\"init\");\nreturn;\n:main;\nn = 6*7;\nprint(\"n =\", n);\nreturn;\n");
    let out = sf(&[file.path().to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_lines(&out), ["init", "n = 42"]);
}

#[test]
fn compile_error_fails() {
    let file = script("{ int n;\nn = 1;\n");
    let out = sf(&[file.path().to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn runtime_error_fails() {
    let file = script(":main;\nprint(1/0);\nreturn;\n");
    let out = sf(&[file.path().to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn missing_script_fails() {
    let out = sf(&["/nonexistent/script.sf"]);
    assert!(!out.status.success());
}
