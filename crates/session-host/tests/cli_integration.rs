//! Integration tests for the emu-session CLI.

use anyhow as _;
use clap as _;
use parking_lot as _;
use session_core as _;
use tracing as _;
use tracing_subscriber as _;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_emu-session"))
}

fn write_bundle(dir: &Path, with_bios: bool) -> PathBuf {
    if with_bios {
        fs::write(dir.join("bbl64.bin"), [0u8; 32]).unwrap();
    }
    let description = dir.join("Machine.json");
    fs::write(
        &description,
        r#"{ "BIOS": "bbl64.bin", "KernelCommandLine": "console=hvc0", "MemorySize": 64 }"#,
    )
    .unwrap();
    description
}

fn run_with_stdin(args: &[&str], stdin: &[u8]) -> Output {
    let mut child = Command::new(binary_path())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run emu-session");
    // The child may exit before reading stdin when startup fails.
    let _ = child.stdin.take().expect("piped stdin").write_all(stdin);
    child.wait_with_output().expect("emu-session exits")
}

#[test]
fn render_prints_resolved_configuration() {
    let temp_dir = tempfile::tempdir().unwrap();
    let description = write_bundle(temp_dir.path(), false);

    let output = Command::new(binary_path())
        .args(["render", "--machine", description.to_str().unwrap()])
        .output()
        .expect("failed to run emu-session");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let bios = temp_dir.path().join("bbl64.bin");
    assert!(stdout.starts_with("{\n    version: 1,\n"));
    assert!(stdout.contains("    memory_size: 64,\n"));
    assert!(stdout.contains(&format!("    bios: \"{}\",\n", bios.display())));
    assert!(stdout.contains("    cmdline: \"console=hvc0\",\n"));
    assert!(stdout.ends_with("}\n"));
}

#[test]
fn render_honours_base_dir() {
    let temp_dir = tempfile::tempdir().unwrap();
    let description = write_bundle(temp_dir.path(), false);

    let output = Command::new(binary_path())
        .args([
            "render",
            "--machine",
            description.to_str().unwrap(),
            "--base-dir",
            "/srv/images",
        ])
        .output()
        .expect("failed to run emu-session");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("    bios: \"/srv/images/bbl64.bin\",\n"));
}

#[test]
fn check_accepts_complete_bundle() {
    let temp_dir = tempfile::tempdir().unwrap();
    let description = write_bundle(temp_dir.path(), true);

    let output = Command::new(binary_path())
        .args(["check", "--machine", description.to_str().unwrap()])
        .output()
        .expect("failed to run emu-session");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        format!("ok: {}\n", description.display())
    );
}

#[test]
fn check_reports_missing_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    let description = write_bundle(temp_dir.path(), false);

    let output = Command::new(binary_path())
        .args(["check", "--machine", description.to_str().unwrap()])
        .output()
        .expect("failed to run emu-session");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("image `bios` not found"));
}

#[test]
fn check_reports_malformed_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = temp_dir.path().join("temu.cfg");
    fs::write(&config, "{\n    version: 1 2,\n    machine: \"riscv64\",\n}\n").unwrap();

    let output = Command::new(binary_path())
        .args(["check", "--config", config.to_str().unwrap()])
        .output()
        .expect("failed to run emu-session");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("malformed configuration at line 2"));
}

#[test]
fn run_echoes_stdin_through_loopback_console() {
    let temp_dir = tempfile::tempdir().unwrap();
    let description = write_bundle(temp_dir.path(), true);

    let output = run_with_stdin(
        &["run", "--machine", description.to_str().unwrap()],
        b"uname -a\nexit\n",
    );

    assert!(output.status.success());
    assert_eq!(output.stdout, b"uname -a\nexit\n");
}

#[test]
fn run_with_config_file_and_empty_stdin_exits_cleanly() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("bbl64.bin"), [0u8; 32]).unwrap();
    let config = temp_dir.path().join("temu.cfg");
    fs::write(
        &config,
        "{\n    version: 1,\n    machine: \"riscv64\",\n    memory_size: 128,\n    bios: \"bbl64.bin\",\n}\n",
    )
    .unwrap();

    let output = run_with_stdin(&["run", "--config", config.to_str().unwrap()], b"");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn run_fails_for_missing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = temp_dir.path().join("absent.cfg");

    let output = run_with_stdin(&["run", "--config", config.to_str().unwrap()], b"ignored");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("starting session"));
}
