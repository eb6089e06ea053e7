//! A program whose only profiler setup is linking `tickprof-autostart`.

use std::path::Path;
use std::process::{Command, Output};

use tickprof::trace::TraceFile;

fn run_demo(output: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_autostart-demo"))
        .args(args)
        .env("TICKPROF_OUTPUT", output)
        .env("TICKPROF_TICK_SOURCE", "manual")
        .env("TICKPROF_STOP_SIGNAL", "none")
        .output()
        .expect("Failed to run autostart-demo")
}

#[test]
fn test_trace_finalized_at_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("default.bin");

    let out = run_demo(&path, &["0x1000", "0x2000", "0x3000"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let trace = TraceFile::open(&path).expect("Trace was not finalized");
    let samples: Vec<u64> = trace.samples.iter().map(|a| a.0).collect();
    assert_eq!(samples, vec![0x1000, 0x2000, 0x3000]);

    let maps = String::from_utf8_lossy(trace.maps.as_bytes());
    assert!(maps.contains("autostart-demo"), "{maps}");
}

#[test]
fn test_idle_program_still_gets_empty_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idle.bin");

    let out = run_demo(&path, &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let trace = TraceFile::open(&path).unwrap();
    assert!(trace.samples.is_empty());
    assert!(!trace.maps.is_empty());
}

#[test]
fn test_start_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("default.bin");

    let out = run_demo(&path, &[]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("failed to start default session"), "{stderr}");
    assert!(stderr.contains("no default session"), "{stderr}");
    assert_eq!(out.status.code(), Some(1));
    assert!(!path.exists());
}
