//! Integration tests for the Unix process lifecycle
//!
//! These tests run real children (`cat`, `sh`, `sleep`) and verify that:
//! - Stdin bytes reach the child in order and output comes back over pipes
//! - Children run in their own process groups
//! - Cooperative termination, timeouts and forcible kills behave as documented
//! - Teardown is safe on partial state and never double-closes

#![cfg(unix)]
#![allow(unsafe_code)] // Required for libc calls in tests

use procpipe_core::{
    Pipe, PipeProvider, Process, ProcessConfig, ProcessError, Stage, StdStream, SystemPipes,
    WaitTimeout,
};
use std::io::Read;
use std::time::{Duration, Instant};

/// Launch `argv` on a freshly initialized instance
fn spawn(argv: &[&str]) -> Process {
    let mut process = Process::new();
    process.init().expect("Failed to create pipes");
    process.start(argv).expect("Failed to start process");
    process
}

/// Read stdout until end-of-stream
fn read_stdout_to_end(process: &mut Process) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = process.read_stdout(&mut buf).expect("read stdout");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Read stdout until `needle` has been seen
fn read_stdout_until(process: &mut Process, needle: &str) {
    let mut seen = String::new();
    let mut buf = [0u8; 64];
    while !seen.contains(needle) {
        let n = process.read_stdout(&mut buf).expect("read stdout");
        assert!(n > 0, "stdout closed before {:?} was printed", needle);
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
}

/// Shell snippet that prints "ready" once its SIGTERM handling is installed
fn looping_shell(trap: &str) -> String {
    format!("trap {} TERM; echo ready; while true; do sleep 0.05; done", trap)
}

#[test]
fn test_stdin_round_trip_preserves_order() {
    let mut process = spawn(&["cat"]);

    process.write_stdin_all(b"hello").unwrap();
    process.write_stdin_all(b"world").unwrap();
    process.close_stdin().unwrap();

    assert_eq!(read_stdout_to_end(&mut process), b"helloworld");
    let status = process.wait(WaitTimeout::Infinite).expect("wait");
    assert!(status.success());
    assert_eq!(process.stage(), Stage::Exited);
    process.teardown().unwrap();
}

#[test]
fn test_partial_write_reports_count() {
    let mut process = spawn(&["cat"]);
    let written = process.write_stdin(b"abc").unwrap();
    assert!(written > 0 && written <= 3);
    process.kill(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_stdout_and_stderr_are_separate() {
    let mut process = spawn(&["sh", "-c", "echo out; echo err 1>&2"]);

    let mut stderr = process.take_stderr().expect("stderr end");
    assert_eq!(stderr.stream(), StdStream::Stderr);
    let reader = std::thread::spawn(move || {
        let mut err = String::new();
        stderr.read_to_string(&mut err).unwrap();
        err
    });

    assert_eq!(read_stdout_to_end(&mut process), b"out\n");
    assert_eq!(reader.join().unwrap(), "err\n");

    // The taken end is no longer readable through the instance
    let mut buf = [0u8; 8];
    assert!(matches!(
        process.read_stderr(&mut buf),
        Err(ProcessError::Closed(StdStream::Stderr))
    ));
    process.wait(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_exit_code_is_reported() {
    let mut process = spawn(&["sh", "-c", "exit 3"]);
    let status = process.wait(WaitTimeout::Infinite).unwrap();
    assert_eq!(status.code(), Some(3));
    assert_eq!(process.exit_status(), Some(status));

    // Waiting again observes the same exit
    let again = process.wait(WaitTimeout::Immediate).unwrap();
    assert_eq!(again.code(), Some(3));
    process.teardown().unwrap();
}

#[test]
fn test_start_twice_is_rejected() {
    let mut process = spawn(&["sleep", "5"]);
    let pid = process.pid();

    match process.start(&["sleep", "5"]) {
        Err(ProcessError::InvalidStage { operation, stage }) => {
            assert_eq!(operation, "start");
            assert_eq!(stage, Stage::Running);
        }
        other => panic!("Expected InvalidStage, got {:?}", other),
    }
    assert_eq!(process.pid(), pid);

    process.kill(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_nonblocking_wait_on_running_process_times_out() {
    let mut process = spawn(&["sleep", "5"]);

    let err = process.wait(WaitTimeout::Immediate).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(process.stage(), Stage::Running);

    process.kill(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_bounded_wait_times_out_after_deadline() {
    let mut process = spawn(&["sleep", "5"]);

    let started = Instant::now();
    let err = process
        .wait(Duration::from_millis(150))
        .expect_err("sleep 5 should outlive the wait");
    assert!(matches!(err, ProcessError::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(150));

    process.kill(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_wait_with_unbounded_duration_returns_exit() {
    let mut process = spawn(&["sh", "-c", "sleep 0.1; exit 4"]);

    let status = process.wait(Duration::MAX).expect("wait");
    assert_eq!(status.code(), Some(4));
    assert_eq!(process.stage(), Stage::Exited);
    process.teardown().unwrap();
}

#[test]
fn test_terminate_trapping_child_exits_cleanly() {
    let script = looping_shell("'exit 0'");
    let mut process = spawn(&["sh", "-c", &script]);
    read_stdout_until(&mut process, "ready");

    let status = process
        .terminate(WaitTimeout::from_millis(5_000))
        .expect("terminate");
    assert!(status.success());
    assert_eq!(process.stage(), Stage::Terminated);
    process.teardown().unwrap();
}

#[test]
fn test_terminate_ignored_then_kill() {
    let script = looping_shell("''");
    let mut process = spawn(&["sh", "-c", &script]);
    read_stdout_until(&mut process, "ready");

    let err = process
        .terminate(WaitTimeout::from_millis(200))
        .expect_err("child ignores SIGTERM");
    assert!(err.is_timeout());
    assert_eq!(process.stage(), Stage::Running);

    let status = process.kill(WaitTimeout::from_millis(5_000)).expect("kill");
    assert!(!status.success());
    assert_eq!(process.stage(), Stage::Killed);
    process.teardown().unwrap();
}

#[test]
fn test_shutdown_escalates_to_kill() {
    let config = ProcessConfig {
        terminate_timeout_ms: 100,
        kill_timeout_ms: 5_000,
        ..ProcessConfig::default()
    };
    let mut process = Process::with_config(config);
    process.init().unwrap();
    let script = looping_shell("''");
    process.start(&["sh", "-c", &script]).unwrap();
    read_stdout_until(&mut process, "ready");

    process.shutdown().expect("shutdown");
    assert_eq!(process.stage(), Stage::Killed);
    process.teardown().unwrap();
}

#[test]
fn test_kill_group_reaches_background_job() {
    let mut process = spawn(&["sh", "-c", "sleep 30 & echo ready; wait"]);
    read_stdout_until(&mut process, "ready");

    // Killing the shell alone leaves `sleep` holding stdout open
    process.kill(WaitTimeout::Infinite).unwrap();
    assert_eq!(process.stage(), Stage::Killed);

    let started = Instant::now();
    process.kill_group().expect("kill group");
    read_stdout_to_end(&mut process);
    assert!(started.elapsed() < Duration::from_secs(10));

    // Nothing is left in the group
    process.kill_group().expect("empty group");
    assert_eq!(process.stage(), Stage::Killed);
    process.teardown().unwrap();
}

#[test]
fn test_terminate_after_exit_does_not_signal() {
    let mut process = spawn(&["true"]);
    process.wait(WaitTimeout::Infinite).unwrap();

    let status = process.terminate(WaitTimeout::Immediate).unwrap();
    assert!(status.success());
    let status = process.kill(WaitTimeout::Immediate).unwrap();
    assert!(status.success());
    process.teardown().unwrap();
}

#[test]
fn test_process_group_isolation() {
    let mut process = spawn(&["sleep", "5"]);
    let pid = process.pid().expect("pid") as i32;

    let parent_pgid = unsafe { libc::getpgrp() };
    let child_pgid = unsafe { libc::getpgid(pid) };

    // Child leads its own group, distinct from ours
    assert_eq!(child_pgid, pid);
    assert_ne!(child_pgid, parent_pgid);

    process.kill(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_multiple_processes() {
    let mut first = spawn(&["sleep", "5"]);
    let mut second = spawn(&["sleep", "5"]);

    assert_ne!(first.pid(), second.pid());

    for process in [&mut first, &mut second] {
        process.kill(WaitTimeout::Infinite).unwrap();
        process.teardown().unwrap();
    }
}

#[test]
fn test_spawn_invalid_command() {
    let mut process = Process::new();
    process.init().unwrap();

    let result = process.start(&["this_command_definitely_does_not_exist_12345"]);
    match result {
        Err(ProcessError::NotFound(code)) => assert_eq!(code, libc::ENOENT),
        other => panic!("Expected NotFound error, got: {:?}", other),
    }
    assert_eq!(process.stage(), Stage::Failed);
    assert!(process.pid().is_none());
    assert!(matches!(
        process.terminate(WaitTimeout::Immediate),
        Err(ProcessError::InvalidStage { .. })
    ));
    process.teardown().unwrap();
}

#[test]
fn test_write_after_child_exit_is_broken_pipe() {
    let mut process = spawn(&["true"]);
    process.wait(WaitTimeout::Infinite).unwrap();

    // The read end is gone once `true` exits
    let err = process.write_stdin_all(&[0u8; 4096]).unwrap_err();
    assert!(matches!(err, ProcessError::BrokenPipe(code) if code == libc::EPIPE));
    process.teardown().unwrap();
}

#[test]
fn test_write_after_close_stdin_is_rejected() {
    let mut process = spawn(&["cat"]);
    process.close_stdin().unwrap();
    assert!(matches!(
        process.write_stdin(b"late"),
        Err(ProcessError::Closed(StdStream::Stdin))
    ));
    // Closing again is harmless
    process.close_stdin().unwrap();
    process.wait(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
}

#[test]
fn test_teardown_detaches_running_child() {
    let mut process = spawn(&["sleep", "5"]);
    let pid = process.pid().expect("pid") as i32;

    process.teardown().unwrap();
    assert_eq!(process.stage(), Stage::Released);
    assert!(process.pid().is_none());

    // Teardown neither waits nor kills: the child is still alive
    assert_eq!(unsafe { libc::kill(pid, 0) }, 0);
    unsafe {
        libc::kill(pid, libc::SIGKILL);
        libc::waitpid(pid, std::ptr::null_mut(), 0);
    }
}

#[test]
fn test_double_teardown() {
    let mut process = spawn(&["true"]);
    process.wait(WaitTimeout::Infinite).unwrap();
    process.teardown().unwrap();
    process.teardown().unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(
        process.read_stdout(&mut buf),
        Err(ProcessError::InvalidStage { stage: Stage::Released, .. })
    ));
}

/// Hands out stdin and stdout pipes, then fails on stderr
struct FailOnStderr;

impl PipeProvider for FailOnStderr {
    fn create(&mut self, stream: StdStream) -> procpipe_core::Result<Pipe> {
        match stream {
            StdStream::Stderr => Err(ProcessError::from_system(libc::EMFILE)),
            _ => SystemPipes.create(stream),
        }
    }
}

#[test]
fn test_teardown_after_partial_init() {
    let mut process = Process::new();
    let err = process.init_with(&mut FailOnStderr).unwrap_err();
    assert!(matches!(err, ProcessError::TooManyHandles(_)));
    assert_eq!(process.stage(), Stage::Failed);

    assert!(matches!(
        process.start(&["true"]),
        Err(ProcessError::InvalidStage { stage: Stage::Failed, .. })
    ));
    process.teardown().expect("teardown closes only existing handles");
    process.teardown().expect("second teardown is a no-op");
}
