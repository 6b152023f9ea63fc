//! Supervision scenarios on Windows hosts

#![cfg(windows)]

mod common;

use std::time::Duration;

use common::{collector, init_tracing, is_alive, text, wait_until};
use ricecoder_subprocess::{Environment, Process, ProcessBuilder};

#[test]
fn test_command_line_output() {
    init_tracing();
    let (stdout, on_stdout) = collector();
    let process = ProcessBuilder::command_line("cmd /C echo hello")
        .on_stdout(on_stdout)
        .spawn()
        .unwrap();

    assert_eq!(process.wait(), 0);
    assert_eq!(text(&stdout).trim_end(), "hello");
}

#[test]
fn test_exit_code_and_idempotent_wait() {
    let process = Process::builder(["cmd", "/C", "exit 3"]).spawn().unwrap();
    assert_eq!(process.wait(), 3);
    assert_eq!(process.wait(), 3);
    assert!(!process.kill(true));
}

#[test]
fn test_stdin_round_trip() {
    let (stdout, on_stdout) = collector();
    let process = Process::builder(["sort"])
        .open_stdin(true)
        .on_stdout(on_stdout)
        .spawn()
        .unwrap();

    process.write(b"abc\r\n").unwrap();
    process.close_stdin();
    assert_eq!(process.wait(), 0);
    assert_eq!(text(&stdout), "abc\r\n");
}

#[test]
fn test_kill_is_unconditional_for_both_forms() {
    let process = Process::builder(["ping", "-n", "30", "127.0.0.1"]).spawn().unwrap();
    assert!(process.kill(false));
    assert_eq!(process.wait(), 1);
}

#[test]
fn test_kill_tree() {
    let process = Process::builder(["cmd", "/C", "ping -n 30 127.0.0.1 > NUL"])
        .environment(Environment::inherited())
        .spawn()
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !ricecoder_subprocess::descendants(process.id()).is_empty()
    }));
    let children = ricecoder_subprocess::descendants(process.id());

    process.kill_tree(true);
    process.wait();
    for child in children {
        assert!(wait_until(Duration::from_secs(5), || !is_alive(child)));
    }
}
