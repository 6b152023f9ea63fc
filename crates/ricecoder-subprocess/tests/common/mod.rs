//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ricecoder_subprocess::ProcessSnapshot;
use tracing_subscriber::EnvFilter;

/// Bytes collected by an output callback
pub type Buffer = Arc<Mutex<Vec<u8>>>;

/// Route library logs to the test output (`RUST_LOG=debug` to see them)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A buffer plus a callback appending to it
pub fn collector() -> (Buffer, impl FnMut(&[u8]) + Send + 'static) {
    let buffer = Buffer::default();
    let sink = Arc::clone(&buffer);
    (buffer, move |chunk: &[u8]| {
        sink.lock().unwrap().extend_from_slice(chunk)
    })
}

pub fn contents(buffer: &Buffer) -> Vec<u8> {
    buffer.lock().unwrap().clone()
}

pub fn text(buffer: &Buffer) -> String {
    String::from_utf8_lossy(&contents(buffer)).into_owned()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Running (not zombie) according to a fresh snapshot
pub fn is_alive(pid: u32) -> bool {
    ProcessSnapshot::capture().contains(pid)
}
