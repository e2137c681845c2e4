// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    sync::{Arc, Mutex},
};
use stepscope::{StepConfig, StepSession, reporter::RecordingSink};
use tracing::Level;

/// Returns a session with the given config that records to the returned sink.
pub(crate) fn recording_session(config: StepConfig) -> (StepSession, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (StepSession::new(config, sink.clone()), sink)
}

pub(crate) fn logging_config() -> StepConfig {
    StepConfig {
        log_steps: true,
        debug_trace: true,
        ..Default::default()
    }
}

/// Runs `f` with a thread-local subscriber, returning its value and
/// everything logged.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();

    let value = tracing::subscriber::with_default(subscriber, f);
    let logs = buf.0.lock().unwrap().clone();
    (value, String::from_utf8(logs).unwrap())
}

#[derive(Clone, Debug, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f`, catching any panic that escapes it.
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
}
