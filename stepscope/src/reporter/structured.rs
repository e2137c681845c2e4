// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::StepSink;
use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};
use stepscope_metadata::ScopeReport;
use tracing::warn;

/// A sink that writes each finished scope as a line of JSON.
///
/// The output can be read back with [`stepscope_metadata::read_json_lines`].
/// Write errors are logged and otherwise ignored: reporting never changes the
/// outcome of a step.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Creates a new `JsonLinesSink` writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_report(&self, report: &ScopeReport) -> io::Result<()> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()
    }
}

impl<W: Write + Send> StepSink for JsonLinesSink<W> {
    fn scope_finished(&self, report: &ScopeReport) {
        if let Err(error) = self.write_report(report) {
            warn!(
                "failed to write report for step '{}' ({}): {error}",
                report.title, report.id
            );
        }
    }
}
