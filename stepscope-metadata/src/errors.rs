// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while reading JSON-lines step reports.
#[derive(Debug)]
pub enum ReadReportsError {
    /// Reading from the underlying reader failed.
    Io(std::io::Error),

    /// A line could not be parsed as a report.
    Json {
        /// The 1-based line number.
        line: usize,

        /// The parse error.
        err: serde_json::Error,
    },
}

impl fmt::Display for ReadReportsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(_) => write!(f, "reading step reports failed"),
            Self::Json { line, .. } => {
                write!(f, "parsing step report on line {line} failed")
            }
        }
    }
}

impl error::Error for ReadReportsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json { err, .. } => Some(err),
        }
    }
}
