// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Serializable data produced by [stepscope](https://crates.io/crates/stepscope).
//!
//! Reporting backends receive a [`ScopeStarted`] event when a step opens and a
//! [`ScopeReport`] when it closes. Both types round-trip through JSON, so a
//! backend can also consume the JSON-lines stream written by stepscope's
//! structured sink with [`read_json_lines`].

mod errors;
mod failure;
mod report;
mod scope;

pub use errors::*;
pub use failure::*;
pub use report::*;
pub use scope::*;
