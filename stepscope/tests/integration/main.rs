// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for stepscope.
//!
//! Every test binds its own [`StepSession`](stepscope::StepSession) with a
//! recording sink, so tests running in parallel on different threads never
//! see each other's reports.

mod aggregation;
mod fixtures;
mod logging;
mod nesting;
mod propagation;
