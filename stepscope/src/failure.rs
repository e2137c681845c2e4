// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of panic payloads and errors into [`Failure`]s.

use crate::errors::{AggregateFailure, InstrumentationFault};
use std::{any::Any, error::Error};
use stepscope_metadata::{Failure, FailureKind, SourceLocation};

/// Returns the message of a string panic payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some(*s)
    } else {
        payload.downcast_ref::<String>().map(String::as_str)
    }
}

/// Builds a failure from a panic payload, as seen by the panic hook.
pub(crate) fn from_payload(
    payload: &(dyn Any + Send),
    location: Option<SourceLocation>,
) -> Failure {
    if let Some(failure) = payload.downcast_ref::<Failure>() {
        return failure.clone();
    }
    if let Some(aggregate) = payload.downcast_ref::<AggregateFailure>() {
        return Failure::new(FailureKind::Aggregate, aggregate.to_string(), location);
    }
    if let Some(fault) = payload.downcast_ref::<InstrumentationFault>() {
        return Failure::new(FailureKind::Fault, fault.to_string(), location);
    }
    let message = payload_message(payload).unwrap_or("Box<dyn Any>");
    Failure::panic(message, location)
}

/// Builds a failure from a payload caught after unwinding.
///
/// Caught payloads carry no location, so it is recovered from the last panic
/// seen by the hook if that panic is the one being caught.
pub(crate) fn from_unwind(payload: &(dyn Any + Send), last_panic: Option<&Failure>) -> Failure {
    let failure = from_payload(payload, None);
    match last_panic {
        Some(last)
            if failure.location.is_none()
                && last.kind == failure.kind
                && last.message == failure.message =>
        {
            last.clone()
        }
        _ => failure,
    }
}

/// Joins an error and its sources with `": "`.
pub(crate) fn error_chain<E: Error + ?Sized>(error: &E) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

impl InstrumentationFault {
    pub(crate) fn to_failure(&self, location: Option<SourceLocation>) -> Failure {
        Failure::new(FailureKind::Fault, self.to_string(), location)
    }
}
