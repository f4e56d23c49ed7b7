#![forbid(unsafe_code)]

//! Test harness and reference fixtures for Deferral.
//!
//! - [`recorder`]: listeners that log every invocation for later assertions.
//! - [`trace`]: a `tracing_subscriber` layer that captures structured events.
//! - [`script`]: scripted operation sequences checked against a reference
//!   model, plus delta-debugging minimization of failing scripts.

pub mod recorder;
pub mod script;
pub mod trace;

pub use recorder::{Invocation, Recorder};
pub use script::{Op, Violation, check, expected, minimize, observed};
pub use trace::{CapturedEvent, TraceCapture, capture};
