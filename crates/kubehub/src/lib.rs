//! kwatch kubehub: watch-stream framing, dispatch and kube wiring.
//!
//! Each resource kind gets a [`Dispatcher`] that reassembles newline-delimited
//! JSON from raw reads, classifies every notification and applies it to the
//! shared cluster state under one lock.

#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod framer;
pub mod handlers;
pub mod source;

pub use dispatcher::{DispatchStats, Dispatcher, WatchHub};
pub use framer::{Frame, Framer};
pub use handlers::Outcome;
pub use source::{pump, watch_kind, DEFAULT_READ_BUF};
