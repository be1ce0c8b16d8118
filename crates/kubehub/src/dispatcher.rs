//! Per-kind dispatcher: framing, classification and locked application.

use std::collections::BTreeMap;
use std::sync::Arc;

use kwatch_core::{classify, Kind, KwatchError, Result};
use kwatch_store::{lock_state, ClusterState, SharedState, StateStore};
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::framer::{Frame, Framer};
use crate::handlers;

/// Counters for one or more dispatch passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Notifications routed to a handler.
    pub dispatched: u64,
    /// Ready buffers that failed to parse as JSON.
    pub bad_json: u64,
    /// Parsed documents with an invalid envelope (dropped silently).
    pub invalid: u64,
    /// Closed buffers that were never dispatchable.
    pub rejected: u64,
    /// Routed notifications whose handler reported an error.
    pub handler_errors: u64,
}

impl DispatchStats {
    pub fn merge(&mut self, other: DispatchStats) {
        self.dispatched += other.dispatched;
        self.bad_json += other.bad_json;
        self.invalid += other.invalid;
        self.rejected += other.rejected;
        self.handler_errors += other.handler_errors;
    }

    /// Error-level log lines emitted.
    pub fn errors_logged(&self) -> u64 {
        self.bad_json + self.handler_errors
    }
}

/// Owns the framer for one kind's watch stream and applies its notifications
/// to the shared state.
pub struct Dispatcher<S = ClusterState> {
    kind: Kind,
    framer: Framer,
    state: SharedState<S>,
}

impl<S: StateStore> Dispatcher<S> {
    pub fn new(kind: Kind, state: SharedState<S>) -> Self {
        Self { kind, framer: Framer::new(), state }
    }

    pub fn kind(&self) -> Kind { self.kind }
    pub fn state(&self) -> &SharedState<S> { &self.state }

    /// Bytes received but not yet dispatched.
    pub fn pending_bytes(&self) -> usize { self.framer.pending_bytes() }

    /// Feed one raw read and dispatch everything it completes.
    pub fn enqueue(&mut self, fragment: &[u8]) -> DispatchStats {
        counter!("kwatch_bytes_total", fragment.len() as u64, "kind" => self.kind.as_str());
        self.framer.submit(fragment);
        self.dispatch_ready()
    }

    /// Dispatch every ready buffer in arrival order; incomplete buffers stay queued.
    pub fn dispatch_ready(&mut self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for frame in self.framer.drain() {
            let buf = match frame {
                Frame::Message(buf) => buf,
                Frame::Rejected(buf) => {
                    debug!(kind = %self.kind, len = buf.len(), "discarding malformed frame");
                    counter!("kwatch_rejected_total", 1, "kind" => self.kind.as_str());
                    stats.rejected += 1;
                    continue;
                }
            };
            let root: Value = match serde_json::from_slice(&buf) {
                Ok(v) => v,
                Err(e) => {
                    error!(kind = %self.kind, error = %e, "Bad JSON message received.");
                    counter!("kwatch_bad_json_total", 1, "kind" => self.kind.as_str());
                    stats.bad_json += 1;
                    continue;
                }
            };
            let Some(env) = classify(&root) else {
                stats.invalid += 1;
                continue;
            };
            let outcome = {
                let mut state = lock_state(&self.state);
                handlers::handle(&mut *state, self.kind, &root, &env)
            };
            stats.dispatched += 1;
            if outcome.is_error() { stats.handler_errors += 1; }
            counter!("kwatch_events_total", 1, "kind" => self.kind.as_str(), "reason" => env.reason.as_str());
            info!(outcome = ?outcome, "{}", env.summary(self.kind));
        }
        stats
    }
}

/// One dispatcher per registered kind, all sharing a single state lock.
pub struct WatchHub<S = ClusterState> {
    state: SharedState<S>,
    dispatchers: BTreeMap<Kind, Dispatcher<S>>,
}

impl<S: StateStore> WatchHub<S> {
    pub fn new(state: SharedState<S>, kinds: &[Kind]) -> Self {
        let dispatchers = kinds
            .iter()
            .map(|k| (*k, Dispatcher::new(*k, Arc::clone(&state))))
            .collect();
        Self { state, dispatchers }
    }

    pub fn kinds(&self) -> Vec<Kind> { self.dispatchers.keys().copied().collect() }
    pub fn state(&self) -> SharedState<S> { Arc::clone(&self.state) }

    /// Route a fragment to the dispatcher of `kind`.
    ///
    /// The kind set is fixed at construction; an unregistered kind is a caller bug.
    pub fn enqueue(&mut self, kind: Kind, fragment: &[u8]) -> Result<DispatchStats> {
        let d = self.dispatchers.get_mut(&kind).ok_or(KwatchError::KindNotRegistered(kind))?;
        Ok(d.enqueue(fragment))
    }

    /// Hand the dispatchers to independent ingestion tasks, ordered by kind.
    pub fn into_dispatchers(self) -> Vec<Dispatcher<S>> {
        self.dispatchers.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POD_ADDED: &[u8] = br#"{"type":"ADDED","object":{"metadata":{"name":"n1","uid":"u1","namespace":"ns1"}}}"#;

    fn pod_dispatcher() -> Dispatcher {
        Dispatcher::new(Kind::Pod, ClusterState::new().shared())
    }

    #[test]
    fn nothing_happens_until_newline() {
        let mut d = pod_dispatcher();
        let stats = d.enqueue(POD_ADDED);
        assert_eq!(stats, DispatchStats::default());
        assert_eq!(d.pending_bytes(), POD_ADDED.len());
        assert_eq!(lock_state(d.state()).total(), 0);
        let stats = d.enqueue(b"\n");
        assert_eq!(stats.dispatched, 1);
        assert_eq!(d.pending_bytes(), 0);
        assert_eq!(lock_state(d.state()).pods.len(), 1);
    }

    #[test]
    fn bad_json_is_counted_once_and_skipped() {
        let mut d = pod_dispatcher();
        let mut input = b"{not json}\n".to_vec();
        input.extend_from_slice(POD_ADDED);
        input.push(b'\n');
        let stats = d.enqueue(&input);
        assert_eq!(stats.bad_json, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.errors_logged(), 1);
    }

    #[test]
    fn invalid_envelope_is_silent() {
        let mut d = pod_dispatcher();
        let stats = d.enqueue(b"{\"type\":\"ADDED\",\"object\":{\"metadata\":{\"name\":\"x\"}}}\n{\"type\":\"\"}\n{}\n");
        assert_eq!(stats.invalid, 3);
        assert_eq!(stats.errors_logged(), 0);
        assert_eq!(lock_state(d.state()).total(), 0);
    }

    #[test]
    fn hub_rejects_unregistered_kind() {
        let mut hub = WatchHub::new(ClusterState::new().shared(), &[Kind::Pod, Kind::Node]);
        assert_eq!(hub.kinds(), vec![Kind::Node, Kind::Pod]);
        let err = hub.enqueue(Kind::Service, b"{}\n").unwrap_err();
        assert_eq!(err, KwatchError::KindNotRegistered(Kind::Service));
        assert!(hub.enqueue(Kind::Pod, b"{}\n").is_ok());
    }

    #[test]
    fn hub_dispatchers_share_state() {
        let hub = WatchHub::new(ClusterState::new().shared(), &Kind::ALL);
        let state = hub.state();
        let mut ds = hub.into_dispatchers();
        assert_eq!(ds.len(), 5);
        for d in ds.iter_mut() {
            let doc = format!("{{\"type\":\"ADDED\",\"object\":{{\"metadata\":{{\"name\":\"x\",\"uid\":\"{}\"}}}}}}\n", d.kind());
            assert_eq!(d.enqueue(doc.as_bytes()).dispatched, 1);
        }
        assert_eq!(lock_state(&state).total(), 5);
    }
}
