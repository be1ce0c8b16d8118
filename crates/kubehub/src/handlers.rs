//! Per-kind reconciliation of watch notifications into the cluster state.
//!
//! Added is an upsert that replaces extracted lists and labels, Modified merges
//! them into an existing record, Deleted removes by UID. Callers hold the state
//! lock for the whole invocation.

use kwatch_core::extract::{self, Merge};
use kwatch_core::{EventEnvelope, Kind, Reason};
use kwatch_store::StateStore;
use serde_json::Value;
use tracing::{error, info};

/// What a handler did with one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Added for a UID already present.
    Updated,
    Merged,
    Deleted,
    /// Modified for an absent UID; nothing created.
    MissingOnModify,
    /// Deleted for an absent UID.
    MissingOnDelete,
    /// ERROR or unrecognised reason.
    BadMessage,
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::MissingOnModify | Outcome::MissingOnDelete | Outcome::BadMessage)
    }
}

/// Route a classified notification to the handler for `kind`.
pub fn handle<S: StateStore + ?Sized>(state: &mut S, kind: Kind, root: &Value, env: &EventEnvelope) -> Outcome {
    match kind {
        Kind::Node => handle_node(state, root, env),
        Kind::Namespace => handle_namespace(state, root, env),
        Kind::Pod => handle_pod(state, root, env),
        Kind::ReplicationController => handle_controller(state, root, env),
        Kind::Service => handle_service(state, root, env),
    }
}

fn handle_node<S: StateStore + ?Sized>(state: &mut S, root: &Value, env: &EventEnvelope) -> Outcome {
    let object = object_of(root);
    let (mode, outcome) = match begin_upsert(state, Kind::Node, env) {
        Ok(v) => v,
        Err(done) => return done,
    };
    let addresses = extract::node_addresses(object.get("status").unwrap_or(&Value::Null));
    let node = state.node(&env.name, &env.uid);
    extract::merge_list(&mut node.host_ips, addresses, mode);
    extract::merge_pairs(&mut node.labels, extract::labels(object), mode);
    if let Some(ts) = extract::creation_ts(object) { node.creation_ts = ts; }
    outcome
}

fn handle_namespace<S: StateStore + ?Sized>(state: &mut S, root: &Value, env: &EventEnvelope) -> Outcome {
    let object = object_of(root);
    let (mode, outcome) = match begin_upsert(state, Kind::Namespace, env) {
        Ok(v) => v,
        Err(done) => return done,
    };
    let ns = state.namespace(&env.name, &env.uid);
    extract::merge_pairs(&mut ns.labels, extract::labels(object), mode);
    if let Some(ts) = extract::creation_ts(object) { ns.creation_ts = ts; }
    outcome
}

fn handle_pod<S: StateStore + ?Sized>(state: &mut S, root: &Value, env: &EventEnvelope) -> Outcome {
    let object = object_of(root);
    let (mode, outcome) = match begin_upsert(state, Kind::Pod, env) {
        Ok(v) => v,
        Err(done) => return done,
    };
    let pod = state.pod(&env.name, &env.uid, &env.namespace);
    extract::merge_pairs(&mut pod.labels, extract::labels(object), mode);
    extract::merge_list(&mut pod.container_ids, extract::pod_containers(object), mode);
    pod.data.absorb(extract::pod_data(object), mode);
    if let Some(ts) = extract::creation_ts(object) { pod.creation_ts = ts; }
    outcome
}

fn handle_controller<S: StateStore + ?Sized>(state: &mut S, root: &Value, env: &EventEnvelope) -> Outcome {
    let object = object_of(root);
    let (mode, outcome) = match begin_upsert(state, Kind::ReplicationController, env) {
        Ok(v) => v,
        Err(done) => return done,
    };
    let rc = state.controller(&env.name, &env.uid, &env.namespace);
    extract::merge_pairs(&mut rc.labels, extract::labels(object), mode);
    extract::merge_pairs(&mut rc.selectors, extract::selectors(object), mode);
    if let Some(ts) = extract::creation_ts(object) { rc.creation_ts = ts; }
    outcome
}

fn handle_service<S: StateStore + ?Sized>(state: &mut S, root: &Value, env: &EventEnvelope) -> Outcome {
    let object = object_of(root);
    let (mode, outcome) = match begin_upsert(state, Kind::Service, env) {
        Ok(v) => v,
        Err(done) => return done,
    };
    let svc = state.service(&env.name, &env.uid, &env.namespace);
    extract::merge_pairs(&mut svc.labels, extract::labels(object), mode);
    svc.data.absorb(extract::service_data(object), mode);
    if let Some(ts) = extract::creation_ts(object) { svc.creation_ts = ts; }
    outcome
}

/// Decide how an Added/Modified notification applies, or finish the event early.
///
/// `Err` carries the final outcome for Deleted, bad messages and Modified of an
/// absent record; those paths never create anything.
fn begin_upsert<S: StateStore + ?Sized>(state: &mut S, kind: Kind, env: &EventEnvelope) -> Result<(Merge, Outcome), Outcome> {
    match env.reason {
        Reason::Added => {
            if state.has(kind, &env.uid) {
                info!(kind = %kind, uid = %env.uid, "ADDED message received for existing {} [{}], updating only.", kind.label(), env.uid);
                Ok((Merge::Replace, Outcome::Updated))
            } else {
                Ok((Merge::Replace, Outcome::Created))
            }
        }
        Reason::Modified => {
            if !state.has(kind, &env.uid) {
                error!(kind = %kind, uid = %env.uid, "MODIFIED message received for non-existing {} [{}], giving up.", kind.label(), env.uid);
                return Err(Outcome::MissingOnModify);
            }
            Ok((Merge::Union, Outcome::Merged))
        }
        Reason::Deleted => {
            if state.delete(kind, &env.uid) {
                Err(Outcome::Deleted)
            } else {
                error!(kind = %kind, uid = %env.uid, "{} not found: {}", kind, env.name);
                Err(Outcome::MissingOnDelete)
            }
        }
        Reason::Error | Reason::Unknown => {
            error!(kind = %kind, reason = %env.reason, "Bad {} watch message.", kind);
            Err(Outcome::BadMessage)
        }
    }
}

fn object_of(root: &Value) -> &Value {
    root.get("object").unwrap_or(&Value::Null)
}
