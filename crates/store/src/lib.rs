//! kwatch store: in-RAM cluster state, one UID-keyed keyspace per resource kind.

#![forbid(unsafe_code)]

use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kwatch_core::extract::{PodData, ServiceData};
use kwatch_core::{Kind, Pairs, Uid};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A record stored in a [`Keyspace`]. Identity is the UID; the name is informational.
pub trait Record {
    fn create(name: &str, uid: &str, namespace: &str) -> Self;
    fn uid(&self) -> &str;
    /// Refresh descriptive metadata on an existing record. Empty values are ignored.
    fn rename(&mut self, name: &str, namespace: &str);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub uid: Uid,
    pub labels: Pairs,
    pub host_ips: Vec<String>,
    pub creation_ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub name: String,
    pub uid: Uid,
    pub labels: Pairs,
    pub creation_ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodRecord {
    pub name: String,
    pub uid: Uid,
    pub namespace: String,
    pub labels: Pairs,
    pub container_ids: Vec<String>,
    pub data: PodData,
    pub creation_ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerRecord {
    pub name: String,
    pub uid: Uid,
    pub namespace: String,
    pub labels: Pairs,
    pub selectors: Pairs,
    pub creation_ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub uid: Uid,
    pub namespace: String,
    pub labels: Pairs,
    pub data: ServiceData,
    pub creation_ts: i64,
}

macro_rules! cluster_scoped {
    ($t:ty) => {
        impl Record for $t {
            fn create(name: &str, uid: &str, _namespace: &str) -> Self {
                Self { name: name.to_string(), uid: uid.to_string(), ..Default::default() }
            }
            fn uid(&self) -> &str { &self.uid }
            fn rename(&mut self, name: &str, _namespace: &str) {
                if !name.is_empty() { self.name = name.to_string(); }
            }
        }
    };
}

macro_rules! namespaced {
    ($t:ty) => {
        impl Record for $t {
            fn create(name: &str, uid: &str, namespace: &str) -> Self {
                Self { name: name.to_string(), uid: uid.to_string(), namespace: namespace.to_string(), ..Default::default() }
            }
            fn uid(&self) -> &str { &self.uid }
            fn rename(&mut self, name: &str, namespace: &str) {
                if !name.is_empty() { self.name = name.to_string(); }
                if !namespace.is_empty() { self.namespace = namespace.to_string(); }
            }
        }
    };
}

cluster_scoped!(NodeRecord);
cluster_scoped!(NamespaceRecord);
namespaced!(PodRecord);
namespaced!(ControllerRecord);
namespaced!(ServiceRecord);

/// UID-keyed collection for one resource kind.
#[derive(Debug, Clone)]
pub struct Keyspace<R> {
    map: FxHashMap<Uid, R>,
}

impl<R> Default for Keyspace<R> {
    fn default() -> Self { Self { map: FxHashMap::default() } }
}

impl<R: Record> Keyspace<R> {
    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
    pub fn has(&self, uid: &str) -> bool { self.map.contains_key(uid) }
    pub fn get(&self, uid: &str) -> Option<&R> { self.map.get(uid) }
    pub fn iter(&self) -> impl Iterator<Item = &R> { self.map.values() }

    /// Fetch the record for `uid`, creating it when absent.
    pub fn get_or_create(&mut self, name: &str, uid: &str, namespace: &str) -> &mut R {
        match self.map.entry(uid.to_string()) {
            Entry::Occupied(e) => {
                let rec = e.into_mut();
                rec.rename(name, namespace);
                rec
            }
            Entry::Vacant(e) => {
                debug!(uid, name, "creating record");
                e.insert(R::create(name, uid, namespace))
            }
        }
    }

    pub fn delete(&mut self, uid: &str) -> bool {
        self.map.remove(uid).is_some()
    }

    fn sorted(&self) -> Vec<R>
    where
        R: Clone,
    {
        let mut out: Vec<R> = self.map.values().cloned().collect();
        out.sort_by(|a, b| a.uid().cmp(b.uid()));
        out
    }
}

/// Capability handed to the watch handlers: membership, create-or-fetch and delete per kind.
pub trait StateStore: Send {
    fn has(&self, kind: Kind, uid: &str) -> bool;
    fn delete(&mut self, kind: Kind, uid: &str) -> bool;
    fn node(&mut self, name: &str, uid: &str) -> &mut NodeRecord;
    fn namespace(&mut self, name: &str, uid: &str) -> &mut NamespaceRecord;
    fn pod(&mut self, name: &str, uid: &str, namespace: &str) -> &mut PodRecord;
    fn controller(&mut self, name: &str, uid: &str, namespace: &str) -> &mut ControllerRecord;
    fn service(&mut self, name: &str, uid: &str, namespace: &str) -> &mut ServiceRecord;
}

/// The cluster state shared by every watch stream.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    epoch: u64,
    pub nodes: Keyspace<NodeRecord>,
    pub namespaces: Keyspace<NamespaceRecord>,
    pub pods: Keyspace<PodRecord>,
    pub controllers: Keyspace<ControllerRecord>,
    pub services: Keyspace<ServiceRecord>,
}

impl ClusterState {
    pub fn new() -> Self { Self::default() }

    /// Bumped on every create-or-fetch and successful delete.
    pub fn epoch(&self) -> u64 { self.epoch }

    pub fn len(&self, kind: Kind) -> usize {
        match kind {
            Kind::Node => self.nodes.len(),
            Kind::Namespace => self.namespaces.len(),
            Kind::Pod => self.pods.len(),
            Kind::ReplicationController => self.controllers.len(),
            Kind::Service => self.services.len(),
        }
    }

    pub fn total(&self) -> usize {
        Kind::ALL.iter().map(|k| self.len(*k)).sum()
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            epoch: self.epoch,
            nodes: self.nodes.sorted(),
            namespaces: self.namespaces.sorted(),
            pods: self.pods.sorted(),
            controllers: self.controllers.sorted(),
            services: self.services.sorted(),
        }
    }

    /// Wrap into the handle shared by all dispatchers.
    pub fn shared(self) -> SharedState<Self> {
        Arc::new(Mutex::new(self))
    }

    fn bump(&mut self) { self.epoch = self.epoch.saturating_add(1); }
}

impl StateStore for ClusterState {
    fn has(&self, kind: Kind, uid: &str) -> bool {
        match kind {
            Kind::Node => self.nodes.has(uid),
            Kind::Namespace => self.namespaces.has(uid),
            Kind::Pod => self.pods.has(uid),
            Kind::ReplicationController => self.controllers.has(uid),
            Kind::Service => self.services.has(uid),
        }
    }

    fn delete(&mut self, kind: Kind, uid: &str) -> bool {
        let removed = match kind {
            Kind::Node => self.nodes.delete(uid),
            Kind::Namespace => self.namespaces.delete(uid),
            Kind::Pod => self.pods.delete(uid),
            Kind::ReplicationController => self.controllers.delete(uid),
            Kind::Service => self.services.delete(uid),
        };
        if removed { self.bump(); }
        removed
    }

    fn node(&mut self, name: &str, uid: &str) -> &mut NodeRecord {
        self.bump();
        self.nodes.get_or_create(name, uid, "")
    }

    fn namespace(&mut self, name: &str, uid: &str) -> &mut NamespaceRecord {
        self.bump();
        self.namespaces.get_or_create(name, uid, "")
    }

    fn pod(&mut self, name: &str, uid: &str, namespace: &str) -> &mut PodRecord {
        self.bump();
        self.pods.get_or_create(name, uid, namespace)
    }

    fn controller(&mut self, name: &str, uid: &str, namespace: &str) -> &mut ControllerRecord {
        self.bump();
        self.controllers.get_or_create(name, uid, namespace)
    }

    fn service(&mut self, name: &str, uid: &str, namespace: &str) -> &mut ServiceRecord {
        self.bump();
        self.services.get_or_create(name, uid, namespace)
    }
}

/// Point-in-time copy of the cluster state, records sorted by UID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub epoch: u64,
    pub nodes: Vec<NodeRecord>,
    pub namespaces: Vec<NamespaceRecord>,
    pub pods: Vec<PodRecord>,
    pub controllers: Vec<ControllerRecord>,
    pub services: Vec<ServiceRecord>,
}

/// The single lock guarding all kinds.
pub type SharedState<S = ClusterState> = Arc<Mutex<S>>;

/// Acquire the state lock, ignoring poisoning.
pub fn lock_state<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
