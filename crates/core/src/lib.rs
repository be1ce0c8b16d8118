//! kwatch core types: resource kinds, watch reasons, envelopes and errors.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod envelope;
pub mod extract;

pub use envelope::{classify, EventEnvelope};

/// Object UID as delivered by the API server (`metadata.uid`).
pub type Uid = String;

/// Ordered key/value pairs (labels, selectors). Keys are unique within a list.
pub type Pairs = SmallVec<[(String, String); 8]>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KwatchError {
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("unknown watch reason: {0}")]
    UnknownReason(String),
    #[error("no dispatcher registered for kind {0}")]
    KindNotRegistered(Kind),
}

pub type Result<T> = std::result::Result<T, KwatchError>;

/// The resource kinds the dispatcher knows how to reconcile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Node,
    Namespace,
    Pod,
    ReplicationController,
    Service,
}

impl Kind {
    pub const ALL: [Kind; 5] = [Kind::Node, Kind::Namespace, Kind::Pod, Kind::ReplicationController, Kind::Service];

    /// Upper-case tag used in dispatch summary lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Node => "NODE",
            Kind::Namespace => "NAMESPACE",
            Kind::Pod => "POD",
            Kind::ReplicationController => "REPLICATION_CONTROLLER",
            Kind::Service => "SERVICE",
        }
    }

    /// Human label used in handler log messages.
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Node => "node",
            Kind::Namespace => "namespace",
            Kind::Pod => "pod",
            Kind::ReplicationController => "replication controller",
            Kind::Service => "service",
        }
    }

    pub fn namespaced(&self) -> bool {
        !matches!(self, Kind::Node | Kind::Namespace)
    }

    /// REST collection path (core/v1) for this kind, optionally scoped to a namespace.
    pub fn api_path(&self, namespace: Option<&str>) -> String {
        let plural = match self {
            Kind::Node => "nodes",
            Kind::Namespace => "namespaces",
            Kind::Pod => "pods",
            Kind::ReplicationController => "replicationcontrollers",
            Kind::Service => "services",
        };
        match namespace {
            Some(ns) if self.namespaced() => format!("/api/v1/namespaces/{}/{}", ns, plural),
            _ => format!("/api/v1/{}", plural),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = KwatchError;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace(['_', '-', ' '], "");
        match norm.as_str() {
            "node" | "nodes" | "no" => Ok(Kind::Node),
            "namespace" | "namespaces" | "ns" => Ok(Kind::Namespace),
            "pod" | "pods" | "po" => Ok(Kind::Pod),
            "replicationcontroller" | "replicationcontrollers" | "rc" | "controller" => Ok(Kind::ReplicationController),
            "service" | "services" | "svc" => Ok(Kind::Service),
            _ => Err(KwatchError::UnknownKind(s.to_string())),
        }
    }
}

/// Mutation reason carried by a watch notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Reason {
    Added,
    Modified,
    Deleted,
    Error,
    #[default]
    Unknown,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Added => "ADDED",
            Reason::Modified => "MODIFIED",
            Reason::Deleted => "DELETED",
            Reason::Error => "ERROR",
            Reason::Unknown => "UNKNOWN",
        }
    }

    /// Map the wire `type` field; only the leading character is significant.
    pub fn from_type_prefix(ty: &str) -> Reason {
        match ty.as_bytes().first() {
            Some(b'A') => Reason::Added,
            Some(b'M') => Reason::Modified,
            Some(b'D') => Reason::Deleted,
            Some(b'E') => Reason::Error,
            _ => Reason::Unknown,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = KwatchError;

    /// Exact decode of a reason name.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADDED" => Ok(Reason::Added),
            "MODIFIED" => Ok(Reason::Modified),
            "DELETED" => Ok(Reason::Deleted),
            "ERROR" => Ok(Reason::Error),
            "UNKNOWN" => Ok(Reason::Unknown),
            other => Err(KwatchError::UnknownReason(other.to_string())),
        }
    }
}

pub mod prelude {
    pub use super::{classify, EventEnvelope, Kind, KwatchError, Pairs, Reason, Uid};
}
