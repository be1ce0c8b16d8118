//! Kind-specific field extraction from watched objects.
//!
//! This module provides:
//! - label and selector pair extraction (`metadata.labels`, `spec.selector`)
//! - node host addresses, pod container IDs, pod and service data
//! - the replace/union merge rules applied by Added and Modified events
//!
//! All functions take the watched `object` (not the whole notification) and
//! never fail: missing or mistyped fields simply yield empty results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Pairs;

/// Short container id length, as printed by container runtimes.
pub const CONTAINER_ID_LEN: usize = 12;

/// How extracted values are folded into an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Added: overwrite with the new values.
    Replace,
    /// Modified: append values not yet present, update values of known keys.
    Union,
}

/// Fold `src` into `dst`. Empty `src` leaves `dst` untouched.
pub fn merge_pairs(dst: &mut Pairs, src: Pairs, mode: Merge) {
    if src.is_empty() { return; }
    match mode {
        Merge::Replace => *dst = src,
        Merge::Union => {
            for (k, v) in src {
                match dst.iter_mut().find(|(dk, _)| *dk == k) {
                    Some(slot) => slot.1 = v,
                    None => dst.push((k, v)),
                }
            }
        }
    }
}

/// Fold `src` into `dst`. Empty `src` leaves `dst` untouched.
pub fn merge_list<T: PartialEq>(dst: &mut Vec<T>, src: Vec<T>, mode: Merge) {
    if src.is_empty() { return; }
    match mode {
        Merge::Replace => *dst = src,
        Merge::Union => {
            for it in src {
                if !dst.contains(&it) { dst.push(it); }
            }
        }
    }
}

fn pairs_at(raw: &Value, pointer: &str) -> Pairs {
    let mut out = Pairs::new();
    if let Some(map) = raw.pointer(pointer).and_then(|v| v.as_object()) {
        for (k, v) in map.iter() {
            if let Some(s) = v.as_str() {
                if !out.iter().any(|(ok, _)| ok == k) { out.push((k.clone(), s.to_string())); }
            }
        }
    }
    out
}

fn str_at(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer).and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// `metadata.labels` as ordered pairs.
pub fn labels(object: &Value) -> Pairs {
    pairs_at(object, "/metadata/labels")
}

/// `spec.selector` as ordered pairs (replication controllers).
pub fn selectors(object: &Value) -> Pairs {
    pairs_at(object, "/spec/selector")
}

/// Host addresses from a node's `status.addresses[].address`, deduplicated in order.
pub fn node_addresses(status: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(arr) = status.get("addresses").and_then(|v| v.as_array()) {
        for a in arr {
            if let Some(ip) = a.get("address").and_then(|v| v.as_str()) {
                if !ip.is_empty() && !out.iter().any(|x| x == ip) { out.push(ip.to_string()); }
            }
        }
    }
    out
}

/// Container IDs from `status.containerStatuses[].containerID`.
///
/// `docker://0123456789abcdef...` becomes `0123456789ab`.
pub fn pod_containers(object: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(cs) = object.pointer("/status/containerStatuses").and_then(|v| v.as_array()) {
        for c in cs {
            let Some(raw_id) = c.get("containerID").and_then(|v| v.as_str()) else { continue };
            let id = match raw_id.find("://") {
                Some(pos) => &raw_id[pos + 3..],
                None => raw_id,
            };
            let short: String = id.chars().take(CONTAINER_ID_LEN).collect();
            if !short.is_empty() && !out.contains(&short) { out.push(short); }
        }
    }
    out
}

/// Pod placement and status data carried alongside the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodData {
    pub node_name: Option<String>,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub phase: Option<String>,
    /// `(container/resource, quantity)`, e.g. `("web/cpu", "100m")`.
    pub requests: Pairs,
}

impl PodData {
    /// Present scalars overwrite; request pairs follow `mode`.
    pub fn absorb(&mut self, src: PodData, mode: Merge) {
        if src.node_name.is_some() { self.node_name = src.node_name; }
        if src.host_ip.is_some() { self.host_ip = src.host_ip; }
        if src.pod_ip.is_some() { self.pod_ip = src.pod_ip; }
        if src.phase.is_some() { self.phase = src.phase; }
        merge_pairs(&mut self.requests, src.requests, mode);
    }
}

pub fn pod_data(object: &Value) -> PodData {
    let mut requests = Pairs::new();
    if let Some(containers) = object.pointer("/spec/containers").and_then(|v| v.as_array()) {
        for c in containers {
            let name = c.get("name").and_then(|v| v.as_str()).unwrap_or("");
            if let Some(reqs) = c.pointer("/resources/requests").and_then(|v| v.as_object()) {
                for (res, qty) in reqs.iter() {
                    let qty = match qty {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => continue,
                    };
                    requests.push((format!("{}/{}", name, res), qty));
                }
            }
        }
    }
    PodData {
        node_name: str_at(object, "/spec/nodeName"),
        host_ip: str_at(object, "/status/hostIP"),
        pod_ip: str_at(object, "/status/podIP"),
        phase: str_at(object, "/status/phase"),
        requests,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePort {
    pub port: u16,
    pub protocol: String,
    /// Numeric or named target port, rendered as text.
    pub target_port: Option<String>,
    pub node_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceData {
    pub cluster_ip: Option<String>,
    pub service_type: Option<String>,
    pub ports: Vec<ServicePort>,
}

impl ServiceData {
    pub fn absorb(&mut self, src: ServiceData, mode: Merge) {
        if src.cluster_ip.is_some() { self.cluster_ip = src.cluster_ip; }
        if src.service_type.is_some() { self.service_type = src.service_type; }
        merge_list(&mut self.ports, src.ports, mode);
    }
}

pub fn service_data(object: &Value) -> ServiceData {
    let mut ports = Vec::new();
    if let Some(arr) = object.pointer("/spec/ports").and_then(|v| v.as_array()) {
        for p in arr {
            let Some(port) = p.get("port").and_then(|v| v.as_u64()).and_then(|n| u16::try_from(n).ok()) else { continue };
            let protocol = p.get("protocol").and_then(|v| v.as_str()).unwrap_or("TCP").to_string();
            let target_port = match p.get("targetPort") {
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
            let node_port = p.get("nodePort").and_then(|v| v.as_u64()).and_then(|n| u16::try_from(n).ok());
            ports.push(ServicePort { port, protocol, target_port, node_port });
        }
    }
    ServiceData {
        cluster_ip: str_at(object, "/spec/clusterIP"),
        service_type: str_at(object, "/spec/type"),
        ports,
    }
}

/// `metadata.creationTimestamp` as seconds since epoch.
pub fn creation_ts(object: &Value) -> Option<i64> {
    object
        .pointer("/metadata/creationTimestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}
