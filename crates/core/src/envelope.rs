//! Watch notification envelope: reason plus the identifying metadata of the object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Reason;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub reason: Reason,
    pub name: String,
    pub uid: String,
    /// Empty for cluster-scoped kinds.
    pub namespace: String,
}

impl EventEnvelope {
    /// Extract the envelope from a parsed watch notification.
    ///
    /// A present but empty `type` short-circuits to an invalid (default) envelope.
    /// An unrecognised leading character keeps `Reason::Unknown`.
    pub fn from_document(root: &Value) -> Self {
        let mut env = EventEnvelope::default();
        match root.get("type") {
            None | Some(Value::Null) => {}
            Some(ty) => {
                let ty = scalar_text(ty).unwrap_or_default();
                if ty.is_empty() {
                    return EventEnvelope::default();
                }
                env.reason = Reason::from_type_prefix(&ty);
            }
        }
        let meta = root
            .get("object")
            .filter(|o| o.is_object())
            .and_then(|o| o.get("metadata"))
            .filter(|m| m.is_object());
        if let Some(meta) = meta {
            if let Some(v) = meta.get("name").and_then(scalar_text) { env.name = v; }
            if let Some(v) = meta.get("uid").and_then(scalar_text) { env.uid = v; }
            if let Some(v) = meta.get("namespace").and_then(scalar_text) { env.namespace = v; }
        }
        env
    }

    /// Only the UID is mandatory; name and namespace may legitimately be empty.
    pub fn is_valid(&self) -> bool {
        !self.uid.is_empty()
    }

    /// `[reason,KIND,name,uid,namespace]`
    pub fn summary(&self, kind: crate::Kind) -> String {
        format!("[{},{},{},{},{}]", self.reason, kind, self.name, self.uid, self.namespace)
    }
}

/// Classify a parsed document, returning `None` when the envelope is not valid.
pub fn classify(root: &Value) -> Option<EventEnvelope> {
    let env = EventEnvelope::from_document(root);
    env.is_valid().then_some(env)
}

// Strings verbatim, numbers and bools rendered; null/arrays/objects are treated as absent.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kind;
    use serde_json::json;

    #[test]
    fn full_envelope() {
        let doc = json!({"type": "ADDED", "object": {"metadata": {"name": "n1", "uid": "u1", "namespace": "ns1"}}});
        let env = classify(&doc).unwrap();
        assert_eq!(env.reason, Reason::Added);
        assert_eq!(env.name, "n1");
        assert_eq!(env.uid, "u1");
        assert_eq!(env.namespace, "ns1");
        assert_eq!(env.summary(Kind::Pod), "[ADDED,POD,n1,u1,ns1]");
    }

    #[test]
    fn missing_type_keeps_unknown() {
        let doc = json!({"object": {"metadata": {"uid": "u1"}}});
        let env = classify(&doc).unwrap();
        assert_eq!(env.reason, Reason::Unknown);
        assert!(env.name.is_empty());
        assert!(env.namespace.is_empty());
    }

    #[test]
    fn unmapped_type_is_not_an_error() {
        let doc = json!({"type": "BOOKMARK", "object": {"metadata": {"uid": "u1"}}});
        assert_eq!(classify(&doc).unwrap().reason, Reason::Unknown);
    }

    #[test]
    fn empty_type_short_circuits() {
        let doc = json!({"type": "", "object": {"metadata": {"name": "n", "uid": "u1"}}});
        let env = EventEnvelope::from_document(&doc);
        assert_eq!(env, EventEnvelope::default());
        assert!(classify(&doc).is_none());
    }

    #[test]
    fn missing_uid_is_invalid() {
        assert!(classify(&json!({"type": "ADDED", "object": {"metadata": {"name": "n"}}})).is_none());
        assert!(classify(&json!({"type": "ADDED", "object": null})).is_none());
        assert!(classify(&json!({"type": "ADDED", "object": {"metadata": "nope"}})).is_none());
        assert!(classify(&json!({})).is_none());
    }

    #[test]
    fn abbreviated_type() {
        let doc = json!({"type": "D", "object": {"metadata": {"uid": "x"}}});
        assert_eq!(classify(&doc).unwrap().reason, Reason::Deleted);
    }
}
