#![forbid(unsafe_code)]

use kwatch_core::Kind;
use kwatch_kubehub::{pump, DispatchStats, WatchHub};
use kwatch_store::{lock_state, ClusterSnapshot, ClusterState};

fn meta(name: &str, uid: &str, ns: Option<&str>) -> serde_json::Value {
    let mut m = serde_json::json!({ "name": name, "uid": uid, "labels": { "app": name } });
    if let Some(ns) = ns { m["namespace"] = serde_json::Value::String(ns.to_string()); }
    m
}

fn line(reason: &str, object: serde_json::Value) -> String {
    format!("{}\n", serde_json::json!({ "type": reason, "object": object }))
}

fn stream_for(kind: Kind) -> Vec<u8> {
    let ns = if kind.namespaced() { Some("prod") } else { None };
    let mut out = String::new();
    for i in 0..20 {
        let uid = format!("{}-{}", kind.as_str().to_lowercase(), i);
        out += &line("ADDED", serde_json::json!({ "metadata": meta(&format!("r{}", i), &uid, ns) }));
    }
    // a few updates, one duplicate add and some deletes
    for i in (0..20).step_by(3) {
        let uid = format!("{}-{}", kind.as_str().to_lowercase(), i);
        out += &line("MODIFIED", serde_json::json!({ "metadata": meta(&format!("m{}", i), &uid, ns) }));
    }
    let dup = format!("{}-6", kind.as_str().to_lowercase());
    out += &line("ADDED", serde_json::json!({ "metadata": meta("again", &dup, ns) }));
    for i in (1..20).step_by(4) {
        let uid = format!("{}-{}", kind.as_str().to_lowercase(), i);
        out += &line("DELETED", serde_json::json!({ "metadata": meta("", &uid, ns) }));
    }
    out += "{broken\n";
    out.into_bytes()
}

async fn run_all(read_buf: usize) -> (ClusterSnapshot, DispatchStats) {
    let hub = WatchHub::new(ClusterState::new().shared(), &Kind::ALL);
    let state = hub.state();
    let mut tasks = Vec::new();
    for mut d in hub.into_dispatchers() {
        let body = stream_for(d.kind());
        tasks.push(tokio::spawn(async move {
            pump(&mut d, futures::io::Cursor::new(body), read_buf).await.unwrap()
        }));
    }
    let mut total = DispatchStats::default();
    for t in tasks {
        total.merge(t.await.unwrap());
    }
    let snap = lock_state(&state).snapshot();
    (snap, total)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_kinds_are_deterministic() {
    let (a, sa) = run_all(13).await;
    let (b, sb) = run_all(4096).await;
    assert_eq!(a, b, "snapshot must not depend on interleaving or read size");
    assert_eq!(sa, sb);

    // 20 adds, 7 modifies, 1 duplicate add and 5 deletes per kind
    assert_eq!(sa.dispatched, 5 * 33);
    assert_eq!(sa.bad_json, 5);
    assert_eq!(sa.handler_errors, 0);
    assert_eq!(a.nodes.len(), 15);
    assert_eq!(a.pods.len(), 15);
    assert_eq!(a.services.len(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_add_updates_in_place() {
    let (snap, _) = run_all(64).await;
    let ns = snap.namespaces.iter().find(|r| r.uid == "namespace-6").unwrap();
    assert_eq!(ns.name, "again");
    // the second add replaced the labels in place
    assert_eq!(ns.labels.len(), 1);
    assert!(snap.namespaces.iter().all(|r| r.uid != "namespace-1"));
}
