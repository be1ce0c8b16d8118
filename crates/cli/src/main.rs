use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kwatch_core::Kind;
use kwatch_kubehub::{DispatchStats, WatchHub, DEFAULT_READ_BUF};
use kwatch_store::{lock_state, ClusterSnapshot, ClusterState};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "kwatchctl", version, about = "Watch cluster resources into an in-memory state")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace for namespaced kinds (default: all)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch kinds on the current cluster until Ctrl-C, then print the state
    Watch {
        /// Comma-separated kinds, e.g. "pods,services" (default: all five)
        #[arg(long = "kinds", value_delimiter = ',')]
        kinds: Vec<Kind>,
    },
    /// Replay a captured watch body from a file
    Replay {
        /// File holding newline-delimited watch notifications
        file: std::path::PathBuf,
        /// Kind the captured stream belongs to
        #[arg(long = "kind")]
        kind: Kind,
        /// Read size used to fragment the file (default: KWATCH_READ_BUF)
        #[arg(long = "chunk")]
        chunk: Option<usize>,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    stats: DispatchStats,
    state: &'a ClusterSnapshot,
}

fn init_tracing() {
    let env = std::env::var("KWATCH_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KWATCH_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KWATCH_METRICS_ADDR; expected host:port");
        }
    }
}

fn read_buf() -> usize {
    std::env::var("KWATCH_READ_BUF").ok().and_then(|s| s.parse::<usize>().ok()).filter(|n| *n > 0).unwrap_or(DEFAULT_READ_BUF)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let ns = cli.namespace.as_deref();

    let (snap, stats) = match cli.command {
        Commands::Watch { kinds } => {
            let kinds = if kinds.is_empty() { Kind::ALL.to_vec() } else { kinds };
            info!(kinds = ?kinds, ns = ?ns, "watch invoked");
            watch(&kinds, ns).await?
        }
        Commands::Replay { file, kind, chunk } => {
            let body = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let chunk = chunk.filter(|n| *n > 0).unwrap_or_else(read_buf);
            info!(file = %file.display(), kind = %kind, chunk, "replay invoked");
            let mut hub = WatchHub::new(ClusterState::new().shared(), &[kind]);
            let mut stats = DispatchStats::default();
            for frag in body.chunks(chunk) {
                stats.merge(hub.enqueue(kind, frag)?);
            }
            let snap = lock_state(&hub.state()).snapshot();
            (snap, stats)
        }
    };

    match cli.output {
        Output::Human => print_human(&snap, ns),
        Output::Json => println!("{}", serde_json::to_string_pretty(&Report { stats, state: &snap })?),
    }
    if stats.errors_logged() > 0 {
        warn!(bad_json = stats.bad_json, handler_errors = stats.handler_errors, "errors while dispatching");
    }
    Ok(())
}

async fn watch(kinds: &[Kind], ns: Option<&str>) -> Result<(ClusterSnapshot, DispatchStats)> {
    let client = kube::Client::try_default().await.context("connecting to cluster")?;
    let hub = WatchHub::new(ClusterState::new().shared(), kinds);
    let state = hub.state();
    let read_buf = read_buf();

    let mut handles = Vec::new();
    for mut d in hub.into_dispatchers() {
        let client = client.clone();
        let ns = ns.map(|s| s.to_string());
        handles.push(tokio::spawn(async move {
            let kind = d.kind();
            match kwatch_kubehub::watch_kind(client, &mut d, ns.as_deref(), read_buf).await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(kind = %kind, error = ?e, "watcher failed");
                    DispatchStats::default()
                }
            }
        }));
    }

    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    let mut stats = DispatchStats::default();
    tokio::select! {
        done = futures::future::join_all(handles) => {
            for r in done {
                match r {
                    Ok(s) => stats.merge(s),
                    Err(e) => warn!(error = %e, "watcher task did not finish"),
                }
            }
            info!("all watch streams ended");
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received; stopping watchers");
            for a in &aborts { a.abort(); }
        }
    }
    let snap = lock_state(&state).snapshot();
    Ok((snap, stats))
}

fn in_ns(record_ns: &str, ns: Option<&str>) -> bool {
    ns.map(|n| record_ns == n).unwrap_or(true)
}

fn print_human(snap: &ClusterSnapshot, ns: Option<&str>) {
    println!("{:<24} {:<36} {:<38} AGE", "KIND", "NAMESPACE/NAME", "UID");
    let row = |kind: Kind, namespace: &str, name: &str, uid: &str, ts: i64| {
        let key = if namespace.is_empty() { name.to_string() } else { format!("{}/{}", namespace, name) };
        println!("{:<24} {:<36} {:<38} {}", kind.as_str(), key, uid, render_age(ts));
    };
    for n in &snap.nodes { row(Kind::Node, "", &n.name, &n.uid, n.creation_ts); }
    for n in &snap.namespaces { row(Kind::Namespace, "", &n.name, &n.uid, n.creation_ts); }
    for p in snap.pods.iter().filter(|p| in_ns(&p.namespace, ns)) {
        row(Kind::Pod, &p.namespace, &p.name, &p.uid, p.creation_ts);
    }
    for c in snap.controllers.iter().filter(|c| in_ns(&c.namespace, ns)) {
        row(Kind::ReplicationController, &c.namespace, &c.name, &c.uid, c.creation_ts);
    }
    for s in snap.services.iter().filter(|s| in_ns(&s.namespace, ns)) {
        row(Kind::Service, &s.namespace, &s.name, &s.uid, s.creation_ts);
    }
    println!("epoch {}", snap.epoch);
}

fn render_age(creation_ts: i64) -> String {
    if creation_ts <= 0 {
        return "-".to_string();
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let secs = (now - creation_ts).max(0) as u64;
    let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60);
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_args() {
        let cli = Cli::try_parse_from(["kwatchctl", "-o", "json", "replay", "cap.jsonl", "--kind", "rc", "--chunk", "7"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Replay { kind, chunk, .. } => {
                assert_eq!(kind, Kind::ReplicationController);
                assert_eq!(chunk, Some(7));
            }
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn parses_kind_list() {
        let cli = Cli::try_parse_from(["kwatchctl", "watch", "--kinds", "pods,svc"]).unwrap();
        match cli.command {
            Commands::Watch { kinds } => assert_eq!(kinds, vec![Kind::Pod, Kind::Service]),
            _ => panic!("expected watch"),
        }
        assert!(Cli::try_parse_from(["kwatchctl", "watch", "--kinds", "deployments"]).is_err());
    }

    #[test]
    fn age_rendering() {
        assert_eq!(render_age(0), "-");
        assert!(render_age(1).ends_with('h'));
        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs() as i64;
        assert_eq!(render_age(now + 60), "0s");
        let ninety_min_ago = render_age(now - 5400);
        assert!(ninety_min_ago == "1h30m" || ninety_min_ago == "1h31m", "{}", ninety_min_ago);
    }
}
