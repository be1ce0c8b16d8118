//! Transport side: raw watch bodies pumped into dispatchers.

use anyhow::{Context, Result};
use futures::{AsyncRead, AsyncReadExt};
use kube::{api::WatchParams, core::Request, Client};
use kwatch_core::Kind;
use kwatch_store::StateStore;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchStats, Dispatcher};

pub const DEFAULT_READ_BUF: usize = 8192;

/// Read `reader` to EOF, feeding every read into `dispatcher` as a fragment.
pub async fn pump<S, R>(dispatcher: &mut Dispatcher<S>, mut reader: R, read_buf: usize) -> std::io::Result<DispatchStats>
where
    S: StateStore,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_buf.max(1)];
    let mut total = DispatchStats::default();
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total.merge(dispatcher.enqueue(&buf[..n]));
    }
    if dispatcher.pending_bytes() > 0 {
        debug!(kind = %dispatcher.kind(), pending = dispatcher.pending_bytes(), "stream ended mid-message");
    }
    Ok(total)
}

/// Open a raw watch on the kind's collection and pump it until the server closes it.
///
/// There is no reconnect; the caller decides whether to start a new watch.
pub async fn watch_kind<S: StateStore>(
    client: Client,
    dispatcher: &mut Dispatcher<S>,
    namespace: Option<&str>,
    read_buf: usize,
) -> Result<DispatchStats> {
    let kind: Kind = dispatcher.kind();
    let path = kind.api_path(namespace);
    let req = Request::new(path.clone())
        .watch(&WatchParams::default(), "0")
        .with_context(|| format!("building watch request for {}", path))?;
    let body = client
        .request_stream(req)
        .await
        .with_context(|| format!("opening watch stream {}", path))?;
    futures::pin_mut!(body);
    info!(kind = %kind, path = %path, "watcher started");
    let stats = pump(dispatcher, body, read_buf)
        .await
        .with_context(|| format!("reading watch stream {}", path))?;
    warn!(kind = %kind, dispatched = stats.dispatched, "watcher stream ended");
    Ok(stats)
}
