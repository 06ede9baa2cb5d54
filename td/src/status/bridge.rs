//! WebSocket half of the Status Bridge (spec.md §4.9 surface 2): bound to
//! `127.0.0.1` on the first free port in `[18800, 18809]`, published in the
//! status file's `wsPort`. Clients get an initial snapshot then a push hint
//! per state change; the file remains the source of truth.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::snapshot::{DaemonSnapshot, write_snapshot_atomic};

const WS_PORT_RANGE: std::ops::RangeInclusive<u16> = 18800..=18809;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Publishes [`DaemonSnapshot`]s to disk and pushes a re-read hint to any
/// connected WebSocket client whenever the snapshot changes.
pub struct StatusBridge {
    project_root: PathBuf,
    snapshot: RwLock<DaemonSnapshot>,
    push: broadcast::Sender<String>,
    ws_port: RwLock<Option<u16>>,
}

impl StatusBridge {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let (push, _rx) = broadcast::channel(64);
        Self {
            project_root: project_root.into(),
            snapshot: RwLock::new(DaemonSnapshot::starting()),
            push,
            ws_port: RwLock::new(None),
        }
    }

    /// Bind the WebSocket server to the first free port in `[18800, 18809]`
    /// and spawn it. Returns immediately; the server runs until the
    /// returned task is dropped or aborted.
    pub async fn serve(self: &Arc<Self>) -> std::io::Result<tokio::task::JoinHandle<()>> {
        let mut listener = None;
        for port in WS_PORT_RANGE {
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            match TcpListener::bind(addr).await {
                Ok(l) => {
                    listener = Some((l, port));
                    break;
                }
                Err(e) => debug!(port, error = %e, "status bridge: port in use, trying next"),
            }
        }

        let (listener, port) = listener.ok_or_else(|| {
            std::io::Error::other("no free port in [18800, 18809] for the Status Bridge")
        })?;

        *self.ws_port.write().await = Some(port);
        self.snapshot.write().await.ws_port = Some(port);
        info!(port, "Status Bridge WebSocket listening");

        let app = Router::new().route("/ws", get(ws_handler)).with_state(self.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "status bridge server exited");
            }
        });
        Ok(handle)
    }

    /// Replace the published snapshot, write it atomically to disk, and
    /// notify any connected WebSocket clients to re-read it.
    pub async fn publish(&self, mut snapshot: DaemonSnapshot, completed: u64) {
        snapshot.ws_port = *self.ws_port.read().await;
        snapshot.touch(completed);

        if let Err(e) = write_snapshot_atomic(&self.project_root, &snapshot) {
            warn!(error = %e, "status bridge: failed to write daemon_status.json");
        }

        let hint = serde_json::json!({"kind": "status_update", "ts": snapshot.timestamp}).to_string();
        let _ = self.push.send(hint);

        *self.snapshot.write().await = snapshot;
    }

    /// Re-publish the current snapshot on an interval even when nothing
    /// changed, so observers that missed an update resync (spec.md §4.9
    /// "Observer-side resync"). Runs until cancelled.
    pub async fn run_heartbeat(self: Arc<Self>, mut cancel: tokio::sync::watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let snapshot = self.snapshot.read().await.clone();
                    let completed = snapshot.stats.completed;
                    self.publish(snapshot, completed).await;
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn current(&self) -> DaemonSnapshot {
        self.snapshot.read().await.clone()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(bridge): State<Arc<StatusBridge>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, bridge))
}

async fn handle_socket(socket: WebSocket, bridge: Arc<StatusBridge>) {
    let (mut tx, mut rx) = socket.split();

    let initial = serde_json::to_string(&bridge.current().await).unwrap_or_default();
    if tx.send(Message::Text(initial.into())).await.is_err() {
        return;
    }

    let mut updates = bridge.push.subscribe();
    loop {
        tokio::select! {
            msg = updates.recv() => {
                match msg {
                    Ok(hint) => {
                        if tx.send(Message::Text(hint.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
