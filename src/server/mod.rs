pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::flood::{SimulationMode, SimulationState};
use crate::simulation::container::Command;
use crate::simulation::statistics::TickStatistics;
use protocol::{
    compute_region_diffs, CommandResult, HealthStatus, SimulationSnapshot, StateDiff, StateFlags,
    TickStatSummary,
};

/// A client command on its way to the simulation writer, with a reply slot
/// for the issuing connection.
pub struct ClientCommand {
    pub command: Command,
    pub reply: oneshot::Sender<CommandResult>,
}

/// Shared server state accessible from all connection handlers and the simulation loop.
pub struct ServerState {
    /// Latest published simulation state, used for new connections and `GET /state`.
    pub snapshots: watch::Receiver<Arc<SimulationState>>,
    /// Broadcast channel for state diffs.
    pub diff_sender: broadcast::Sender<String>,
    /// Commands forwarded to the single writer.
    pub commands: mpsc::Sender<ClientCommand>,
    /// Health data updated after each transition.
    pub health: RwLock<HealthData>,
}

/// Data needed for the health endpoint.
pub struct HealthData {
    pub tick: u64,
    pub mode: SimulationMode,
    pub region_count: u32,
    pub expanding_count: u32,
    pub last_snapshot_tick: u64,
    pub recent_tick_durations_ms: Vec<f32>,
}

impl HealthData {
    pub fn tick_rate(&self) -> f32 {
        if self.recent_tick_durations_ms.is_empty() {
            return 0.0;
        }
        let avg_ms: f32 = self.recent_tick_durations_ms.iter().sum::<f32>()
            / self.recent_tick_durations_ms.len() as f32;
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }
}

impl ServerState {
    pub fn new(
        snapshots: watch::Receiver<Arc<SimulationState>>,
        commands: mpsc::Sender<ClientCommand>,
    ) -> Self {
        let (tx, _) = broadcast::channel(64);
        let current = snapshots.borrow().clone();
        ServerState {
            snapshots,
            diff_sender: tx,
            commands,
            health: RwLock::new(HealthData {
                tick: current.tick_count,
                mode: current.mode,
                region_count: current.regions.len() as u32,
                expanding_count: current.regions.values().filter(|r| r.is_expanding).count()
                    as u32,
                last_snapshot_tick: current.tick_count,
                recent_tick_durations_ms: Vec::new(),
            }),
        }
    }

    /// Update server state after a transition is applied.
    /// `stats` is present only for ticks that advanced the simulation.
    pub async fn on_update(
        &self,
        diff_json: String,
        state: &SimulationState,
        stats: Option<&TickStatistics>,
        last_snapshot_tick: u64,
    ) {
        // No receivers is fine
        let _ = self.diff_sender.send(diff_json);

        let mut health = self.health.write().await;
        health.tick = state.tick_count;
        health.mode = state.mode;
        health.region_count = state.regions.len() as u32;
        health.expanding_count = state.regions.values().filter(|r| r.is_expanding).count() as u32;
        health.last_snapshot_tick = last_snapshot_tick;
        if let Some(stats) = stats {
            health.recent_tick_durations_ms.push(stats.tick_duration_ms);
            if health.recent_tick_durations_ms.len() > 100 {
                health.recent_tick_durations_ms.remove(0);
            }
        }
    }
}

/// Build the JSON diff message between two published states.
pub fn build_diff_json(
    before: &SimulationState,
    after: &SimulationState,
    stats: Option<&TickStatistics>,
) -> String {
    let (changed_regions, removed_regions) = compute_region_diffs(before, after);
    let diff = StateDiff {
        message_type: "StateDiff",
        tick: after.tick_count,
        flags: StateFlags::from_state(after),
        changed_regions,
        removed_regions,
        statistics: stats.map(TickStatSummary::from_statistics),
    };
    serde_json::to_string(&diff).unwrap_or_else(|_| "{}".to_string())
}

/// Build the JSON snapshot message for a state.
pub fn build_snapshot_json(state: &SimulationState) -> String {
    let snapshot = SimulationSnapshot::from_state(state);
    serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
}

/// Start the WebSocket + HTTP server on the given address.
pub async fn start_server(
    state: Arc<ServerState>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Flood feed listening on ws://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                error!(%peer, "Connection error: {}", e);
            }
        });
    }
}

/// Route an incoming TCP connection to WebSocket or HTTP.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = [0u8; 512];
    let n = stream.peek(&mut buf).await?;
    let request_line = String::from_utf8_lossy(&buf[..n]).to_lowercase();

    if request_line.contains("upgrade: websocket") {
        handle_websocket(stream, peer, state).await
    } else if request_line.starts_with("get /health") {
        handle_health_request(stream, state).await
    } else if request_line.starts_with("get /state") {
        handle_state_request(stream, state).await
    } else {
        debug!(%peer, "Unknown HTTP request");
        respond(stream, "404 Not Found", "text/plain", "not found").await
    }
}

/// Handle a WebSocket connection: send a snapshot, then stream diffs and
/// forward client commands.
async fn handle_websocket(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!(%peer, "WebSocket connected");

    let (mut write, mut read) = futures_util::StreamExt::split(ws_stream);

    // Subscribe before reading the snapshot so no diff falls in between.
    // A diff already reflected in the snapshot carries full region state and
    // is safe to apply twice.
    let mut rx = state.diff_sender.subscribe();
    let current = state.snapshots.borrow().clone();
    let snapshot = build_snapshot_json(&current);
    futures_util::SinkExt::send(&mut write, Message::Text(snapshot.into())).await?;

    loop {
        tokio::select! {
            diff = rx.recv() => {
                match diff {
                    Ok(json) => {
                        if futures_util::SinkExt::send(&mut write, Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, lagged = n, "Client lagged behind on diffs");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = futures_util::StreamExt::next(&mut read) => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = forward_command(&state, text.as_str()).await;
                        let json = serde_json::to_string(&reply)?;
                        if futures_util::SinkExt::send(&mut write, Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    info!(%peer, "WebSocket disconnected");
    Ok(())
}

/// Parse a client command and hand it to the simulation writer.
async fn forward_command(state: &ServerState, text: &str) -> CommandResult {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => return CommandResult::rejected(format!("Invalid command: {}", e)),
    };
    debug!(?command, "Forwarding client command");

    let (reply, reply_rx) = oneshot::channel();
    if state
        .commands
        .send(ClientCommand { command, reply })
        .await
        .is_err()
    {
        return CommandResult::rejected("Simulation is shutting down");
    }
    reply_rx
        .await
        .unwrap_or_else(|_| CommandResult::rejected("Simulation is shutting down"))
}

/// Handle an HTTP health request.
async fn handle_health_request(
    stream: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let body = {
        let health = state.health.read().await;
        let status = HealthStatus {
            tick: health.tick,
            tick_rate: health.tick_rate(),
            mode: health.mode,
            region_count: health.region_count,
            expanding_count: health.expanding_count,
            snapshot_age_ticks: health.tick.saturating_sub(health.last_snapshot_tick),
        };
        serde_json::to_string(&status)?
    };
    respond(stream, "200 OK", "application/json", &body).await
}

/// Handle an HTTP request for the full current state.
async fn handle_state_request(
    stream: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let current = state.snapshots.borrow().clone();
    let body = build_snapshot_json(&current);
    respond(stream, "200 OK", "application/json", &body).await
}

async fn respond(
    mut stream: TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Read and discard the full HTTP request
    let mut buf = vec![0u8; 4096];
    let _ = stream.read(&mut buf).await?;

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nCache-Control: no-cache\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(())
}
