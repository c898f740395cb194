use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::simulation::SimulationConfig;
use crate::flood::generation::print_state_summary;
use crate::flood::{RegionId, SimulationMode, SimulationState};
use crate::persistence::{self, Retention, SnapshotError};
use crate::server::protocol::CommandResult;
use crate::server::{self, ClientCommand, ServerState};
use crate::simulation::container::{Applied, Command, SimulationContainer};

/// Pick the starting state for `run`: an explicit snapshot, the latest valid
/// snapshot, or a fresh empty state built from config defaults.
pub fn open_state(config: &SimulationConfig, state_path: Option<&str>) -> Result<SimulationState, String> {
    let snapshot_dir = config.snapshots.directory.as_path();
    match state_path {
        Some(path) => {
            info!(path, "Loading state");
            persistence::load_snapshot(Path::new(path))
                .map_err(|e| format!("Failed to load snapshot: {}", e))
        }
        None => match persistence::load_latest_valid_snapshot(snapshot_dir) {
            Ok(state) => Ok(state),
            Err(SnapshotError::NoValidSnapshots) => {
                warn!(
                    dir = %snapshot_dir.display(),
                    "No snapshots found, starting an empty simulation"
                );
                Ok(config.flood.fresh_state())
            }
            Err(e) => Err(format!("Failed to load snapshot: {}", e)),
        },
    }
}

/// The single writer of a running simulation. Owns the container and pushes
/// every published transition to the feed server.
pub struct Runner {
    container: SimulationContainer,
    server: Arc<ServerState>,
    snapshot_dir: PathBuf,
    snapshot_interval: u32,
    retention: Retention,
    last_snapshot_tick: u64,
    ticks_since_snapshot: u32,
}

impl Runner {
    pub fn new(
        container: SimulationContainer,
        server: Arc<ServerState>,
        config: &SimulationConfig,
    ) -> Self {
        let last_snapshot_tick = container.state().tick_count;
        Runner {
            container,
            server,
            snapshot_dir: config.snapshots.directory.clone(),
            snapshot_interval: config.snapshots.every_ticks,
            retention: config.snapshots.retention(),
            last_snapshot_tick,
            ticks_since_snapshot: 0,
        }
    }

    pub fn state(&self) -> &SimulationState {
        self.container.state()
    }

    /// Advance one tick if simulating. Idle ticks publish nothing.
    pub async fn tick(&mut self) {
        let before = self.container.snapshot();
        let result = match self.container.apply(Command::Tick) {
            Ok(Applied::Ticked(result)) => result,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Tick rejected");
                return;
            }
        };
        if !result.advanced {
            return;
        }

        let tick = self.state().tick_count;
        if !result.retired.is_empty() {
            debug!(tick, merges = result.retired.len(), "Merged regions");
        }
        if tick % 100 == 0 {
            info!(
                tick,
                regions = result.statistics.region_count,
                expanding = result.statistics.expanding_count,
                area_m2 = result.statistics.total_area_m2,
                "Tick milestone"
            );
        }

        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.autosave();
        }

        let after = self.container.snapshot();
        let diff_json = server::build_diff_json(&before, &after, Some(&result.statistics));
        self.server
            .on_update(diff_json, &after, Some(&result.statistics), self.last_snapshot_tick)
            .await;
    }

    /// Apply a command from a feed client and report the outcome back to it.
    pub async fn handle_client(&mut self, pending: ClientCommand) {
        let ClientCommand { command, reply } = pending;
        let result = self.apply(command).await;
        // The client may have disconnected while waiting.
        let _ = reply.send(result);
    }

    /// Apply a command and publish the resulting diff.
    pub async fn apply(&mut self, command: Command) -> CommandResult {
        if command == Command::Tick {
            self.tick().await;
            return CommandResult::accepted(None);
        }

        let before = self.container.snapshot();
        let outcome = self.container.apply(command);
        match &outcome {
            Ok(Applied::Added(id)) => {
                info!(region = id, regions = self.state().regions.len(), "Region added")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Command rejected"),
        }
        if outcome.is_ok() {
            let after = self.container.snapshot();
            let diff_json = server::build_diff_json(&before, &after, None);
            self.server
                .on_update(diff_json, &after, None, self.last_snapshot_tick)
                .await;
        }
        CommandResult::from_outcome(&outcome)
    }

    fn autosave(&mut self) {
        match persistence::save_snapshot(self.state(), &self.snapshot_dir) {
            Ok(path) => {
                self.last_snapshot_tick = self.state().tick_count;
                self.ticks_since_snapshot = 0;
                info!(path = %path.display(), "Snapshot saved");

                if let Err(e) = persistence::prune_snapshots(&self.snapshot_dir, self.retention) {
                    warn!(error = %e, "Snapshot pruning failed");
                }
            }
            Err(e) => warn!(error = %e, "Snapshot save failed"),
        }
    }

    /// Save a final snapshot and hand back the state.
    pub fn finish(self) -> SimulationState {
        info!("Saving final snapshot");
        match persistence::save_snapshot(self.container.state(), &self.snapshot_dir) {
            Ok(path) => info!(path = %path.display(), "Final snapshot saved"),
            Err(e) => warn!(error = %e, "Final snapshot save failed"),
        }
        self.container.into_state()
    }
}

/// Run the simulation: load state, start the feed server, run the tick loop
/// until Ctrl-C.
pub async fn run_simulation(config: &SimulationConfig, state_path: Option<&str>) -> Result<(), String> {
    let state = open_state(config, state_path)?;
    info!(
        regions = state.regions.len(),
        tick = state.tick_count,
        terrain = ?state.terrain,
        "State loaded"
    );

    let mut container = SimulationContainer::new(state);
    if config.flood.autostart && container.state().mode == SimulationMode::Idle {
        container
            .apply(Command::ToggleSimulationMode)
            .map_err(|e| format!("Cannot start simulation: {}", e))?;
    }

    let (command_tx, mut command_rx) = mpsc::channel::<ClientCommand>(64);
    let server_state = Arc::new(ServerState::new(container.subscribe(), command_tx));

    let addr = config.feed.socket_addr()?;

    let feed = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = server::start_server(feed, addr).await {
            warn!(error = %e, "Server stopped");
        }
    });

    let mut runner = Runner::new(container, server_state, config);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut interval = tokio::time::interval(Duration::from_secs_f32(1.0 / config.tick_rate_hz));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_rate_hz = config.tick_rate_hz,
        snapshot_every = config.snapshots.every_ticks,
        mode = ?runner.state().mode,
        "Simulation running"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => runner.tick().await,
            Some(pending) = command_rx.recv() => runner.handle_client(pending).await,
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let state = runner.finish();
    info!(tick = state.tick_count, "Simulation stopped");
    Ok(())
}

/// Inspect a region or the state summary from the latest snapshot.
pub fn inspect(
    config: &SimulationConfig,
    region_id: Option<RegionId>,
    show_state: bool,
) -> Result<(), String> {
    let state = persistence::load_latest_valid_snapshot(&config.snapshots.directory)
        .map_err(|e| format!("Failed to load snapshot: {}", e))?;

    if let Some(id) = region_id {
        inspect_region(&state, id)
    } else if show_state {
        print_state_summary(&state);
        Ok(())
    } else {
        Err("Specify --region <ID> or --state".to_string())
    }
}

fn inspect_region(state: &SimulationState, region_id: RegionId) -> Result<(), String> {
    let region = state.region(region_id).ok_or_else(|| {
        let ids: Vec<RegionId> = state.regions.keys().copied().collect();
        format!("Region {} not found (existing ids: {:?})", region_id, ids)
    })?;

    println!("=== Region {} ===", region.id);
    println!("Reports: {}", region.report_ids.join(", "));
    println!("Center: ({:.6}, {:.6})", region.center.lat, region.center.lon);
    println!("Severity: {:?}", region.severity);
    println!("Water level: {:.2} m", region.water_level);
    println!();
    println!("--- Spread ---");
    println!("  Radius: {:.1} m", region.radius);
    println!("  Max radius: {:.1} m", region.max_radius);
    println!("  Spread rate: {:.3} ({:?} terrain)", region.spread_rate, state.terrain);
    println!("  Expanding: {}", region.is_expanding);
    println!("  Area: {:.3} km²", region.area_m2() / 1_000_000.0);
    println!("  Polygon points: {}", region.geometry_points.len());
    if state.selected_region_id == Some(region.id) {
        println!("\n(selected)");
    }

    Ok(())
}
