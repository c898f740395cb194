use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::warn;

use crate::flood::{FloodReport, RegionId, SimulationError, SimulationState, Terrain};
use crate::simulation::{self, TickResult};

/// A state transition request. Inbound feed messages deserialize straight into this.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    AddRegion { report: FloodReport },
    RemoveRegion { id: RegionId },
    SelectRegion { id: Option<RegionId> },
    SetTerrain { terrain: Terrain },
    SetSimulationSpeed { speed: f64 },
    ToggleSimulationMode,
    ToggleGeometryVisibility,
    ToggleMergedAreasVisibility,
    ClearAll,
    Tick,
}

/// What applying a command produced.
#[derive(Debug)]
pub enum Applied {
    /// The report now lives in this region.
    Added(RegionId),
    Ticked(TickResult),
    Done,
}

/// Single writer over a `SimulationState`. Every applied command publishes a
/// fresh immutable snapshot that any number of readers can watch.
pub struct SimulationContainer {
    state: SimulationState,
    publisher: watch::Sender<Arc<SimulationState>>,
}

impl SimulationContainer {
    pub fn new(state: SimulationState) -> Self {
        let (publisher, _) = watch::channel(Arc::new(state.clone()));
        SimulationContainer { state, publisher }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SimulationState> {
        self.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SimulationState>> {
        self.publisher.subscribe()
    }

    /// Apply one command and publish the result. A rejected command leaves the
    /// state and the published snapshot untouched.
    pub fn apply(&mut self, command: Command) -> Result<Applied, SimulationError> {
        let mut publish = true;
        let applied = match command {
            Command::AddRegion { report } => Applied::Added(self.state.add_region(&report)?),
            Command::RemoveRegion { id } => {
                if self.state.remove_region(id).is_none() {
                    warn!(region = id, "Remove requested for unknown region");
                }
                Applied::Done
            }
            Command::SelectRegion { id } => {
                // Published states never carry a dangling selection.
                if id.is_some_and(|id| self.state.region(id).is_none()) {
                    warn!(region = ?id, "Select requested for unknown region");
                } else {
                    self.state.select_region(id);
                }
                Applied::Done
            }
            Command::SetTerrain { terrain } => {
                self.state.set_terrain(terrain);
                Applied::Done
            }
            Command::SetSimulationSpeed { speed } => {
                self.state.set_simulation_speed(speed);
                Applied::Done
            }
            Command::ToggleSimulationMode => {
                self.state.toggle_simulation_mode();
                Applied::Done
            }
            Command::ToggleGeometryVisibility => {
                self.state.toggle_geometry_visibility();
                Applied::Done
            }
            Command::ToggleMergedAreasVisibility => {
                self.state.toggle_merged_areas_visibility();
                Applied::Done
            }
            Command::ClearAll => {
                self.state.clear_all();
                Applied::Done
            }
            Command::Tick => {
                let result = simulation::execute_tick(&mut self.state);
                // An idle tick leaves the state untouched.
                publish = result.advanced;
                Applied::Ticked(result)
            }
        };
        if publish {
            self.publish();
        }
        Ok(applied)
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.state.clone()));
    }

    pub fn into_state(self) -> SimulationState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flood::{GeoPoint, Severity, SimulationMode};

    fn add(lat: f64, lon: f64) -> Command {
        Command::AddRegion {
            report: FloodReport::new("r", GeoPoint::new(lat, lon), Severity::Medium),
        }
    }

    #[test]
    fn readers_see_published_snapshots() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        let mut rx = container.subscribe();
        assert!(rx.borrow_and_update().regions.is_empty());

        container.apply(add(0.0, 0.0)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().regions.len(), 1);
        assert_eq!(container.snapshot().regions.len(), 1);
    }

    #[test]
    fn old_snapshot_is_not_mutated() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        container.apply(add(0.0, 0.0)).unwrap();
        let before = container.snapshot();

        container.apply(Command::ClearAll).unwrap();
        assert_eq!(before.regions.len(), 1);
        assert!(container.snapshot().regions.is_empty());
    }

    #[test]
    fn rejected_command_publishes_nothing() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        let mut rx = container.subscribe();
        rx.borrow_and_update();

        let bad = Command::AddRegion {
            report: FloodReport::new("bad", GeoPoint::new(0.0, 0.0), Severity::Low).with_radius(-5.0, 10.0),
        };
        assert!(container.apply(bad).is_err());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn selecting_unknown_region_keeps_selection() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        container.apply(add(0.0, 0.0)).unwrap();
        container.apply(Command::SelectRegion { id: Some(1) }).unwrap();
        container.apply(Command::SelectRegion { id: Some(99) }).unwrap();
        assert_eq!(container.snapshot().selected_region_id, Some(1));
        container.snapshot().check_invariants().unwrap();

        container.apply(Command::SelectRegion { id: None }).unwrap();
        assert_eq!(container.snapshot().selected_region_id, None);
    }

    #[test]
    fn tick_command_runs_simulation() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        container.apply(add(0.0, 0.0)).unwrap();
        container.apply(Command::ToggleSimulationMode).unwrap();
        assert_eq!(container.state().mode, SimulationMode::Simulating);

        match container.apply(Command::Tick).unwrap() {
            Applied::Ticked(result) => assert!(result.advanced),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(container.snapshot().tick_count, 1);
    }

    #[test]
    fn idle_tick_publishes_nothing() {
        let mut container = SimulationContainer::new(SimulationState::new("test"));
        container.apply(add(0.0, 0.0)).unwrap();
        let mut rx = container.subscribe();
        rx.borrow_and_update();

        match container.apply(Command::Tick).unwrap() {
            Applied::Ticked(result) => assert!(!result.advanced),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!rx.has_changed().unwrap());
        assert_eq!(container.snapshot().tick_count, 0);
    }

    #[test]
    fn commands_parse_from_json() {
        let cmd: Command = serde_json::from_str(
            r#"{"command":"add_region","report":{"report_id":"x","center":{"lat":1.0,"lon":2.0},"severity":"high"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddRegion {
                report: FloodReport::new("x", GeoPoint::new(1.0, 2.0), Severity::High)
            }
        );

        let cmd: Command = serde_json::from_str(r#"{"command":"set_terrain","terrain":"river"}"#).unwrap();
        assert_eq!(cmd, Command::SetTerrain { terrain: Terrain::River });

        let cmd: Command = serde_json::from_str(r#"{"command":"select_region","id":null}"#).unwrap();
        assert_eq!(cmd, Command::SelectRegion { id: None });

        let cmd: Command = serde_json::from_str(r#"{"command":"toggle_simulation_mode"}"#).unwrap();
        assert_eq!(cmd, Command::ToggleSimulationMode);
    }
}
