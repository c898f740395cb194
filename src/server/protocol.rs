use serde::Serialize;
use std::collections::HashMap;

use crate::flood::{
    FloodRegion, GeoPoint, RegionId, Severity, SimulationError, SimulationMode, SimulationState,
    Terrain,
};
use crate::simulation::container::Applied;
use crate::simulation::statistics::TickStatistics;

/// Complete simulation state sent to a client on connect and from `GET /state`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSnapshot {
    pub message_type: &'static str,
    pub state_id: String,
    pub name: String,
    pub tick: u64,
    pub flags: StateFlags,
    pub regions: Vec<RegionSnapshot>,
}

/// Global settings and UI flags, sent with every snapshot and diff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateFlags {
    pub mode: SimulationMode,
    pub speed: f64,
    pub terrain: Terrain,
    pub selected_region_id: Option<RegionId>,
    pub show_geometry: bool,
    pub show_merged_areas: bool,
}

/// A region's complete state as rendered by map clients.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSnapshot {
    pub id: RegionId,
    pub report_ids: Vec<String>,
    pub center: GeoPoint,
    pub radius: f64,
    pub max_radius: f64,
    pub spread_rate: f64,
    pub is_expanding: bool,
    pub severity: Severity,
    pub water_level: f64,
    pub geometry: Vec<GeoPoint>,
}

/// Changes sent after each applied transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateDiff {
    pub message_type: &'static str,
    pub tick: u64,
    pub flags: StateFlags,
    /// Added or modified regions, in id order.
    pub changed_regions: Vec<RegionSnapshot>,
    pub removed_regions: Vec<RegionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<TickStatSummary>,
}

/// Summary statistics included in tick diffs.
#[derive(Debug, Clone, Serialize)]
pub struct TickStatSummary {
    pub tick: u64,
    pub region_count: u32,
    pub expanding_count: u32,
    pub merges: u32,
    pub severity_distribution: HashMap<String, u32>,
    pub total_area_m2: f64,
    pub largest_radius_m: f64,
    pub tick_duration_ms: f32,
}

/// Reply to a client command, sent only to the client that issued it.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub message_type: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub tick: u64,
    pub tick_rate: f32,
    pub mode: SimulationMode,
    pub region_count: u32,
    pub expanding_count: u32,
    pub snapshot_age_ticks: u64,
}

impl StateFlags {
    pub fn from_state(state: &SimulationState) -> Self {
        StateFlags {
            mode: state.mode,
            speed: state.speed,
            terrain: state.terrain,
            selected_region_id: state.selected_region_id,
            show_geometry: state.show_geometry,
            show_merged_areas: state.show_merged_areas,
        }
    }
}

impl SimulationSnapshot {
    pub fn from_state(state: &SimulationState) -> Self {
        SimulationSnapshot {
            message_type: "SimulationSnapshot",
            state_id: state.id.to_string(),
            name: state.name.clone(),
            tick: state.tick_count,
            flags: StateFlags::from_state(state),
            regions: state.regions_in_order().map(RegionSnapshot::from_region).collect(),
        }
    }
}

impl RegionSnapshot {
    pub fn from_region(region: &FloodRegion) -> Self {
        RegionSnapshot {
            id: region.id,
            report_ids: region.report_ids.clone(),
            center: region.center,
            radius: region.radius,
            max_radius: region.max_radius,
            spread_rate: region.spread_rate,
            is_expanding: region.is_expanding,
            severity: region.severity,
            water_level: region.water_level,
            geometry: region.geometry_points.clone(),
        }
    }
}

impl TickStatSummary {
    pub fn from_statistics(stats: &TickStatistics) -> Self {
        TickStatSummary {
            tick: stats.tick,
            region_count: stats.region_count,
            expanding_count: stats.expanding_count,
            merges: stats.merges,
            severity_distribution: stats
                .severity_distribution
                .iter()
                .map(|(k, v)| (format!("{:?}", k).to_lowercase(), *v))
                .collect(),
            total_area_m2: stats.total_area_m2,
            largest_radius_m: stats.largest_radius_m,
            tick_duration_ms: stats.tick_duration_ms,
        }
    }
}

impl CommandResult {
    pub fn accepted(region_id: Option<RegionId>) -> Self {
        CommandResult {
            message_type: "CommandResult",
            ok: true,
            region_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        CommandResult {
            message_type: "CommandResult",
            ok: false,
            region_id: None,
            error: Some(error.into()),
        }
    }

    pub fn from_outcome(outcome: &Result<Applied, SimulationError>) -> Self {
        match outcome {
            Ok(Applied::Added(id)) => Self::accepted(Some(*id)),
            Ok(_) => Self::accepted(None),
            Err(e) => Self::rejected(e.to_string()),
        }
    }
}

/// Regions added or changed between two states, and ids that disappeared.
pub fn compute_region_diffs(
    before: &SimulationState,
    after: &SimulationState,
) -> (Vec<RegionSnapshot>, Vec<RegionId>) {
    let changed = after
        .regions_in_order()
        .filter(|region| before.region(region.id) != Some(*region))
        .map(RegionSnapshot::from_region)
        .collect();
    let removed = before
        .regions
        .keys()
        .filter(|id| !after.regions.contains_key(*id))
        .copied()
        .collect();
    (changed, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flood::FloodReport;

    fn state_with_regions() -> SimulationState {
        let mut state = SimulationState::new("protocol test");
        state
            .add_region(&FloodReport::new("a", GeoPoint::new(0.0, 0.0), Severity::Low))
            .unwrap();
        state
            .add_region(&FloodReport::new("b", GeoPoint::new(1.0, 1.0), Severity::High))
            .unwrap();
        state
    }

    #[test]
    fn snapshot_contains_all_regions_in_order() {
        let state = state_with_regions();
        let snapshot = SimulationSnapshot::from_state(&state);
        assert_eq!(snapshot.message_type, "SimulationSnapshot");
        assert_eq!(snapshot.regions.len(), 2);
        assert_eq!(snapshot.regions[0].report_ids, vec!["a".to_string()]);
        assert_eq!(snapshot.regions[1].geometry.len(), 33);
    }

    #[test]
    fn snapshot_json_shape() {
        let state = state_with_regions();
        let json = serde_json::to_value(SimulationSnapshot::from_state(&state)).unwrap();
        assert_eq!(json["flags"]["mode"], "idle");
        assert_eq!(json["flags"]["terrain"], "flat");
        assert_eq!(json["regions"][1]["severity"], "high");
        assert!(json["regions"][0]["center"]["lat"].is_number());
    }

    #[test]
    fn diff_reports_changed_and_removed() {
        let before = state_with_regions();
        let mut after = before.clone();
        after.remove_region(1);
        after.toggle_simulation_mode();
        after.set_simulation_speed(5.0);
        crate::simulation::spread::advance(&mut after);

        let (changed, removed) = compute_region_diffs(&before, &after);
        assert_eq!(removed, vec![1]);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, 2);
    }

    #[test]
    fn diff_empty_when_nothing_changed() {
        let state = state_with_regions();
        let (changed, removed) = compute_region_diffs(&state, &state);
        assert!(changed.is_empty());
        assert!(removed.is_empty());
    }

    #[test]
    fn severity_keys_are_lowercase() {
        let state = state_with_regions();
        let stats = crate::simulation::statistics::compute_statistics(&state, 0, 1.0);
        let summary = TickStatSummary::from_statistics(&stats);
        assert_eq!(summary.severity_distribution["low"], 1);
        assert_eq!(summary.severity_distribution["high"], 1);
    }

    #[test]
    fn command_result_omits_empty_fields() {
        let json = serde_json::to_value(CommandResult::accepted(None)).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json.get("error").is_none());
        assert!(json.get("region_id").is_none());

        let json = serde_json::to_value(CommandResult::rejected("nope")).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "nope");
    }

    #[test]
    fn command_result_from_outcome() {
        let added = CommandResult::from_outcome(&Ok(Applied::Added(7)));
        assert!(added.ok);
        assert_eq!(added.region_id, Some(7));

        let failed = CommandResult::from_outcome(&Err(SimulationError::InvalidRadius {
            report_id: "x".to_string(),
            radius: -1.0,
        }));
        assert!(!failed.ok);
        assert!(failed.error.is_some());
    }
}
