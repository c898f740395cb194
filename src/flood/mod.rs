pub mod generation;
pub mod region;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::simulation::geometry::generate_polygon;
use crate::simulation::merge::{merge_all, new_region, MergeOutcome};
use crate::simulation::overlap::overlapping_pairs;
pub use region::{
    spread_rate_for, FloodRegion, FloodReport, GeoPoint, RegionId, Severity, SimulationMode,
    Terrain,
};

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 5.0;

/// Rejected inputs and broken invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("report {report_id}: radius must be > 0, got {radius}")]
    InvalidRadius { report_id: String, radius: f64 },
    #[error("report {report_id}: max_radius must be > 0, got {max_radius}")]
    InvalidMaxRadius { report_id: String, max_radius: f64 },
    #[error("report {report_id}: radius {radius} exceeds max_radius {max_radius}")]
    RadiusExceedsMax {
        report_id: String,
        radius: f64,
        max_radius: f64,
    },
    #[error("report {report_id}: invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { report_id: String, lat: f64, lon: f64 },
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Complete simulation state. Every transition goes through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub id: Uuid,
    pub name: String,
    pub tick_count: u64,
    pub regions: BTreeMap<RegionId, FloodRegion>,
    pub next_region_id: RegionId,
    pub mode: SimulationMode,
    pub speed: f64,
    pub terrain: Terrain,
    pub selected_region_id: Option<RegionId>,
    pub show_geometry: bool,
    pub show_merged_areas: bool,
}

impl Default for SimulationState {
    fn default() -> Self {
        SimulationState::new("flood simulation")
    }
}

impl SimulationState {
    pub fn new(name: impl Into<String>) -> Self {
        SimulationState {
            id: Uuid::new_v4(),
            name: name.into(),
            tick_count: 0,
            regions: BTreeMap::new(),
            next_region_id: 1,
            mode: SimulationMode::Idle,
            speed: 1.0,
            terrain: Terrain::Flat,
            selected_region_id: None,
            show_geometry: true,
            show_merged_areas: true,
        }
    }

    /// Regions in insertion order.
    pub fn regions_in_order(&self) -> impl Iterator<Item = &FloodRegion> {
        self.regions.values()
    }

    pub fn region(&self, id: RegionId) -> Option<&FloodRegion> {
        self.regions.get(&id)
    }

    /// Add a report as a new region, merging it with everything it overlaps.
    ///
    /// Returns the id of the region that now covers the report, which is an
    /// existing region's id when the report was absorbed.
    pub fn add_region(&mut self, report: &FloodReport) -> Result<RegionId, SimulationError> {
        let radius = report.initial_radius();
        let max_radius = report.growth_cap();
        validate_report(report, radius, max_radius)?;

        let id = self.next_region_id;
        self.next_region_id += 1;

        let region = new_region(
            id,
            report.report_id.clone(),
            report.center,
            radius,
            max_radius,
            report.severity,
            self.terrain,
        );

        let mut all = Vec::with_capacity(self.regions.len() + 1);
        all.push(region);
        all.extend(std::mem::take(&mut self.regions).into_values());
        let outcome = merge_all(all, self.terrain);
        let placed = outcome.resolve(id);
        self.apply_merge_outcome(outcome);

        debug!(report = %report.report_id, region = placed, "Added flood report");
        Ok(placed)
    }

    /// Replace the region set with a merge pass result, remapping the selection
    /// to whichever region absorbed it.
    pub(crate) fn apply_merge_outcome(&mut self, outcome: MergeOutcome) {
        if let Some(selected) = self.selected_region_id {
            self.selected_region_id = Some(outcome.resolve(selected));
        }
        self.regions = outcome
            .regions
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        if self
            .selected_region_id
            .is_some_and(|selected| !self.regions.contains_key(&selected))
        {
            self.selected_region_id = None;
        }
    }

    pub fn remove_region(&mut self, id: RegionId) -> Option<FloodRegion> {
        let removed = self.regions.remove(&id);
        if self.selected_region_id == Some(id) {
            self.selected_region_id = None;
        }
        removed
    }

    /// Selection is not checked here; removals clear stale selections.
    pub fn select_region(&mut self, id: Option<RegionId>) {
        self.selected_region_id = id;
    }

    /// Change terrain and recompute every spread rate. Radius and geometry stay put.
    pub fn set_terrain(&mut self, terrain: Terrain) {
        self.terrain = terrain;
        for region in self.regions.values_mut() {
            region.spread_rate = spread_rate_for(region.severity, terrain);
        }
    }

    pub fn set_simulation_speed(&mut self, speed: f64) {
        if speed.is_nan() {
            warn!("Ignoring NaN simulation speed");
            return;
        }
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn toggle_simulation_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn toggle_geometry_visibility(&mut self) {
        self.show_geometry = !self.show_geometry;
    }

    pub fn toggle_merged_areas_visibility(&mut self) {
        self.show_merged_areas = !self.show_merged_areas;
    }

    pub fn clear_all(&mut self) {
        self.regions.clear();
        self.selected_region_id = None;
    }

    /// Verify the state-level invariants. Used when loading persisted state.
    pub fn check_invariants(&self) -> Result<(), SimulationError> {
        let violation = |msg: String| Err(SimulationError::InvariantViolation(msg));

        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return violation(format!("speed {} outside [{}, {}]", self.speed, MIN_SPEED, MAX_SPEED));
        }

        for (&key, region) in &self.regions {
            if key != region.id {
                return violation(format!("region stored under {} has id {}", key, region.id));
            }
            if region.id >= self.next_region_id {
                return violation(format!(
                    "region {} not below next id {}",
                    region.id, self.next_region_id
                ));
            }
            if !(region.radius > 0.0 && region.radius <= region.max_radius) {
                return violation(format!(
                    "region {} radius {} outside (0, {}]",
                    region.id, region.radius, region.max_radius
                ));
            }
            if region.geometry_points != generate_polygon(region.center, region.radius) {
                return violation(format!("region {} has stale geometry", region.id));
            }
        }

        let regions: Vec<FloodRegion> = self.regions.values().cloned().collect();
        if let Some(&(i, j)) = overlapping_pairs(&regions).first() {
            return violation(format!(
                "regions {} and {} overlap",
                regions[i].id, regions[j].id
            ));
        }

        if let Some(selected) = self.selected_region_id {
            if !self.regions.contains_key(&selected) {
                return violation(format!("selected region {} does not exist", selected));
            }
        }

        Ok(())
    }
}

fn validate_report(report: &FloodReport, radius: f64, max_radius: f64) -> Result<(), SimulationError> {
    let report_id = report.report_id.clone();
    if !report.center.is_valid() {
        return Err(SimulationError::InvalidCoordinate {
            report_id,
            lat: report.center.lat,
            lon: report.center.lon,
        });
    }
    if !(radius > 0.0 && radius.is_finite()) {
        return Err(SimulationError::InvalidRadius { report_id, radius });
    }
    if !(max_radius > 0.0 && max_radius.is_finite()) {
        return Err(SimulationError::InvalidMaxRadius {
            report_id,
            max_radius,
        });
    }
    if radius > max_radius {
        return Err(SimulationError::RadiusExceedsMax {
            report_id,
            radius,
            max_radius,
        });
    }
    Ok(())
}
