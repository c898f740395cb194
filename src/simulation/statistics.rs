use std::collections::HashMap;

use crate::flood::{Severity, SimulationState};

/// Per-tick aggregate metrics for the feed and the run log.
#[derive(Debug, Clone)]
pub struct TickStatistics {
    pub tick: u64,
    pub region_count: u32,
    pub expanding_count: u32,
    pub merges: u32,
    pub severity_distribution: HashMap<Severity, u32>,
    pub total_area_m2: f64,
    pub largest_radius_m: f64,
    pub tick_duration_ms: f32,
}

/// Compute statistics for the current state after a tick.
pub fn compute_statistics(state: &SimulationState, merges: u32, tick_duration_ms: f32) -> TickStatistics {
    let mut severity_distribution: HashMap<Severity, u32> = HashMap::new();
    let mut expanding_count = 0_u32;
    let mut total_area_m2 = 0.0_f64;
    let mut largest_radius_m = 0.0_f64;

    for region in state.regions.values() {
        *severity_distribution.entry(region.severity).or_insert(0) += 1;
        if region.is_expanding {
            expanding_count += 1;
        }
        total_area_m2 += region.area_m2();
        largest_radius_m = largest_radius_m.max(region.radius);
    }

    TickStatistics {
        tick: state.tick_count,
        region_count: state.regions.len() as u32,
        expanding_count,
        merges,
        severity_distribution,
        total_area_m2,
        largest_radius_m,
        tick_duration_ms,
    }
}
