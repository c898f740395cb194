pub mod container;
pub mod geometry;
pub mod merge;
pub mod overlap;
pub mod spread;
pub mod statistics;

use std::time::Instant;

use tracing::debug;

use crate::flood::{RegionId, SimulationState};
use crate::simulation::statistics::TickStatistics;

/// Result of executing a single tick.
#[derive(Debug)]
pub struct TickResult {
    /// False when the simulation was idle and nothing ran.
    pub advanced: bool,
    pub grown: usize,
    /// (retired id, id it was merged into).
    pub retired: Vec<(RegionId, RegionId)>,
    pub statistics: TickStatistics,
}

/// Execute a single simulation tick.
///
/// Grows every expanding region, merges overlaps, advances the tick count and
/// computes statistics. An idle state is left untouched.
pub fn execute_tick(state: &mut SimulationState) -> TickResult {
    let tick_start = Instant::now();

    let Some(outcome) = spread::advance(state) else {
        return TickResult {
            advanced: false,
            grown: 0,
            retired: Vec::new(),
            statistics: statistics::compute_statistics(state, 0, 0.0),
        };
    };

    state.tick_count += 1;

    let tick_duration = tick_start.elapsed().as_secs_f32() * 1000.0;
    let statistics =
        statistics::compute_statistics(state, outcome.merge_count() as u32, tick_duration);

    if outcome.merge_count() > 0 {
        debug!(
            tick = state.tick_count,
            merges = outcome.merge_count(),
            regions = statistics.region_count,
            "Regions merged during tick"
        );
    }

    TickResult {
        advanced: true,
        grown: outcome.grown,
        retired: outcome.retired,
        statistics,
    }
}
