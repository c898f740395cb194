use crate::flood::{FloodRegion, RegionId, SimulationMode, SimulationState};
use crate::simulation::geometry::generate_polygon;
use crate::simulation::merge::merge_all;

/// Fraction of the spread rate applied per tick at speed 1.0.
pub const GROWTH_STEP: f64 = 0.05;

/// What one spread step did to the region set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpreadOutcome {
    /// Regions whose radius changed this step.
    pub grown: usize,
    /// (retired id, id it was merged into), in merge order.
    pub retired: Vec<(RegionId, RegionId)>,
}

impl SpreadOutcome {
    pub fn merge_count(&self) -> usize {
        self.retired.len()
    }
}

/// Grow one region by a single tick. Regions that stopped expanding are left alone.
///
/// Returns true if the radius changed.
pub fn grow_region(region: &mut FloodRegion, speed: f64) -> bool {
    if !region.is_expanding {
        return false;
    }
    let grown = (region.radius * (1.0 + region.spread_rate * speed * GROWTH_STEP)).min(region.max_radius);
    debug_assert!(grown >= region.radius, "radius shrank: {} -> {}", region.radius, grown);

    let changed = grown != region.radius;
    region.radius = grown;
    region.is_expanding = grown < region.max_radius;
    if changed {
        region.geometry_points = generate_polygon(region.center, grown);
    }
    changed
}

/// Advance every expanding region, then merge anything that now overlaps.
///
/// Returns `None` without touching the state when the simulation is idle.
pub fn advance(state: &mut SimulationState) -> Option<SpreadOutcome> {
    if state.mode != SimulationMode::Simulating {
        return None;
    }

    let speed = state.speed;
    let mut grown = 0;
    for region in state.regions.values_mut() {
        if grow_region(region, speed) {
            grown += 1;
        }
    }

    let regions = std::mem::take(&mut state.regions).into_values().collect();
    let outcome = merge_all(regions, state.terrain);
    let retired = outcome.retired.clone();
    state.apply_merge_outcome(outcome);

    Some(SpreadOutcome { grown, retired })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flood::{FloodReport, GeoPoint, Severity, Terrain};
    use crate::simulation::overlap::overlapping_pairs;

    fn simulating_state() -> SimulationState {
        let mut state = SimulationState::new("test");
        state.toggle_simulation_mode();
        state
    }

    fn report(id: &str, lat: f64, lon: f64, radius: f64, max_radius: f64) -> FloodReport {
        FloodReport::new(id, GeoPoint::new(lat, lon), Severity::Medium).with_radius(radius, max_radius)
    }

    #[test]
    fn growth_follows_formula() {
        let mut state = simulating_state();
        state.set_simulation_speed(2.0);
        let id = state.add_region(&report("a", 0.0, 0.0, 100.0, 500.0)).unwrap();

        advance(&mut state);
        let region = state.region(id).unwrap();
        // Medium on flat: rate 1.0, so 100 * (1 + 1.0 * 2.0 * 0.05).
        assert!((region.radius - 110.0).abs() < 1e-9, "got {}", region.radius);
        assert_eq!(region.geometry_points, generate_polygon(region.center, region.radius));
    }

    #[test]
    fn idle_state_is_unchanged() {
        let mut state = SimulationState::new("test");
        state.add_region(&report("a", 0.0, 0.0, 100.0, 500.0)).unwrap();
        let before = state.clone();
        assert!(advance(&mut state).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn radius_never_exceeds_max() {
        let mut state = simulating_state();
        state.set_simulation_speed(5.0);
        state.set_terrain(Terrain::River);
        let id = state.add_region(&report("a", 0.0, 0.0, 100.0, 130.0)).unwrap();

        for _ in 0..20 {
            advance(&mut state);
            let region = state.region(id).unwrap();
            assert!(region.radius > 0.0 && region.radius <= region.max_radius);
        }
        let region = state.region(id).unwrap();
        assert_eq!(region.radius, 130.0);
        assert!(!region.is_expanding);
    }

    #[test]
    fn region_at_max_stops_and_stays() {
        let mut state = simulating_state();
        let id = state.add_region(&report("a", 0.0, 0.0, 200.0, 200.0)).unwrap();
        assert!(!state.region(id).unwrap().is_expanding);

        advance(&mut state);
        let region = state.region(id).unwrap();
        assert!(!region.is_expanding);
        assert_eq!(region.radius, 200.0);
    }

    #[test]
    fn radius_monotonic_until_stopped() {
        let mut state = simulating_state();
        let id = state.add_region(&report("a", 0.0, 0.0, 100.0, 300.0)).unwrap();

        let mut last = state.region(id).unwrap().radius;
        let mut stopped_at: Option<f64> = None;
        for _ in 0..60 {
            advance(&mut state);
            let region = state.region(id).unwrap();
            assert!(region.radius >= last);
            if let Some(r) = stopped_at {
                assert_eq!(region.radius, r);
            } else if !region.is_expanding {
                stopped_at = Some(region.radius);
            }
            last = region.radius;
        }
        assert_eq!(stopped_at, Some(300.0));
    }

    #[test]
    fn river_spreads_faster_than_urban() {
        let run = |terrain: Terrain| {
            let mut state = simulating_state();
            state.set_terrain(terrain);
            let id = state.add_region(&report("a", 0.0, 0.0, 100.0, 10_000.0)).unwrap();
            for _ in 0..10 {
                advance(&mut state);
            }
            state.region(id).unwrap().radius
        };
        let river = run(Terrain::River);
        let urban = run(Terrain::Urban);
        assert!(river > urban, "river {} <= urban {}", river, urban);
    }

    #[test]
    fn growing_regions_merge_once_they_touch() {
        let mut state = simulating_state();
        state.set_simulation_speed(5.0);
        // 300 m apart, 100 m each: separate until growth closes the gap.
        state.add_region(&report("a", 0.0, 0.0, 100.0, 400.0)).unwrap();
        state.add_region(&report("b", 0.0, 300.0 / 111_320.0, 100.0, 400.0)).unwrap();
        assert_eq!(state.regions.len(), 2);

        let mut merged_on = None;
        for tick in 0..20 {
            let outcome = advance(&mut state).unwrap();
            assert!(overlapping_pairs(&state.regions.values().cloned().collect::<Vec<_>>()).is_empty());
            if outcome.merge_count() > 0 {
                merged_on = Some(tick);
                break;
            }
        }
        assert!(merged_on.is_some());
        assert_eq!(state.regions.len(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn no_overlaps_after_any_tick() {
        let mut state = simulating_state();
        state.set_simulation_speed(3.0);
        for i in 0..12 {
            let lat = (i / 4) as f64 * 0.004;
            let lon = (i % 4) as f64 * 0.004;
            state.add_region(&report(&format!("r{i}"), lat, lon, 60.0, 600.0)).unwrap();
        }
        for _ in 0..30 {
            advance(&mut state);
            state.check_invariants().unwrap();
        }
    }
}
