use glam::DVec2;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use uuid::Uuid;

use crate::config::scenario::{ScatterParams, ScenarioParams};
use crate::flood::{FloodReport, Severity, SimulationError, SimulationState};
use crate::simulation::geometry::offset_point;

/// Build a new simulation state from scenario parameters.
///
/// Explicit reports are added first, in file order, then the scatter. A
/// scatter seed of 0 is replaced with a random one; with a fixed seed the
/// resulting state is fully reproducible, id included.
pub fn build_state(params: &ScenarioParams) -> Result<SimulationState, SimulationError> {
    let mut state = SimulationState::new(params.name.clone());
    state.set_terrain(params.terrain);
    state.set_simulation_speed(params.speed);

    for report in &params.reports {
        state.add_region(report)?;
    }

    if let Some(scatter) = &params.scatter {
        let seed = if scatter.seed == 0 {
            rand::thread_rng().r#gen()
        } else {
            scatter.seed
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        state.id = Uuid::from_bytes(rng.r#gen());

        for report in scatter_reports(scatter, seed, &mut rng) {
            state.add_region(&report)?;
        }
        info!(seed, count = scatter.count, regions = state.regions.len(), "Scattered reports");
    }

    Ok(state)
}

fn scatter_reports(scatter: &ScatterParams, seed: u64, rng: &mut ChaCha8Rng) -> Vec<FloodReport> {
    let severities = Severity::all();
    let weights = WeightedIndex::new(scatter.severity_weights).ok();

    (0..scatter.count)
        .map(|i| {
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            // sqrt keeps the density uniform over the disc
            let distance = scatter.spread_m * rng.r#gen::<f64>().sqrt();
            let center = offset_point(scatter.center, DVec2::from_angle(angle) * distance);
            let severity = match &weights {
                Some(w) => severities[w.sample(rng)],
                None => Severity::Medium,
            };
            FloodReport::new(format!("scatter-{seed}-{i}"), center, severity)
        })
        .collect()
}

/// Print a summary of a simulation state.
pub fn print_state_summary(state: &SimulationState) {
    println!("=== Simulation Summary ===");
    println!("Name: {}", state.name);
    println!("ID: {}", state.id);
    println!("Tick: {}", state.tick_count);
    println!("Mode: {:?}", state.mode);
    println!("Terrain: {:?} (x{:.1})", state.terrain, state.terrain.multiplier());
    println!("Speed: {:.2}", state.speed);
    println!("Regions: {}", state.regions.len());

    println!("\nSeverity:");
    for severity in Severity::all() {
        let count = state
            .regions
            .values()
            .filter(|r| r.severity == *severity)
            .count();
        println!("  {:<8} {:>5}", format!("{:?}", severity), count);
    }

    let expanding = state.regions.values().filter(|r| r.is_expanding).count();
    let area_km2: f64 = state.regions.values().map(|r| r.area_m2()).sum::<f64>() / 1_000_000.0;
    let reports: usize = state.regions.values().map(|r| r.report_ids.len()).sum();
    println!("\nExpanding: {}", expanding);
    println!("Reports covered: {}", reports);
    println!("Flooded area: {:.3} km²", area_km2);
}
