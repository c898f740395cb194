use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::flood::{FloodReport, GeoPoint, Terrain, MAX_SPEED, MIN_SPEED};

/// Random report scatter around a centre point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterParams {
    /// 0 picks a random seed.
    #[serde(default)]
    pub seed: u64,
    pub count: u32,
    pub center: GeoPoint,
    /// Reports land uniformly within this distance of `center`.
    pub spread_m: f64,
    /// Relative weights for low, medium and high severity.
    #[serde(default = "default_severity_weights")]
    pub severity_weights: [f64; 3],
}

fn default_severity_weights() -> [f64; 3] {
    [0.5, 0.3, 0.2]
}

/// Initial simulation contents. Stored nowhere; only used to seed a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub terrain: Terrain,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub reports: Vec<FloodReport>,
    #[serde(default)]
    pub scatter: Option<ScatterParams>,
}

fn default_name() -> String {
    "flood scenario".to_string()
}

fn default_speed() -> f64 {
    1.0
}

impl ScenarioParams {
    /// Load scenario parameters from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        let params: Self = toml::from_str(&content)
            .map_err(|e| format!("Invalid TOML in {}: {}", path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    /// Validate parameter ranges. Report geometry is checked again when added.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(format!(
                "speed must be {}-{}, got {}",
                MIN_SPEED, MAX_SPEED, self.speed
            ));
        }
        for report in &self.reports {
            if !report.center.is_valid() {
                return Err(format!(
                    "report '{}' has invalid center ({}, {})",
                    report.report_id, report.center.lat, report.center.lon
                ));
            }
            if report.initial_radius() <= 0.0 || report.growth_cap() <= 0.0 {
                return Err(format!(
                    "report '{}' radius and max_radius must be > 0",
                    report.report_id
                ));
            }
            if report.initial_radius() > report.growth_cap() {
                return Err(format!(
                    "report '{}' radius {} exceeds max_radius {}",
                    report.report_id,
                    report.initial_radius(),
                    report.growth_cap()
                ));
            }
        }
        if let Some(scatter) = &self.scatter {
            if scatter.count > 10_000 {
                return Err(format!(
                    "scatter.count must be <= 10000, got {}",
                    scatter.count
                ));
            }
            if !scatter.center.is_valid() {
                return Err(format!(
                    "scatter.center is invalid ({}, {})",
                    scatter.center.lat, scatter.center.lon
                ));
            }
            if !(scatter.spread_m > 0.0 && scatter.spread_m.is_finite()) {
                return Err(format!(
                    "scatter.spread_m must be > 0, got {}",
                    scatter.spread_m
                ));
            }
            if scatter.severity_weights.iter().any(|w| !(*w >= 0.0))
                || scatter.severity_weights.iter().sum::<f64>() <= 0.0
            {
                return Err(format!(
                    "scatter.severity_weights must be non-negative with a positive sum, got {:?}",
                    scatter.severity_weights
                ));
            }
        }
        Ok(())
    }
}
