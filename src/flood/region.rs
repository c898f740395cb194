use serde::{Deserialize, Serialize};

/// Identifier of a flood region. Allocated monotonically by the owning state,
/// so ascending id order is insertion order.
pub type RegionId = u64;

// === Enums ===

/// Reported flood severity. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Growth factor per tick before terrain and speed are applied.
    pub fn base_spread_rate(self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 1.5,
        }
    }

    /// Growth cap in metres when the report does not carry one.
    pub fn default_max_radius(self) -> f64 {
        match self {
            Severity::Low => 300.0,
            Severity::Medium => 600.0,
            Severity::High => 1000.0,
        }
    }

    /// Starting radius in metres when the report does not carry one.
    pub fn default_initial_radius(self) -> f64 {
        match self {
            Severity::Low => 50.0,
            Severity::Medium => 100.0,
            Severity::High => 150.0,
        }
    }

    /// Initial water level in metres.
    pub fn water_level(self) -> f64 {
        match self {
            Severity::Low => 0.3,
            Severity::Medium => 0.8,
            Severity::High => 1.5,
        }
    }

    pub fn all() -> &'static [Severity] {
        &[Severity::Low, Severity::Medium, Severity::High]
    }
}

/// Global terrain setting. Scales every region's spread rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    #[default]
    Flat,
    Hilly,
    Urban,
    River,
}

impl Terrain {
    pub fn multiplier(self) -> f64 {
        match self {
            Terrain::Flat => 1.0,
            Terrain::Hilly => 0.7,
            Terrain::Urban => 0.5,
            Terrain::River => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    #[default]
    Idle,
    Simulating,
}

impl SimulationMode {
    pub fn toggled(self) -> SimulationMode {
        match self {
            SimulationMode::Idle => SimulationMode::Simulating,
            SimulationMode::Simulating => SimulationMode::Idle,
        }
    }
}

/// Spread rate for a severity under a terrain.
pub fn spread_rate_for(severity: Severity, terrain: Terrain) -> f64 {
    severity.base_spread_rate() * terrain.multiplier()
}

// === Position ===

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

// === Report / Region ===

/// A flood report as submitted from the reporting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodReport {
    pub report_id: String,
    pub center: GeoPoint,
    pub severity: Severity,
    /// Overrides the severity's default initial radius.
    #[serde(default)]
    pub radius: Option<f64>,
    /// Overrides the severity's default growth cap.
    #[serde(default)]
    pub max_radius: Option<f64>,
}

impl FloodReport {
    pub fn new(report_id: impl Into<String>, center: GeoPoint, severity: Severity) -> Self {
        FloodReport {
            report_id: report_id.into(),
            center,
            severity,
            radius: None,
            max_radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f64, max_radius: f64) -> Self {
        self.radius = Some(radius);
        self.max_radius = Some(max_radius);
        self
    }

    pub fn initial_radius(&self) -> f64 {
        self.radius
            .unwrap_or_else(|| self.severity.default_initial_radius())
    }

    pub fn growth_cap(&self) -> f64 {
        self.max_radius
            .unwrap_or_else(|| self.severity.default_max_radius())
    }
}

/// Circular approximation of a flood's extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodRegion {
    pub id: RegionId,
    /// Reports absorbed into this region, oldest survivor first.
    pub report_ids: Vec<String>,
    pub center: GeoPoint,
    pub radius: f64,
    pub max_radius: f64,
    pub spread_rate: f64,
    pub is_expanding: bool,
    pub geometry_points: Vec<GeoPoint>,
    pub severity: Severity,
    pub water_level: f64,
}

impl FloodRegion {
    /// Area of the circle in square metres.
    pub fn area_m2(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}
