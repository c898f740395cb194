//! `config.toml` for `floodspread run`.
//!
//! ```toml
//! tick_rate_hz = 2.0
//! log_level = "info"
//!
//! [feed]
//! bind = "127.0.0.1"
//! port = 8118
//!
//! [flood]            # starting point when there is no snapshot to resume
//! name = "flood simulation"
//! terrain = "flat"
//! speed = 1.0
//! autostart = false
//!
//! [snapshots]
//! directory = "./snapshots"
//! every_ticks = 100
//! keep = 10
//! keep_seed = true
//! ```
//!
//! Every key is optional. Unknown keys are rejected so a misspelt setting is
//! not silently ignored.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::flood::{SimulationState, Terrain, MAX_SPEED, MIN_SPEED};
use crate::persistence::Retention;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub tick_rate_hz: f32,
    pub log_level: String,
    pub feed: FeedConfig,
    pub flood: FloodDefaults,
    pub snapshots: SnapshotPolicy,
}

/// Where the live WebSocket feed listens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub bind: String,
    pub port: u16,
}

/// The empty simulation created when no snapshot can be resumed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FloodDefaults {
    pub name: String,
    pub terrain: Terrain,
    pub speed: f64,
    /// Start spreading immediately instead of waiting for a client to toggle the mode.
    /// Also applies to a resumed snapshot that was saved idle.
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotPolicy {
    pub directory: PathBuf,
    /// Autosave after this many advanced ticks.
    pub every_ticks: u32,
    pub keep: u32,
    pub keep_seed: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_rate_hz: 2.0,
            log_level: "info".to_string(),
            feed: FeedConfig::default(),
            flood: FloodDefaults::default(),
            snapshots: SnapshotPolicy::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            bind: "127.0.0.1".to_string(),
            port: 8118,
        }
    }
}

impl Default for FloodDefaults {
    fn default() -> Self {
        FloodDefaults {
            name: "flood simulation".to_string(),
            terrain: Terrain::Flat,
            speed: 1.0,
            autostart: false,
        }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy {
            directory: PathBuf::from("./snapshots"),
            every_ticks: 100,
            keep: 10,
            keep_seed: true,
        }
    }
}

impl FeedConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| format!("Invalid feed address {}:{}: {}", self.bind, self.port, e))
    }

    fn check(&self, errors: &mut Vec<String>) {
        if self.port < 1024 {
            errors.push(format!(
                "feed.port must be 1024-65535, got {}. Example: port = 8118",
                self.port
            ));
        }
        if self.socket_addr().is_err() {
            errors.push(format!(
                "feed.bind must be an IP address, got '{}'. Example: bind = \"127.0.0.1\"",
                self.bind
            ));
        }
    }
}

impl FloodDefaults {
    /// Fresh, empty state carrying the configured terrain and speed.
    pub fn fresh_state(&self) -> SimulationState {
        let mut state = SimulationState::new(self.name.clone());
        state.set_terrain(self.terrain);
        state.set_simulation_speed(self.speed);
        state
    }

    fn check(&self, errors: &mut Vec<String>) {
        if self.name.trim().is_empty() {
            errors.push("flood.name must not be empty. Example: name = \"river district\"".to_string());
        }
        // The state clamps speed silently, so catch an out-of-range value here instead.
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            errors.push(format!(
                "flood.speed must be {}-{}, got {}. Example: speed = 1.0",
                MIN_SPEED, MAX_SPEED, self.speed
            ));
        }
    }
}

impl SnapshotPolicy {
    pub fn retention(&self) -> Retention {
        Retention {
            keep: self.keep as usize,
            keep_seed: self.keep_seed,
        }
    }

    fn check(&self, errors: &mut Vec<String>) {
        if self.every_ticks == 0 {
            errors.push("snapshots.every_ticks must be > 0. Example: every_ticks = 100".to_string());
        }
        if self.keep == 0 {
            errors.push("snapshots.keep must be > 0. Example: keep = 10".to_string());
        }
    }
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: SimulationConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Every problem at once, one per line.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if !(self.tick_rate_hz > 0.0 && self.tick_rate_hz <= 1000.0) {
            errors.push(format!(
                "tick_rate_hz must be > 0.0 and <= 1000.0, got {}. Example: tick_rate_hz = 2.0",
                self.tick_rate_hz
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                LOG_LEVELS, self.log_level
            ));
        }
        self.feed.check(&mut errors);
        self.flood.check(&mut errors);
        self.snapshots.check(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
