//! Flood state snapshots on disk.
//!
//! Each snapshot is one bincode-encoded `SimulationState`. The file name
//! carries what `snapshots list` and retention need without decoding:
//!
//! ```text
//! flood-t{tick}-{idle|active}-r{regions}-{saved_at}.bin
//! ```
//!
//! Loading decodes the state, checks every region invariant and then checks
//! the state against its own file name, so a renamed or swapped file is
//! reported instead of silently resumed.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::flood::{SimulationMode, SimulationState};

const PREFIX: &str = "flood-t";
const EXTENSION: &str = ".bin";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Cannot encode flood state: {0}")]
    Encode(#[source] bincode::Error),
    #[error("Snapshot {} is not a flood state: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: bincode::Error,
    },
    #[error("Corrupt snapshot {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("No valid snapshots found. Seed a new simulation with: floodspread seed")]
    NoValidSnapshots,
}

/// What a snapshot's file name says about the state inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SnapshotName {
    tick: u64,
    mode: SimulationMode,
    region_count: usize,
    saved_at: u64,
}

impl SnapshotName {
    fn describe(state: &SimulationState, saved_at: u64) -> Self {
        SnapshotName {
            tick: state.tick_count,
            mode: state.mode,
            region_count: state.regions.len(),
            saved_at,
        }
    }

    fn render(&self) -> String {
        let mode = match self.mode {
            SimulationMode::Idle => "idle",
            SimulationMode::Simulating => "active",
        };
        format!(
            "{PREFIX}{}-{mode}-r{}-{}{EXTENSION}",
            self.tick, self.region_count, self.saved_at
        )
    }

    fn parse(file_name: &str) -> Option<Self> {
        let body = file_name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;
        let mut fields = body.split('-');
        let tick = fields.next()?.parse().ok()?;
        let mode = match fields.next()? {
            "idle" => SimulationMode::Idle,
            "active" => SimulationMode::Simulating,
            _ => return None,
        };
        let region_count = fields.next()?.strip_prefix('r')?.parse().ok()?;
        let saved_at = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(SnapshotName {
            tick,
            mode,
            region_count,
            saved_at,
        })
    }

    /// The decoded state must be the one the name advertises.
    fn check_matches(&self, state: &SimulationState) -> Result<(), String> {
        let actual = SnapshotName::describe(state, self.saved_at);
        if actual == *self {
            return Ok(());
        }
        Err(format!(
            "file name says tick {} with {} regions ({:?}), state holds tick {} with {} regions ({:?})",
            self.tick, self.region_count, self.mode, actual.tick, actual.region_count, actual.mode
        ))
    }
}

/// A snapshot found on disk, described from its file name.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub tick: u64,
    pub mode: SimulationMode,
    pub region_count: usize,
    /// Seconds since the Unix epoch.
    pub saved_at: u64,
    pub bytes: u64,
}

impl SnapshotInfo {
    /// Snapshots taken before the first tick hold the seeded scenario.
    pub fn is_seed(&self) -> bool {
        self.tick == 0
    }
}

/// How many snapshots survive a prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Newest snapshots to keep.
    pub keep: usize,
    /// Also keep the newest tick-0 snapshot, even when it falls outside `keep`,
    /// so the seeded scenario can always be replayed.
    pub keep_seed: bool,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write through a dotfile in the same directory and rename it into place.
fn write_atomically(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let staging = match (target.parent(), target.file_name()) {
        (Some(dir), Some(name)) => dir.join(format!(".{}.tmp", name.to_string_lossy())),
        _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "snapshot path has no file name")),
    };
    let result = fs::write(&staging, bytes).and_then(|()| fs::rename(&staging, target));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Persist a state into `dir`, creating the directory when needed. Returns the new file's path.
pub fn save_snapshot(state: &SimulationState, dir: &Path) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;
    let bytes = bincode::serialize(state).map_err(SnapshotError::Encode)?;
    let path = dir.join(SnapshotName::describe(state, now_secs()).render());
    write_atomically(&path, &bytes)?;
    debug!(
        path = %path.display(),
        tick = state.tick_count,
        regions = state.regions.len(),
        bytes = bytes.len(),
        "Snapshot written"
    );
    Ok(path)
}

/// Decode a snapshot and verify it before handing it out.
pub fn load_snapshot(path: &Path) -> Result<SimulationState, SnapshotError> {
    let bytes = fs::read(path)?;
    let state: SimulationState = bincode::deserialize(&bytes).map_err(|source| SnapshotError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let corrupt = |reason: String| SnapshotError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    state.check_invariants().map_err(|e| corrupt(e.to_string()))?;

    // Files renamed by hand fall outside the naming scheme and skip this check.
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(SnapshotName::parse);
    if let Some(name) = name {
        name.check_matches(&state).map_err(corrupt)?;
    }

    Ok(state)
}

/// Snapshots in `dir`, most recently saved first. A missing directory has none.
pub fn list_snapshots(dir: &Path) -> Result<Vec<SnapshotInfo>, SnapshotError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().and_then(SnapshotName::parse) else {
            continue;
        };
        found.push(SnapshotInfo {
            path: entry.path(),
            tick: name.tick,
            mode: name.mode,
            region_count: name.region_count,
            saved_at: name.saved_at,
            bytes: metadata.len(),
        });
    }

    found.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then(b.tick.cmp(&a.tick)));
    Ok(found)
}

/// Delete snapshots that fall outside `retention`. Returns the deleted paths.
pub fn prune_snapshots(dir: &Path, retention: Retention) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = list_snapshots(dir)?;
    let seed = snapshots
        .iter()
        .position(SnapshotInfo::is_seed)
        .filter(|_| retention.keep_seed);

    let mut deleted = Vec::new();
    for (index, info) in snapshots.iter().enumerate().skip(retention.keep) {
        if Some(index) == seed {
            continue;
        }
        fs::remove_file(&info.path)?;
        deleted.push(info.path.clone());
    }
    if !deleted.is_empty() {
        debug!(deleted = deleted.len(), kept = snapshots.len() - deleted.len(), "Pruned snapshots");
    }
    Ok(deleted)
}

/// Resume from the newest snapshot that loads cleanly, skipping broken ones.
pub fn load_latest_valid_snapshot(dir: &Path) -> Result<SimulationState, SnapshotError> {
    for info in list_snapshots(dir)? {
        match load_snapshot(&info.path) {
            Ok(state) => return Ok(state),
            Err(e) => warn!(
                path = %info.path.display(),
                tick = info.tick,
                error = %e,
                "Skipping unusable snapshot"
            ),
        }
    }
    Err(SnapshotError::NoValidSnapshots)
}
