use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use floodspread::cli::commands;
use floodspread::config::scenario::ScenarioParams;
use floodspread::config::simulation::SimulationConfig;
use floodspread::flood::generation::{build_state, print_state_summary};
use floodspread::flood::{RegionId, SimulationMode};
use floodspread::persistence;

#[derive(Parser)]
#[command(name = "floodspread")]
#[command(about = "A flood report spread simulation engine with mergeable circular flood regions")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an initial simulation state from a scenario file
    Seed {
        /// Path to the scenario file
        #[arg(short, long, default_value = "scenario.toml")]
        scenario: String,

        /// Output snapshot directory
        #[arg(short, long, default_value = "snapshots")]
        output: String,
    },

    /// Start the simulation and its live feed
    Run {
        /// Path to a specific state snapshot to load
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Inspect a region or the whole simulation
    Inspect {
        /// Region ID to inspect
        #[arg(short, long)]
        region: Option<RegionId>,

        /// Show state-level summary statistics
        #[arg(long)]
        state: bool,
    },

    /// Manage state snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List available snapshots
    List {
        /// Snapshot directory
        #[arg(short, long, default_value = "snapshots")]
        dir: String,
    },

    /// Restore and display a state from a snapshot file
    Restore {
        /// Path to the snapshot file
        file: String,
    },
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &str) -> SimulationConfig {
    match SimulationConfig::from_file(Path::new(path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The config file is optional for seed and snapshots, so fall back quietly.
    let log_level = SimulationConfig::from_file(Path::new(&cli.config))
        .map(|c| c.log_level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&log_level, cli.log_json);

    match cli.command {
        Commands::Seed { scenario, output } => {
            let params = match ScenarioParams::from_file(Path::new(&scenario)) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error loading scenario: {}", e);
                    std::process::exit(1);
                }
            };
            println!("Seeding simulation from {}...", scenario);
            let state = match build_state(&params) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Cannot build state: {}", e);
                    std::process::exit(1);
                }
            };
            print_state_summary(&state);

            let snapshot_dir = Path::new(&output);
            match persistence::save_snapshot(&state, snapshot_dir) {
                Ok(path) => println!("\nState saved to {}", path.display()),
                Err(e) => {
                    eprintln!("Cannot save snapshot: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Run { state } => {
            let config = load_config(&cli.config);
            if let Err(e) = commands::run_simulation(&config, state.as_deref()).await {
                eprintln!("Simulation error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Inspect { region, state } => {
            let config = load_config(&cli.config);
            if let Err(e) = commands::inspect(&config, region, state) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Snapshots { action } => match action {
            SnapshotAction::List { dir } => {
                let snapshot_dir = Path::new(&dir);
                match persistence::list_snapshots(snapshot_dir) {
                    Ok(snapshots) => {
                        if snapshots.is_empty() {
                            println!("No snapshots found in {}", snapshot_dir.display());
                        } else {
                            println!(
                                "{:<44} {:>8} {:>7} {:>8} {:>9}",
                                "File", "Tick", "Mode", "Regions", "Size"
                            );
                            println!("{}", "-".repeat(80));
                            for s in &snapshots {
                                let name = s
                                    .path
                                    .file_name()
                                    .and_then(|n| n.to_str())
                                    .unwrap_or("?");
                                let mode = match s.mode {
                                    SimulationMode::Idle => "idle",
                                    SimulationMode::Simulating => "active",
                                };
                                let seed = if s.is_seed() { "  (seed)" } else { "" };
                                println!(
                                    "{:<44} {:>8} {:>7} {:>8} {:>6} KB{}",
                                    name,
                                    s.tick,
                                    mode,
                                    s.region_count,
                                    s.bytes / 1024,
                                    seed
                                );
                            }
                            println!(
                                "\n{} snapshot(s) in {}",
                                snapshots.len(),
                                snapshot_dir.display()
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Error listing snapshots: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            SnapshotAction::Restore { file } => {
                let path = Path::new(&file);
                match persistence::load_snapshot(path) {
                    Ok(state) => {
                        println!("Restored state from {}", path.display());
                        print_state_summary(&state);
                    }
                    Err(e) => {
                        eprintln!("Error restoring snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
