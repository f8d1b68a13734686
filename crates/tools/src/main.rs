use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use warren_core::content::ContentPack;
use warren_core::replay::ReplayEngine;
use warren_core::{GameLog, load_log_from_file};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a saved game log and print the reconstructed state summary
    Replay {
        /// Path to a game log (.json document or .jsonl record file)
        #[arg(short, long)]
        log: PathBuf,
        /// Record index to seek to; defaults to the end of the log
        #[arg(short, long)]
        seek: Option<usize>,
    },
    /// Replay a log twice from scratch and require identical final states
    Verify {
        #[arg(short, long)]
        log: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { log, seek } => {
            let log = read_log(&log)?;
            let mut replay = ReplayEngine::new(log, Arc::new(ContentPack::default()));
            let target = seek.unwrap_or(replay.record_count());
            let (state, report) = replay
                .seek_to(target)
                .with_context(|| format!("Failed to seek to record {target}"))?;

            println!("Replayed {target} records.");
            println!("Turn: {}", state.turn);
            println!("Level: {} of {}", state.current_level + 1, state.max_levels);
            println!("Entities: {}", state.entities.len());
            println!("Victory: {}", state.victory_achieved);
            if !report.is_clean() {
                println!("{} record(s) had issues:", report.issues.len());
                for issue in &report.issues {
                    println!("  record {} (turn {}): {}", issue.index, issue.turn, issue.message);
                }
            }
        }
        Commands::Verify { log } => {
            let log = read_log(&log)?;
            let replay = ReplayEngine::new(log, Arc::new(ContentPack::default()));
            if !replay.verify_determinism() {
                bail!("Replay is not deterministic: two runs diverged");
            }
            println!("OK: two independent replays produced identical states.");
        }
    }

    Ok(())
}

/// Accept either the single-document JSON export or the JSONL record file.
fn read_log(path: &PathBuf) -> Result<GameLog> {
    if path.extension().is_some_and(|ext| ext == "jsonl") {
        let loaded = load_log_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load record file: {e}"))?;
        return Ok(loaded.log);
    }
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| "Failed to deserialize game log JSON")
}
