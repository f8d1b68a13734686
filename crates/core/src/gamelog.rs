//! The persisted unit of a game: metadata, configuration, the full action
//! history, and an optional full-state snapshot for O(1) restoration.
//!
//! The log is exclusively owned and mutated by the host engine; the replay
//! engine only ever reads a copy. The whole structure round-trips through
//! JSON exactly, so a save can move between machines as a single document.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::state::GameState;
use crate::types::{ActionEnvelope, GameEvent};

/// Bumped when turn-resolution semantics change incompatibly.
pub const RULES_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogMeta {
    pub game_id: String,
    pub game_name: String,
    pub created_at: u64,
    pub rules_version: u32,
    pub last_saved: u64,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// How a logged action was processed, so replay can repeat it exactly.
/// `Free` actions (and all but the last action of a simultaneous batch)
/// suppress AI and turn advancement; `JoinOnly` records connect-time joins
/// that bypass the post-resolution pipeline entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    #[default]
    Full,
    Free,
    JoinOnly,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u64,
    pub envelope: ActionEnvelope,
    pub events: Vec<GameEvent>,
    pub timestamp: u64,
    #[serde(default)]
    pub mode: ProcessMode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    pub meta: LogMeta,
    pub config: GameConfig,
    pub turns: Vec<TurnRecord>,
    /// Overwritten after every resolved action. Restoring from here skips
    /// the full replay entirely.
    #[serde(default)]
    pub state_snapshot: Option<GameState>,
}

impl GameLog {
    pub fn new(config: GameConfig, game_name: &str) -> Self {
        let created_at = now_ms();
        let game_id = format!("game-{:08x}-{:08x}", config.dungeon_seed, config.rng_seed);
        Self {
            meta: LogMeta {
                game_id,
                game_name: game_name.to_string(),
                created_at,
                rules_version: RULES_VERSION,
                last_saved: created_at,
                campaign_id: None,
                node_id: None,
            },
            config,
            turns: Vec::new(),
            state_snapshot: None,
        }
    }
}

/// Wall-clock milliseconds. Timestamps are bookkeeping only and never feed
/// back into simulation or replay.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis() as u64)
}
