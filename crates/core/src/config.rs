//! Persisted game configuration. Drives engine construction and travels
//! inside the game log so a save can be replayed on another machine.

use serde::{Deserialize, Serialize};

use crate::types::{Pos, TileKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub dungeon_seed: u32,
    pub rng_seed: u32,
    /// Persistent identities expected to join this game.
    pub players: Vec<String>,
    #[serde(default)]
    pub mods: Vec<String>,
    #[serde(default)]
    pub max_levels: Option<u32>,
    /// Raw tile/entity/item override used by quick play and editor-authored
    /// content. When present it replaces the generated first level.
    #[serde(default)]
    pub custom_level: Option<CustomLevel>,
}

impl GameConfig {
    pub fn new(dungeon_seed: u32, rng_seed: u32, players: Vec<String>) -> Self {
        Self { dungeon_seed, rng_seed, players, mods: Vec::new(), max_levels: None, custom_level: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomLevel {
    pub width: usize,
    pub height: usize,
    /// Row-major tile grid, `width * height` entries.
    pub tiles: Vec<TileKind>,
    #[serde(default)]
    pub entities: Vec<CustomSpawn>,
    #[serde(default)]
    pub items: Vec<CustomItem>,
    /// Preferred player spawn for this level, threaded into the join
    /// action as its spawn hint.
    #[serde(default)]
    pub spawn: Option<Pos>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomSpawn {
    pub template_id: String,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomItem {
    pub item_id: String,
    pub pos: Pos,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}
