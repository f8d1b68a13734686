//! Shared fixtures for unit and integration tests. Not part of the public
//! gameplay surface.

use std::collections::BTreeMap;

use crate::state::{Abilities, Entity, GameState, Inventory, LevelMap};
use crate::types::{EntityKind, Pos, TileKind};

/// A minimal living entity with the given combat stats and no items.
pub fn make_entity(id: &str, kind: EntityKind, pos: Pos, hp: i32, attack: i32) -> Entity {
    Entity {
        id: id.to_string(),
        kind,
        template_id: None,
        pos,
        hp,
        max_hp: hp,
        attack,
        defense: 0,
        abilities: Abilities::default(),
        xp: 0,
        level: 1,
        attribute_points: 0,
        skill_points: 0,
        skills: Vec::new(),
        inventory: Inventory::new(8),
        equipment: BTreeMap::new(),
        vision_radius: 6,
        ai_behavior: None,
        status_effects: Vec::new(),
        xp_value: None,
    }
}

/// A map whose every tile, border included, is open floor.
pub fn all_floor_map(width: usize, height: usize) -> LevelMap {
    let mut map = LevelMap::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            map.set_tile(Pos { x, y }, TileKind::Floor);
        }
    }
    map
}

/// A single-level state over an all-floor map with no entities.
pub fn empty_state(width: usize, height: usize, seed: u32) -> GameState {
    GameState {
        dungeon: all_floor_map(width, height),
        entities: Vec::new(),
        ground_items: Vec::new(),
        turn: 0,
        seed,
        current_level: 0,
        max_levels: 1,
        level_enemies: BTreeMap::new(),
        level_maps: BTreeMap::new(),
        victory_achieved: false,
        next_ground_id: 0,
    }
}
