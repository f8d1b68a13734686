//! The canonical game snapshot and its building blocks.
//!
//! `GameState` is the single source of truth owned by the host engine.
//! Everything in it round-trips through JSON exactly, because the state is
//! both the persisted snapshot and the payload of full-state broadcasts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelMap {
    pub width: usize,
    pub height: usize,
    /// Row-major, `width * height` tiles.
    pub tiles: Vec<Tile>,
}

impl LevelMap {
    /// An all-floor map with a solid wall border.
    pub fn new(width: usize, height: usize) -> Self {
        let mut tiles = vec![Tile { kind: TileKind::Floor, seen: false }; width * height];
        for x in 0..width {
            tiles[x].kind = TileKind::Wall;
            tiles[(height - 1) * width + x].kind = TileKind::Wall;
        }
        for y in 0..height {
            tiles[y * width].kind = TileKind::Wall;
            tiles[y * width + (width - 1)].kind = TileKind::Wall;
        }
        Self { width, height, tiles }
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Out-of-bounds reads as wall, so callers never need a bounds check
    /// before asking about passability.
    pub fn tile_at(&self, pos: Pos) -> TileKind {
        if !self.in_bounds(pos) {
            return TileKind::Wall;
        }
        self.tiles[self.index(pos)].kind
    }

    pub fn set_tile(&mut self, pos: Pos, kind: TileKind) {
        if !self.in_bounds(pos) {
            return;
        }
        let idx = self.index(pos);
        self.tiles[idx].kind = kind;
    }

    pub fn mark_seen(&mut self, pos: Pos) {
        if !self.in_bounds(pos) {
            return;
        }
        let idx = self.index(pos);
        self.tiles[idx].seen = true;
    }

    pub fn is_walkable(&self, pos: Pos) -> bool {
        self.in_bounds(pos) && self.tile_at(pos) != TileKind::Wall
    }

    /// Mark every tile within a square radius as seen.
    pub fn reveal_around(&mut self, center: Pos, radius: i32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let pos = center.offset(dx, dy);
                if self.in_bounds(pos) {
                    self.mark_seen(pos);
                }
            }
        }
    }

    fn index(&self, pos: Pos) -> usize {
        (pos.y as usize) * self.width + (pos.x as usize)
    }
}

/// Fully denormalized item data. Carried on every inventory slot, equipped
/// slot, and ground item so an item stays renderable and usable even when
/// detached from any content registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub item_id: String,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
    #[serde(default)]
    pub heal_amount: i32,
    #[serde(default)]
    pub equip_slot: Option<EquipSlot>,
    #[serde(default)]
    pub weapon_class: Option<WeaponClass>,
    #[serde(default)]
    pub armor_class: Option<ArmorClass>,
    #[serde(default)]
    pub consumable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundItem {
    pub ground_id: String,
    pub pos: Pos,
    pub quantity: u32,
    pub data: ItemData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub capacity: usize,
    pub slots: Vec<ItemData>,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, slots: Vec::new() }
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique, never reused while the state is live. For human
    /// players this is the persistent user identity; AI roster entities
    /// use `ai-`-prefixed ids.
    pub id: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub template_id: Option<String>,
    pub pos: Pos,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    #[serde(default)]
    pub abilities: Abilities,
    #[serde(default)]
    pub xp: i64,
    pub level: u32,
    #[serde(default)]
    pub attribute_points: u32,
    #[serde(default)]
    pub skill_points: u32,
    #[serde(default)]
    pub skills: Vec<String>,
    pub inventory: Inventory,
    pub equipment: BTreeMap<EquipSlot, ItemData>,
    pub vision_radius: u32,
    #[serde(default)]
    pub ai_behavior: Option<String>,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    /// Explicit XP award override; without it the kill formula applies.
    #[serde(default)]
    pub xp_value: Option<i64>,
}

impl Entity {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Base attack plus equipment bonuses. Stat-definition modifiers are
    /// layered on top by the combat path.
    pub fn equipped_attack(&self) -> i32 {
        self.attack + self.equipment.values().map(|item| item.attack_bonus).sum::<i32>()
    }

    pub fn equipped_defense(&self) -> i32 {
        self.defense + self.equipment.values().map(|item| item.defense_bonus).sum::<i32>()
    }

    pub fn weapon_class(&self) -> Option<WeaponClass> {
        self.equipment.get(&EquipSlot::Weapon).and_then(|item| item.weapon_class)
    }

    pub fn armor_class(&self) -> Option<ArmorClass> {
        self.equipment.get(&EquipSlot::Armor).and_then(|item| item.armor_class)
    }

    pub fn stunned(&self) -> Option<u32> {
        self.status_effects
            .iter()
            .find(|effect| effect.kind == StatusKind::Stunned)
            .map(|effect| effect.remaining)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub dungeon: LevelMap,
    /// Insertion-ordered. Entity ids are never reused while state is live.
    pub entities: Vec<Entity>,
    pub ground_items: Vec<GroundItem>,
    /// Advanced exactly once per resolved round.
    pub turn: u64,
    /// Current mulberry32 state; re-derived deterministically every turn
    /// advance and after every in-turn stochastic draw.
    pub seed: u32,
    pub current_level: u32,
    pub max_levels: u32,
    /// Per-level enemy rosters. Visited levels keep their live enemies,
    /// unvisited levels keep their deterministic spawns.
    #[serde(default)]
    pub level_enemies: BTreeMap<u32, Vec<Entity>>,
    /// Seen-tile memory for levels the players have left.
    #[serde(default)]
    pub level_maps: BTreeMap<u32, LevelMap>,
    /// Terminal flag, set once, never cleared.
    pub victory_achieved: bool,
    /// Monotonic counter backing generated ground-item ids.
    #[serde(default)]
    pub next_ground_id: u64,
}

impl GameState {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    pub fn living_entity_at(&self, pos: Pos) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.pos == pos && entity.is_alive())
    }

    pub fn is_occupied(&self, pos: Pos) -> bool {
        self.entities.iter().any(|entity| entity.pos == pos && entity.is_alive())
    }

    /// Generated ground-item ids are unique per state and deterministic,
    /// so replays mint identical ids.
    pub fn alloc_ground_id(&mut self) -> String {
        let id = format!("ground-{}", self.next_ground_id);
        self.next_ground_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_border_is_wall_and_oob_reads_wall() {
        let map = LevelMap::new(10, 8);
        assert_eq!(map.tile_at(Pos { x: 0, y: 0 }), TileKind::Wall);
        assert_eq!(map.tile_at(Pos { x: 9, y: 7 }), TileKind::Wall);
        assert_eq!(map.tile_at(Pos { x: 5, y: 4 }), TileKind::Floor);
        assert_eq!(map.tile_at(Pos { x: -1, y: 4 }), TileKind::Wall);
        assert_eq!(map.tile_at(Pos { x: 5, y: 100 }), TileKind::Wall);
    }

    #[test]
    fn ground_ids_are_unique_and_deterministic() {
        let mut state = GameState {
            dungeon: LevelMap::new(4, 4),
            entities: Vec::new(),
            ground_items: Vec::new(),
            turn: 0,
            seed: 1,
            current_level: 0,
            max_levels: 1,
            level_enemies: BTreeMap::new(),
            level_maps: BTreeMap::new(),
            victory_achieved: false,
            next_ground_id: 0,
        };
        assert_eq!(state.alloc_ground_id(), "ground-0");
        assert_eq!(state.alloc_ground_id(), "ground-1");
    }
}
