use std::error;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub fn offset(self, dx: i32, dy: i32) -> Pos {
        Pos { x: self.x + dx, y: self.y + dy }
    }
}

pub fn manhattan(a: Pos, b: Pos) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Floor,
    Wall,
    Door,
    StairsUp,
    StairsDown,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
    pub seen: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Enemy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Weapon,
    Armor,
    Trinket,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Dexterity,
    Constitution,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponClass {
    Blade,
    Blunt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmorClass {
    Light,
    Heavy,
}

/// One variant per action type, each carrying exactly the fields that
/// action requires. The acting identity travels in [`ActionEnvelope`],
/// never inside the action itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Move {
        dx: i32,
        dy: i32,
    },
    Wait,
    Join {
        #[serde(default)]
        template_id: Option<String>,
        #[serde(default)]
        spawn_hint: Option<Pos>,
    },
    PickUpItem {
        ground_id: String,
    },
    DropItem {
        slot: usize,
    },
    EquipItem {
        slot: usize,
    },
    UnequipItem {
        equip_slot: EquipSlot,
    },
    UseItem {
        slot: usize,
    },
    LevelUp {
        attributes: Vec<Attribute>,
        skills: Vec<String>,
    },
}

impl Action {
    /// Turn-ending actions are queued by the simultaneous coordinator;
    /// everything else applies immediately as a free action.
    pub fn is_turn_ending(&self) -> bool {
        matches!(self, Action::Move { .. })
    }
}

/// An action together with the identity it acts for. The host overwrites
/// `actor_id` with the session-verified identity before resolution, so a
/// peer can never act for another identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub actor_id: String,
    pub action: Action,
}

/// What happened during one resolution. Events are derived from the state
/// transition and broadcast as the delta; they are never stored in state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Moved {
        entity_id: String,
        from: Pos,
        to: Pos,
    },
    Attacked {
        attacker_id: String,
        target_id: String,
        damage: i32,
        dodged: bool,
        critical: bool,
    },
    Killed {
        entity_id: String,
        by: String,
        pos: Pos,
    },
    Spawned {
        entity_id: String,
        pos: Pos,
        #[serde(default)]
        template_id: Option<String>,
    },
    XpGained {
        entity_id: String,
        amount: i64,
    },
    LevelUp {
        entity_id: String,
        level: u32,
    },
    ItemPickup {
        entity_id: String,
        ground_id: String,
        item_name: String,
    },
    ItemDrop {
        entity_id: String,
        ground_id: String,
        item_name: String,
    },
    ItemEquip {
        entity_id: String,
        item_name: String,
        slot: EquipSlot,
    },
    ItemUnequip {
        entity_id: String,
        item_name: String,
        slot: EquipSlot,
    },
    ItemUse {
        entity_id: String,
        item_name: String,
    },
    Waited {
        entity_id: String,
    },
    Stunned {
        entity_id: String,
        remaining: u32,
    },
    Victory {
        entity_id: String,
    },
    Defeat,
    LevelTransition {
        from_level: u32,
        to_level: u32,
    },
    Error {
        message: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Stunned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub remaining: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The peer has no mapped identity; it must connect first.
    NotConnected { peer_id: String },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected { peer_id } => {
                write!(f, "peer {peer_id} is not connected to this game")
            }
        }
    }
}

impl error::Error for HostError {}
