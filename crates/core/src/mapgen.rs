//! Deterministic multi-level dungeon generation.
//!
//! Every level is a pure function of the dungeon seed and its level index,
//! generated up-front at game start. Level N's layout never depends on
//! visit order, so any peer holding the seed reconstructs the same tower.

use crate::config::CustomLevel;
use crate::content::keys;
use crate::rng::{Mulberry32, mix_seed_stream};
use crate::state::LevelMap;
use crate::types::{Pos, TileKind};

const LEVEL_WIDTH: usize = 48;
const LEVEL_HEIGHT: usize = 32;
const ROOM_ATTEMPTS: u32 = 30;
const ROOM_MIN: usize = 4;
const ROOM_MAX: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct EnemySpawn {
    pub template_id: String,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedLevel {
    pub map: LevelMap,
    pub spawn: Pos,
    pub stairs_up: Option<Pos>,
    pub stairs_down: Option<Pos>,
    pub exit: Option<Pos>,
    pub enemy_spawns: Vec<EnemySpawn>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiLevelDungeon {
    pub levels: Vec<GeneratedLevel>,
}

impl MultiLevelDungeon {
    pub fn level(&self, index: u32) -> &GeneratedLevel {
        &self.levels[index as usize]
    }
}

#[derive(Clone, Copy, Debug)]
struct Room {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl Room {
    fn center(&self) -> Pos {
        Pos { x: (self.x + self.w / 2) as i32, y: (self.y + self.h / 2) as i32 }
    }

    fn intersects(&self, other: &Room) -> bool {
        // One-tile margin so rooms never share a wall.
        self.x < other.x + other.w + 1
            && other.x < self.x + self.w + 1
            && self.y < other.y + other.h + 1
            && other.y < self.y + self.h + 1
    }
}

pub fn generate(dungeon_seed: u32, max_levels: u32) -> MultiLevelDungeon {
    let levels = (0..max_levels)
        .map(|index| generate_level(mix_seed_stream(dungeon_seed, index), index, max_levels))
        .collect();
    MultiLevelDungeon { levels }
}

fn generate_level(level_seed: u32, index: u32, max_levels: u32) -> GeneratedLevel {
    let mut rng = Mulberry32::new(level_seed);
    let mut map = all_wall_map(LEVEL_WIDTH, LEVEL_HEIGHT);

    let mut rooms: Vec<Room> = Vec::new();
    for _ in 0..ROOM_ATTEMPTS {
        let w = rng.range(ROOM_MIN, ROOM_MAX);
        let h = rng.range(ROOM_MIN, ROOM_MAX);
        let x = rng.range(1, LEVEL_WIDTH - w - 2);
        let y = rng.range(1, LEVEL_HEIGHT - h - 2);
        let room = Room { x, y, w, h };
        if rooms.iter().any(|existing| existing.intersects(&room)) {
            continue;
        }
        carve_room(&mut map, &room);
        if let Some(previous) = rooms.last() {
            carve_corridor(&mut map, &mut rng, previous.center(), room.center());
        }
        rooms.push(room);
    }
    debug_assert!(!rooms.is_empty());

    let first_center = rooms[0].center();
    let last_center = rooms[rooms.len() - 1].center();

    let stairs_up = (index > 0).then(|| {
        map.set_tile(first_center, TileKind::StairsUp);
        first_center
    });
    let spawn = adjacent_floor(&map, first_center).unwrap_or(first_center);
    let stairs_down = (index + 1 < max_levels).then(|| {
        map.set_tile(last_center, TileKind::StairsDown);
        last_center
    });
    let exit = (index + 1 == max_levels).then(|| {
        map.set_tile(last_center, TileKind::Exit);
        last_center
    });

    let enemy_spawns = place_enemies(&map, &mut rng, &rooms, index);

    GeneratedLevel { map, spawn, stairs_up, stairs_down, exit, enemy_spawns }
}

fn all_wall_map(width: usize, height: usize) -> LevelMap {
    let mut map = LevelMap::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            map.set_tile(Pos { x, y }, TileKind::Wall);
        }
    }
    map
}

fn carve_room(map: &mut LevelMap, room: &Room) {
    for y in room.y..room.y + room.h {
        for x in room.x..room.x + room.w {
            map.set_tile(Pos { x: x as i32, y: y as i32 }, TileKind::Floor);
        }
    }
}

/// L-shaped corridor between two room centers. One tile per corridor may
/// become a door where it breaks through a wall.
fn carve_corridor(map: &mut LevelMap, rng: &mut Mulberry32, from: Pos, to: Pos) {
    let mut carved: Vec<Pos> = Vec::new();
    let horizontal_first = rng.pick(2) == 0;
    let corner =
        if horizontal_first { Pos { x: to.x, y: from.y } } else { Pos { x: from.x, y: to.y } };
    carve_line(map, from, corner, &mut carved);
    carve_line(map, corner, to, &mut carved);

    if !carved.is_empty() && rng.pick(4) == 0 {
        let door = carved[rng.pick(carved.len())];
        map.set_tile(door, TileKind::Door);
    }
}

fn carve_line(map: &mut LevelMap, from: Pos, to: Pos, carved: &mut Vec<Pos>) {
    let mut cursor = from;
    loop {
        if map.in_bounds(cursor) && map.tile_at(cursor) == TileKind::Wall {
            map.set_tile(cursor, TileKind::Floor);
            carved.push(cursor);
        }
        if cursor == to {
            break;
        }
        if cursor.x != to.x {
            cursor.x += (to.x - cursor.x).signum();
        } else {
            cursor.y += (to.y - cursor.y).signum();
        }
    }
}

fn adjacent_floor(map: &LevelMap, pos: Pos) -> Option<Pos> {
    [pos.offset(1, 0), pos.offset(-1, 0), pos.offset(0, 1), pos.offset(0, -1)]
        .into_iter()
        .find(|candidate| map.tile_at(*candidate) == TileKind::Floor)
}

fn place_enemies(
    map: &LevelMap,
    rng: &mut Mulberry32,
    rooms: &[Room],
    level_index: u32,
) -> Vec<EnemySpawn> {
    let table: &[&str] = match level_index {
        0 => &[keys::RAT, keys::GOBLIN],
        1 | 2 => &[keys::GOBLIN, keys::ORC],
        _ => &[keys::ORC, keys::SKELETON],
    };
    let count = (2 + level_index).min(6) as usize;

    let mut spawns = Vec::new();
    if rooms.len() < 2 {
        return spawns;
    }
    for _ in 0..count {
        // Skip the first room so enemies never start on top of the spawn.
        let room = rooms[rng.range(1, rooms.len() - 1)];
        let pos = Pos {
            x: rng.range(room.x, room.x + room.w - 1) as i32,
            y: rng.range(room.y, room.y + room.h - 1) as i32,
        };
        if map.tile_at(pos) != TileKind::Floor
            || spawns.iter().any(|existing: &EnemySpawn| existing.pos == pos)
        {
            continue;
        }
        let template_id = table[rng.pick(table.len())].to_string();
        spawns.push(EnemySpawn { template_id, pos });
    }
    spawns
}

/// Convert an editor-authored level into the generated form. Stairs and
/// exit positions come from the tile grid itself.
pub fn from_custom(custom: &CustomLevel) -> GeneratedLevel {
    let mut map = LevelMap::new(custom.width, custom.height);
    let mut stairs_up = None;
    let mut stairs_down = None;
    let mut exit = None;
    let mut first_floor = None;

    for y in 0..custom.height {
        for x in 0..custom.width {
            let pos = Pos { x: x as i32, y: y as i32 };
            let kind = custom.tiles[y * custom.width + x];
            map.set_tile(pos, kind);
            match kind {
                TileKind::StairsUp => stairs_up = Some(pos),
                TileKind::StairsDown => stairs_down = Some(pos),
                TileKind::Exit => exit = Some(pos),
                TileKind::Floor if first_floor.is_none() => first_floor = Some(pos),
                _ => {}
            }
        }
    }

    let spawn = custom.spawn.or(first_floor).unwrap_or(Pos { x: 1, y: 1 });
    let enemy_spawns = custom
        .entities
        .iter()
        .map(|spawn| EnemySpawn { template_id: spawn.template_id.clone(), pos: spawn.pos })
        .collect();

    GeneratedLevel { map, spawn, stairs_up, stairs_down, exit, enemy_spawns }
}
