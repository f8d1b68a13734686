//! Pure turn resolution: the single state-transition function all
//! gameplay flows through.
//!
//! `resolve_turn` clones the incoming state, applies exactly one action,
//! and returns the next state plus the events describing what happened.
//! It never mutates its argument, never blocks, and never panics on
//! game-logic grounds; illegal actions degrade to silent no-ops. Identical
//! inputs always produce identical outputs.

use std::collections::BTreeMap;

use crate::content::{Registry, keys};
use crate::effects::{ChanceEffect, EffectKind, EffectTrigger, Formula, StatContext, eval};
use crate::rng::{Mulberry32, reseed};
use crate::state::{Abilities, Entity, GameState, GroundItem, Inventory, ItemData};
use crate::types::*;

/// Cumulative XP required for each level; level is the highest index + 1
/// whose threshold is at or below the entity's XP.
pub const LEVEL_THRESHOLDS: [i64; 10] = [0, 100, 300, 600, 1000, 1500, 2100, 2800, 3600, 4500];

/// Attribute and skill points granted per level gained.
const ATTRIBUTE_POINTS_PER_LEVEL: u32 = 2;
const MAX_HP_PER_LEVEL: i32 = 5;
const MAX_HP_PER_CONSTITUTION: i32 = 5;

#[derive(Clone, Debug)]
pub struct Resolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
}

pub fn resolve_turn(
    state: &GameState,
    envelope: &ActionEnvelope,
    registry: &dyn Registry,
) -> Resolution {
    let mut next = state.clone();
    let mut events = Vec::new();

    apply_action(&mut next, envelope, registry, &mut events);

    // Entities never persist as corpses.
    next.entities.retain(Entity::is_alive);

    Resolution { state: next, events }
}

/// Advance the round counter and re-derive the seed with one mulberry32
/// draw. Called exactly once per logical round, never per action inside a
/// simultaneous batch.
pub fn advance_turn(state: &GameState) -> GameState {
    let mut next = state.clone();
    next.turn += 1;
    next.seed = reseed(next.seed);
    next
}

pub fn level_for_xp(xp: i64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|threshold| *threshold <= xp)
        .map_or(1, |index| index as u32 + 1)
}

fn apply_action(
    next: &mut GameState,
    envelope: &ActionEnvelope,
    registry: &dyn Registry,
    events: &mut Vec<GameEvent>,
) {
    let actor_id = envelope.actor_id.as_str();

    if let Action::Join { template_id, spawn_hint } = &envelope.action {
        resolve_join(next, actor_id, template_id.as_deref(), *spawn_hint, registry, events);
        return;
    }

    let Some(actor_idx) =
        next.entities.iter().position(|entity| entity.id == actor_id && entity.is_alive())
    else {
        // Dead or missing actors resolve to nothing.
        return;
    };

    // An active stun consumes the whole turn.
    if next.entities[actor_idx].stunned().is_some() {
        tick_status_effects(&mut next.entities[actor_idx], events);
        return;
    }

    match &envelope.action {
        Action::Move { dx, dy } => resolve_move(next, actor_idx, *dx, *dy, registry, events),
        Action::Wait => events.push(GameEvent::Waited { entity_id: actor_id.to_string() }),
        Action::PickUpItem { ground_id } => resolve_pickup(next, actor_idx, ground_id, events),
        Action::DropItem { slot } => resolve_drop(next, actor_idx, *slot, events),
        Action::EquipItem { slot } => resolve_equip(next, actor_idx, *slot, events),
        Action::UnequipItem { equip_slot } => {
            resolve_unequip(next, actor_idx, *equip_slot, events);
        }
        Action::UseItem { slot } => resolve_use(next, actor_idx, *slot, events),
        Action::LevelUp { attributes, skills } => {
            resolve_level_up(next, actor_idx, attributes, skills, events);
        }
        Action::Join { .. } => unreachable!("join handled above"),
    }
}

fn tick_status_effects(entity: &mut Entity, events: &mut Vec<GameEvent>) {
    for effect in &mut entity.status_effects {
        effect.remaining = effect.remaining.saturating_sub(1);
        if effect.kind == StatusKind::Stunned {
            events.push(GameEvent::Stunned {
                entity_id: entity.id.clone(),
                remaining: effect.remaining,
            });
        }
    }
    entity.status_effects.retain(|effect| effect.remaining > 0);
}

// ---------------------------------------------------------------------------
// Movement and combat
// ---------------------------------------------------------------------------

fn resolve_move(
    next: &mut GameState,
    actor_idx: usize,
    dx: i32,
    dy: i32,
    registry: &dyn Registry,
    events: &mut Vec<GameEvent>,
) {
    // Cardinal, single-step only.
    if dx.abs() + dy.abs() != 1 {
        return;
    }
    let from = next.entities[actor_idx].pos;
    let target = from.offset(dx, dy);

    if let Some(target_idx) =
        next.entities.iter().position(|entity| entity.pos == target && entity.is_alive())
    {
        // Moving into an opposing entity is an attack; into a same-kind
        // entity, a silent no-op.
        if next.entities[target_idx].kind != next.entities[actor_idx].kind {
            resolve_attack(next, actor_idx, target_idx, registry, events);
        }
        return;
    }

    if !next.dungeon.is_walkable(target) {
        return;
    }

    next.entities[actor_idx].pos = target;
    let vision = next.entities[actor_idx].vision_radius;
    next.dungeon.reveal_around(target, vision as i32);
    events.push(GameEvent::Moved { entity_id: next.entities[actor_idx].id.clone(), from, to: target });

    auto_pickup_at(next, actor_idx, target, events);
}

/// Pick up every ground item co-located with the actor, in ground order,
/// until the inventory fills.
fn auto_pickup_at(next: &mut GameState, actor_idx: usize, pos: Pos, events: &mut Vec<GameEvent>) {
    let mut index = 0;
    while index < next.ground_items.len() {
        if next.ground_items[index].pos != pos || next.entities[actor_idx].inventory.is_full() {
            index += 1;
            continue;
        }
        let item = next.ground_items.remove(index);
        events.push(GameEvent::ItemPickup {
            entity_id: next.entities[actor_idx].id.clone(),
            ground_id: item.ground_id,
            item_name: item.data.name.clone(),
        });
        next.entities[actor_idx].inventory.slots.push(item.data);
    }
}

fn stat_context(entity: &Entity) -> StatContext {
    StatContext {
        attack: entity.equipped_attack(),
        defense: entity.equipped_defense(),
        hp: entity.hp,
        max_hp: entity.max_hp,
        level: entity.level,
        strength: entity.abilities.strength,
        dexterity: entity.abilities.dexterity,
        constitution: entity.abilities.constitution,
    }
}

/// Roll one chance effect. A chance at or below zero never fires and a
/// chance at or above 100 always fires; neither consumes a draw, so fully
/// deterministic matchups stay roll-free.
fn roll_chance(rng: &mut Mulberry32, chance: &Formula, ctx: &StatContext) -> bool {
    let chance = eval(chance, ctx);
    if chance <= 0.0 {
        return false;
    }
    if chance >= 100.0 {
        return true;
    }
    rng.roll_percent() < chance
}

fn combat_effects(entity: &Entity, registry: &dyn Registry) -> Vec<ChanceEffect> {
    let mut effects = registry.stat_rules().innate_effects.clone();
    for item in entity.equipment.values() {
        effects.extend(registry.item_effects(&item.item_id));
    }
    effects
}

fn resolve_attack(
    next: &mut GameState,
    attacker_idx: usize,
    target_idx: usize,
    registry: &dyn Registry,
    events: &mut Vec<GameEvent>,
) {
    let rules = registry.stat_rules();
    let mut rng = Mulberry32::new(next.seed);

    let attacker = next.entities[attacker_idx].clone();
    let target = next.entities[target_idx].clone();
    let attacker_ctx = stat_context(&attacker);
    let target_ctx = stat_context(&target);

    let mut damage = f64::from(attacker.equipped_attack());
    for modifier in &rules.attack_modifiers {
        damage += eval(modifier, &attacker_ctx);
    }
    damage += f64::from(rules.effectiveness_bonus(attacker.weapon_class(), target.armor_class()));

    let mut critical = false;
    let mut lifesteal_percent = 0.0;
    let mut stun_turns = 0u32;
    for effect in combat_effects(&attacker, registry) {
        if effect.trigger != EffectTrigger::OnAttack {
            continue;
        }
        if !roll_chance(&mut rng, &effect.chance, &attacker_ctx) {
            continue;
        }
        match effect.effect {
            EffectKind::CriticalMultiply { factor } => {
                damage *= factor;
                critical = true;
            }
            EffectKind::Lifesteal { percent } => lifesteal_percent += percent,
            EffectKind::Stun { turns } => stun_turns = stun_turns.max(turns),
            EffectKind::Dodge => {}
        }
    }

    let mut dodged = false;
    for effect in combat_effects(&target, registry) {
        if effect.trigger != EffectTrigger::OnDefend {
            continue;
        }
        if matches!(effect.effect, EffectKind::Dodge)
            && roll_chance(&mut rng, &effect.chance, &target_ctx)
        {
            dodged = true;
        }
    }

    // Defense subtracts after chance effects; a landed hit deals at least 1.
    let final_damage = if dodged {
        0
    } else {
        let raw = (damage - f64::from(target.equipped_defense())).floor() as i32;
        raw.max(1)
    };

    next.seed = rng.state();

    events.push(GameEvent::Attacked {
        attacker_id: attacker.id.clone(),
        target_id: target.id.clone(),
        damage: final_damage,
        dodged,
        critical,
    });

    if final_damage == 0 {
        return;
    }

    next.entities[target_idx].hp -= final_damage;

    if lifesteal_percent > 0.0 {
        let heal = (f64::from(final_damage) * lifesteal_percent / 100.0).floor() as i32;
        let attacker = &mut next.entities[attacker_idx];
        attacker.hp = (attacker.hp + heal).min(attacker.max_hp);
    }

    if next.entities[target_idx].hp <= 0 {
        on_kill(next, attacker_idx, target_idx, events);
    } else if stun_turns > 0 {
        apply_stun(&mut next.entities[target_idx], stun_turns);
    }
}

fn apply_stun(entity: &mut Entity, turns: u32) {
    if let Some(existing) =
        entity.status_effects.iter_mut().find(|effect| effect.kind == StatusKind::Stunned)
    {
        existing.remaining = existing.remaining.max(turns);
    } else {
        entity.status_effects.push(StatusEffect { kind: StatusKind::Stunned, remaining: turns });
    }
}

fn on_kill(
    next: &mut GameState,
    attacker_idx: usize,
    target_idx: usize,
    events: &mut Vec<GameEvent>,
) {
    let victim = next.entities[target_idx].clone();
    events.push(GameEvent::Killed {
        entity_id: victim.id.clone(),
        by: next.entities[attacker_idx].id.clone(),
        pos: victim.pos,
    });

    // Everything the victim carried drops where it died, denormalized
    // stats intact.
    let mut drops: Vec<ItemData> = victim.inventory.slots.clone();
    drops.extend(victim.equipment.values().cloned());
    for data in drops {
        let ground_id = next.alloc_ground_id();
        events.push(GameEvent::ItemDrop {
            entity_id: victim.id.clone(),
            ground_id: ground_id.clone(),
            item_name: data.name.clone(),
        });
        next.ground_items.push(GroundItem { ground_id, pos: victim.pos, quantity: 1, data });
    }

    let attacker_attack = next.entities[attacker_idx].attack;
    let amount = victim
        .xp_value
        .unwrap_or_else(|| i64::from(10 + victim.max_hp / 5 + attacker_attack * 2));
    grant_xp(next, attacker_idx, amount, events);
}

fn grant_xp(next: &mut GameState, idx: usize, amount: i64, events: &mut Vec<GameEvent>) {
    let entity = &mut next.entities[idx];
    entity.xp += amount;
    events.push(GameEvent::XpGained { entity_id: entity.id.clone(), amount });

    let target_level = level_for_xp(entity.xp);
    while entity.level < target_level {
        entity.level += 1;
        entity.attribute_points += ATTRIBUTE_POINTS_PER_LEVEL;
        if entity.level % 2 == 1 {
            entity.skill_points += 1;
        }
        entity.max_hp += MAX_HP_PER_LEVEL;
        entity.hp += MAX_HP_PER_LEVEL;
        events.push(GameEvent::LevelUp { entity_id: entity.id.clone(), level: entity.level });
    }
}

// ---------------------------------------------------------------------------
// Inventory and equipment
// ---------------------------------------------------------------------------

fn resolve_pickup(
    next: &mut GameState,
    actor_idx: usize,
    ground_id: &str,
    events: &mut Vec<GameEvent>,
) {
    let actor_pos = next.entities[actor_idx].pos;
    if next.entities[actor_idx].inventory.is_full() {
        return;
    }
    let Some(item_idx) = next
        .ground_items
        .iter()
        .position(|item| item.ground_id == ground_id && item.pos == actor_pos)
    else {
        return;
    };
    let item = next.ground_items.remove(item_idx);
    events.push(GameEvent::ItemPickup {
        entity_id: next.entities[actor_idx].id.clone(),
        ground_id: item.ground_id,
        item_name: item.data.name.clone(),
    });
    next.entities[actor_idx].inventory.slots.push(item.data);
}

fn resolve_drop(next: &mut GameState, actor_idx: usize, slot: usize, events: &mut Vec<GameEvent>) {
    if slot >= next.entities[actor_idx].inventory.slots.len() {
        return;
    }
    let data = next.entities[actor_idx].inventory.slots.remove(slot);
    let pos = next.entities[actor_idx].pos;
    let ground_id = next.alloc_ground_id();
    events.push(GameEvent::ItemDrop {
        entity_id: next.entities[actor_idx].id.clone(),
        ground_id: ground_id.clone(),
        item_name: data.name.clone(),
    });
    next.ground_items.push(GroundItem { ground_id, pos, quantity: 1, data });
}

fn resolve_equip(next: &mut GameState, actor_idx: usize, slot: usize, events: &mut Vec<GameEvent>) {
    let entity = &mut next.entities[actor_idx];
    let Some(data) = entity.inventory.slots.get(slot) else {
        return;
    };
    let Some(equip_slot) = data.equip_slot else {
        return;
    };
    let data = entity.inventory.slots.remove(slot);
    let name = data.name.clone();
    if let Some(previous) = entity.equipment.insert(equip_slot, data) {
        // The displaced item goes back to the freed inventory slot.
        entity.inventory.slots.push(previous);
    }
    events.push(GameEvent::ItemEquip {
        entity_id: entity.id.clone(),
        item_name: name,
        slot: equip_slot,
    });
}

fn resolve_unequip(
    next: &mut GameState,
    actor_idx: usize,
    equip_slot: EquipSlot,
    events: &mut Vec<GameEvent>,
) {
    let entity = &mut next.entities[actor_idx];
    if entity.inventory.is_full() {
        return;
    }
    let Some(data) = entity.equipment.remove(&equip_slot) else {
        return;
    };
    events.push(GameEvent::ItemUnequip {
        entity_id: entity.id.clone(),
        item_name: data.name.clone(),
        slot: equip_slot,
    });
    entity.inventory.slots.push(data);
}

fn resolve_use(next: &mut GameState, actor_idx: usize, slot: usize, events: &mut Vec<GameEvent>) {
    let entity = &mut next.entities[actor_idx];
    let Some(data) = entity.inventory.slots.get(slot) else {
        return;
    };
    if !data.consumable {
        return;
    }
    let data = entity.inventory.slots.remove(slot);
    entity.hp = (entity.hp + data.heal_amount).min(entity.max_hp);
    events.push(GameEvent::ItemUse { entity_id: entity.id.clone(), item_name: data.name });
}

fn resolve_level_up(
    next: &mut GameState,
    actor_idx: usize,
    attributes: &[Attribute],
    skills: &[String],
    events: &mut Vec<GameEvent>,
) {
    let entity = &mut next.entities[actor_idx];
    if attributes.len() as u32 > entity.attribute_points
        || skills.len() as u32 > entity.skill_points
    {
        events.push(GameEvent::Error {
            message: format!("{} does not have enough unspent points", entity.id),
        });
        return;
    }

    entity.attribute_points -= attributes.len() as u32;
    entity.skill_points -= skills.len() as u32;
    for attribute in attributes {
        match attribute {
            Attribute::Strength => entity.abilities.strength += 1,
            Attribute::Dexterity => entity.abilities.dexterity += 1,
            Attribute::Constitution => {
                entity.abilities.constitution += 1;
                entity.max_hp += MAX_HP_PER_CONSTITUTION;
                entity.hp += MAX_HP_PER_CONSTITUTION;
            }
        }
    }
    entity.skills.extend(skills.iter().cloned());
    events.push(GameEvent::LevelUp { entity_id: entity.id.clone(), level: entity.level });
}

// ---------------------------------------------------------------------------
// Joining
// ---------------------------------------------------------------------------

fn resolve_join(
    next: &mut GameState,
    actor_id: &str,
    template_id: Option<&str>,
    spawn_hint: Option<Pos>,
    registry: &dyn Registry,
    events: &mut Vec<GameEvent>,
) {
    // Reconnects reclaim their entity at the host layer; the resolver
    // never creates a duplicate id.
    if next.entities.iter().any(|entity| entity.id == actor_id) {
        return;
    }

    let pos = spawn_hint
        .filter(|hint| next.dungeon.is_walkable(*hint) && !next.is_occupied(*hint))
        .or_else(|| scan_spawn(next, actor_id))
        .unwrap_or(Pos { x: 1, y: 1 });

    let template = template_id.map(str::to_string).unwrap_or_else(|| {
        let default = if actor_id.starts_with("ai-") { keys::GOBLIN } else { keys::PLAYER };
        default.to_string()
    });

    let entity = registry
        .create_entity(&template, actor_id, pos)
        .unwrap_or_else(|| fallback_entity(actor_id, pos));

    let vision = entity.vision_radius;
    next.dungeon.reveal_around(pos, vision as i32);
    events.push(GameEvent::Spawned {
        entity_id: entity.id.clone(),
        pos,
        template_id: entity.template_id.clone(),
    });
    next.entities.push(entity);
}

/// First unoccupied floor tile, scanning row-major from an offset hashed
/// from the actor id length so simultaneous joins spread out.
fn scan_spawn(state: &GameState, actor_id: &str) -> Option<Pos> {
    let width = state.dungeon.width;
    let total = width * state.dungeon.height;
    if total == 0 {
        return None;
    }
    let offset = ((actor_id.len() as u64).wrapping_mul(2_654_435_761) % total as u64) as usize;
    for step in 0..total {
        let index = (offset + step) % total;
        let pos = Pos { x: (index % width) as i32, y: (index / width) as i32 };
        if state.dungeon.tile_at(pos) == TileKind::Floor && !state.is_occupied(pos) {
            return Some(pos);
        }
    }
    None
}

/// Stat block used when the registry cannot supply the requested template.
fn fallback_entity(actor_id: &str, pos: Pos) -> Entity {
    let is_ai = actor_id.starts_with("ai-");
    let (kind, hp, attack, defense, behavior) = if is_ai {
        (EntityKind::Enemy, 10, 3, 0, Some("chase".to_string()))
    } else {
        (EntityKind::Player, 30, 5, 1, None)
    };
    Entity {
        id: actor_id.to_string(),
        kind,
        template_id: None,
        pos,
        hp,
        max_hp: hp,
        attack,
        defense,
        abilities: Abilities::default(),
        xp: 0,
        level: 1,
        attribute_points: 0,
        skill_points: 0,
        skills: Vec::new(),
        inventory: Inventory::new(8),
        equipment: BTreeMap::new(),
        vision_radius: 6,
        ai_behavior: behavior,
        status_effects: Vec::new(),
        xp_value: None,
    }
}
