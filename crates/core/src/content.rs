//! Content registry: resolves `namespace:kind` template ids to concrete
//! entity and item definitions, and owns the stat rules the combat path
//! evaluates.

use std::collections::BTreeMap;

use crate::effects::{ChanceEffect, EffectKind, EffectTrigger, Formula, StatRef};
use crate::state::{Abilities, Entity, Inventory, ItemData};
use crate::types::{ArmorClass, EntityKind, EquipSlot, Pos, WeaponClass};

pub mod keys {
    pub const PLAYER: &str = "core:player";
    pub const GOBLIN: &str = "core:goblin";
    pub const ORC: &str = "core:orc";
    pub const SKELETON: &str = "core:skeleton";
    pub const RAT: &str = "core:rat";

    pub const SHORT_SWORD: &str = "core:short_sword";
    pub const IRON_MACE: &str = "core:iron_mace";
    pub const FANG_DAGGER: &str = "core:fang_dagger";
    pub const LEATHER_ARMOR: &str = "core:leather_armor";
    pub const IRON_PLATE: &str = "core:iron_plate";
    pub const HEALING_DRAUGHT: &str = "core:healing_draught";
}

#[derive(Clone, Debug)]
pub struct EntityTemplate {
    pub kind: EntityKind,
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub abilities: Abilities,
    pub vision_radius: u32,
    pub inventory_capacity: usize,
    pub ai_behavior: Option<&'static str>,
    pub xp_value: Option<i64>,
}

/// Rules shared across all content: stat-derived combat modifiers, the
/// weapon-vs-armor effectiveness table, and baseline chance effects.
#[derive(Clone, Debug)]
pub struct StatRules {
    /// Each formula evaluates against the attacker and adds to effective
    /// attack (for example `strength floor-div 2`).
    pub attack_modifiers: Vec<Formula>,
    /// Baseline chance effects every combatant carries, on top of any
    /// effects attached to equipped items.
    pub innate_effects: Vec<ChanceEffect>,
    /// Additive effectiveness bonus for a weapon class striking an armor
    /// class.
    pub effectiveness: Vec<(WeaponClass, ArmorClass, i32)>,
}

impl StatRules {
    pub fn effectiveness_bonus(
        &self,
        weapon: Option<WeaponClass>,
        armor: Option<ArmorClass>,
    ) -> i32 {
        match (weapon, armor) {
            (Some(w), Some(a)) => self
                .effectiveness
                .iter()
                .find(|(rw, ra, _)| *rw == w && *ra == a)
                .map_or(0, |(_, _, bonus)| *bonus),
            _ => 0,
        }
    }
}

/// The contract the core consumes. Implementations must be pure: the same
/// lookup always returns the same definition, with no side effects, or
/// turn resolution stops being deterministic.
pub trait Registry {
    fn create_entity(&self, template_id: &str, instance_id: &str, pos: Pos) -> Option<Entity>;
    fn get_item(&self, item_id: &str) -> Option<ItemData>;
    fn manifests(&self) -> Vec<String>;
    fn stat_rules(&self) -> &StatRules;
    /// Chance effects carried by an item when equipped.
    fn item_effects(&self, item_id: &str) -> Vec<ChanceEffect>;
}

/// Built-in `core:` namespace content.
pub struct ContentPack {
    templates: BTreeMap<&'static str, EntityTemplate>,
    items: BTreeMap<&'static str, ItemData>,
    item_effects: BTreeMap<&'static str, Vec<ChanceEffect>>,
    rules: StatRules,
}

impl Default for ContentPack {
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(keys::PLAYER, EntityTemplate {
            kind: EntityKind::Player,
            hp: 30,
            attack: 5,
            defense: 1,
            abilities: Abilities { strength: 2, dexterity: 2, constitution: 2 },
            vision_radius: 8,
            inventory_capacity: 12,
            ai_behavior: None,
            xp_value: None,
        });
        templates.insert(keys::GOBLIN, EntityTemplate {
            kind: EntityKind::Enemy,
            hp: 10,
            attack: 3,
            defense: 0,
            abilities: Abilities { strength: 1, dexterity: 1, constitution: 0 },
            vision_radius: 6,
            inventory_capacity: 4,
            ai_behavior: Some("chase"),
            xp_value: None,
        });
        templates.insert(keys::ORC, EntityTemplate {
            kind: EntityKind::Enemy,
            hp: 18,
            attack: 5,
            defense: 1,
            abilities: Abilities { strength: 3, dexterity: 0, constitution: 1 },
            vision_radius: 6,
            inventory_capacity: 4,
            ai_behavior: Some("chase"),
            xp_value: None,
        });
        templates.insert(keys::SKELETON, EntityTemplate {
            kind: EntityKind::Enemy,
            hp: 12,
            attack: 4,
            defense: 2,
            abilities: Abilities::default(),
            vision_radius: 5,
            inventory_capacity: 2,
            ai_behavior: Some("guard"),
            xp_value: Some(25),
        });
        templates.insert(keys::RAT, EntityTemplate {
            kind: EntityKind::Enemy,
            hp: 4,
            attack: 1,
            defense: 0,
            abilities: Abilities::default(),
            vision_radius: 4,
            inventory_capacity: 1,
            ai_behavior: Some("chase"),
            xp_value: None,
        });

        let mut items = BTreeMap::new();
        items.insert(keys::SHORT_SWORD, ItemData {
            item_id: keys::SHORT_SWORD.to_string(),
            name: "Short Sword".to_string(),
            icon: "sword".to_string(),
            attack_bonus: 3,
            defense_bonus: 0,
            heal_amount: 0,
            equip_slot: Some(EquipSlot::Weapon),
            weapon_class: Some(WeaponClass::Blade),
            armor_class: None,
            consumable: false,
        });
        items.insert(keys::IRON_MACE, ItemData {
            item_id: keys::IRON_MACE.to_string(),
            name: "Iron Mace".to_string(),
            icon: "mace".to_string(),
            attack_bonus: 2,
            defense_bonus: 0,
            heal_amount: 0,
            equip_slot: Some(EquipSlot::Weapon),
            weapon_class: Some(WeaponClass::Blunt),
            armor_class: None,
            consumable: false,
        });
        items.insert(keys::FANG_DAGGER, ItemData {
            item_id: keys::FANG_DAGGER.to_string(),
            name: "Fang Dagger".to_string(),
            icon: "dagger".to_string(),
            attack_bonus: 1,
            defense_bonus: 0,
            heal_amount: 0,
            equip_slot: Some(EquipSlot::Weapon),
            weapon_class: Some(WeaponClass::Blade),
            armor_class: None,
            consumable: false,
        });
        items.insert(keys::LEATHER_ARMOR, ItemData {
            item_id: keys::LEATHER_ARMOR.to_string(),
            name: "Leather Armor".to_string(),
            icon: "armor_light".to_string(),
            attack_bonus: 0,
            defense_bonus: 1,
            heal_amount: 0,
            equip_slot: Some(EquipSlot::Armor),
            weapon_class: None,
            armor_class: Some(ArmorClass::Light),
            consumable: false,
        });
        items.insert(keys::IRON_PLATE, ItemData {
            item_id: keys::IRON_PLATE.to_string(),
            name: "Iron Plate".to_string(),
            icon: "armor_heavy".to_string(),
            attack_bonus: 0,
            defense_bonus: 3,
            heal_amount: 0,
            equip_slot: Some(EquipSlot::Armor),
            weapon_class: None,
            armor_class: Some(ArmorClass::Heavy),
            consumable: false,
        });
        items.insert(keys::HEALING_DRAUGHT, ItemData {
            item_id: keys::HEALING_DRAUGHT.to_string(),
            name: "Healing Draught".to_string(),
            icon: "potion".to_string(),
            attack_bonus: 0,
            defense_bonus: 0,
            heal_amount: 10,
            equip_slot: None,
            weapon_class: None,
            armor_class: None,
            consumable: true,
        });

        let mut item_effects: BTreeMap<&'static str, Vec<ChanceEffect>> = BTreeMap::new();
        item_effects.insert(keys::IRON_MACE, vec![ChanceEffect {
            trigger: EffectTrigger::OnAttack,
            chance: Formula::constant(15.0),
            effect: EffectKind::Stun { turns: 1 },
        }]);
        item_effects.insert(keys::FANG_DAGGER, vec![ChanceEffect {
            trigger: EffectTrigger::OnAttack,
            chance: Formula::constant(100.0),
            effect: EffectKind::Lifesteal { percent: 25.0 },
        }]);

        let rules = StatRules {
            attack_modifiers: vec![Formula::floor_divide(
                Formula::stat(StatRef::Strength),
                Formula::constant(2.0),
            )],
            innate_effects: vec![
                ChanceEffect {
                    trigger: EffectTrigger::OnAttack,
                    chance: Formula::divide(
                        Formula::stat(StatRef::Dexterity),
                        Formula::constant(4.0),
                    ),
                    effect: EffectKind::CriticalMultiply { factor: 2.0 },
                },
                ChanceEffect {
                    trigger: EffectTrigger::OnDefend,
                    chance: Formula::divide(
                        Formula::stat(StatRef::Dexterity),
                        Formula::constant(2.0),
                    ),
                    effect: EffectKind::Dodge,
                },
            ],
            effectiveness: vec![
                (WeaponClass::Blade, ArmorClass::Light, 2),
                (WeaponClass::Blunt, ArmorClass::Heavy, 2),
            ],
        };

        Self { templates, items, item_effects, rules }
    }
}

impl Registry for ContentPack {
    fn create_entity(&self, template_id: &str, instance_id: &str, pos: Pos) -> Option<Entity> {
        let template = self.templates.get(template_id)?;
        Some(Entity {
            id: instance_id.to_string(),
            kind: template.kind,
            template_id: Some(template_id.to_string()),
            pos,
            hp: template.hp,
            max_hp: template.hp,
            attack: template.attack,
            defense: template.defense,
            abilities: template.abilities,
            xp: 0,
            level: 1,
            attribute_points: 0,
            skill_points: 0,
            skills: Vec::new(),
            inventory: Inventory::new(template.inventory_capacity),
            equipment: BTreeMap::new(),
            vision_radius: template.vision_radius,
            ai_behavior: template.ai_behavior.map(str::to_string),
            status_effects: Vec::new(),
            xp_value: template.xp_value,
        })
    }

    fn get_item(&self, item_id: &str) -> Option<ItemData> {
        self.items.get(item_id).cloned()
    }

    fn manifests(&self) -> Vec<String> {
        let mut all: Vec<String> = self.templates.keys().map(|k| (*k).to_string()).collect();
        all.extend(self.items.keys().map(|k| (*k).to_string()));
        all
    }

    fn stat_rules(&self) -> &StatRules {
        &self.rules
    }

    fn item_effects(&self, item_id: &str) -> Vec<ChanceEffect> {
        self.item_effects.get(item_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_template_returns_none() {
        let pack = ContentPack::default();
        assert!(pack.create_entity("mods:dragon", "e1", Pos { x: 1, y: 1 }).is_none());
    }

    #[test]
    fn created_entity_carries_template_stats() {
        let pack = ContentPack::default();
        let goblin = pack.create_entity(keys::GOBLIN, "ai-g1", Pos { x: 2, y: 3 }).unwrap();
        assert_eq!(goblin.kind, EntityKind::Enemy);
        assert_eq!(goblin.hp, 10);
        assert_eq!(goblin.ai_behavior.as_deref(), Some("chase"));
        assert_eq!(goblin.pos, Pos { x: 2, y: 3 });
    }

    #[test]
    fn effectiveness_bonus_requires_both_classes() {
        let pack = ContentPack::default();
        let rules = pack.stat_rules();
        assert_eq!(
            rules.effectiveness_bonus(Some(WeaponClass::Blade), Some(ArmorClass::Light)),
            2
        );
        assert_eq!(rules.effectiveness_bonus(Some(WeaponClass::Blade), None), 0);
        assert_eq!(rules.effectiveness_bonus(None, Some(ArmorClass::Heavy)), 0);
    }
}
