//! AI decision agents.
//!
//! An agent sees a filtered perception of the state, never the state
//! itself, and returns one action for the entity it controls. Decisions
//! must be a pure function of the perception, or replay stops matching
//! the live run.

use crate::state::{Entity, GameState, LevelMap};
use crate::types::{Action, Pos, manhattan};

/// The filtered view handed to an agent: its own entity, every living
/// entity inside its vision radius, and the current level layout.
#[derive(Clone, Debug)]
pub struct Perception {
    pub self_entity: Entity,
    pub visible_entities: Vec<Entity>,
    pub dungeon: LevelMap,
    pub turn: u64,
}

impl Perception {
    pub fn build(state: &GameState, entity_id: &str) -> Option<Perception> {
        let own = state.entity(entity_id)?.clone();
        let visible = state
            .entities
            .iter()
            .filter(|other| {
                other.id != own.id
                    && other.is_alive()
                    && manhattan(other.pos, own.pos) <= own.vision_radius
            })
            .cloned()
            .collect();
        Some(Perception {
            self_entity: own,
            visible_entities: visible,
            dungeon: state.dungeon.clone(),
            turn: state.turn,
        })
    }

    fn is_open(&self, pos: Pos) -> bool {
        self.dungeon.is_walkable(pos)
            && !self.visible_entities.iter().any(|other| other.pos == pos)
    }
}

pub trait AiAgent {
    fn decide(&self, perception: &Perception) -> Action;
}

/// Steps toward the nearest opposing entity in sight and attacks by moving
/// into it. Ties break on entity order, axis preference on the larger
/// remaining distance, so decisions are stable across replays.
pub struct ChaseAi;

impl AiAgent for ChaseAi {
    fn decide(&self, perception: &Perception) -> Action {
        let own = &perception.self_entity;
        let Some(target) = nearest_opponent(perception) else {
            return Action::Wait;
        };

        let dx = target.pos.x - own.pos.x;
        let dy = target.pos.y - own.pos.y;
        if dx.abs() + dy.abs() == 1 {
            // Adjacent: the move resolves as an attack.
            return Action::Move { dx, dy };
        }

        let horizontal = Action::Move { dx: dx.signum(), dy: 0 };
        let vertical = Action::Move { dx: 0, dy: dy.signum() };
        let (first, second) =
            if dx.abs() >= dy.abs() { (horizontal, vertical) } else { (vertical, horizontal) };

        for candidate in [first, second] {
            if let Action::Move { dx, dy } = candidate
                && (dx != 0 || dy != 0)
                && perception.is_open(own.pos.offset(dx, dy))
            {
                return candidate;
            }
        }
        Action::Wait
    }
}

/// Holds position; only strikes opponents that step adjacent.
pub struct GuardAi;

impl AiAgent for GuardAi {
    fn decide(&self, perception: &Perception) -> Action {
        let own = &perception.self_entity;
        let adjacent = perception
            .visible_entities
            .iter()
            .filter(|other| other.kind != own.kind)
            .find(|other| manhattan(other.pos, own.pos) == 1);
        match adjacent {
            Some(target) => {
                Action::Move { dx: target.pos.x - own.pos.x, dy: target.pos.y - own.pos.y }
            }
            None => Action::Wait,
        }
    }
}

fn nearest_opponent<'a>(perception: &'a Perception) -> Option<&'a Entity> {
    let own = &perception.self_entity;
    perception
        .visible_entities
        .iter()
        .filter(|other| other.kind != own.kind)
        .min_by_key(|other| manhattan(other.pos, own.pos))
}

/// Resolve a behavior tag from content to an agent. Unknown tags guard.
pub fn agent_for(tag: &str) -> &'static dyn AiAgent {
    match tag {
        "chase" => &ChaseAi,
        _ => &GuardAi,
    }
}
