//! Host/authority engine.
//!
//! One peer runs this engine and owns the canonical `GameState`. Peers
//! send intents; the engine verifies the sender's identity, resolves the
//! action through the pure resolver, runs enemy AI, advances the round,
//! and records everything in the game log. All mutation is serialized
//! through `process_action`; nothing else writes the state.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::GameConfig;
use crate::content::Registry;
use crate::gamelog::{GameLog, ProcessMode, TurnRecord, now_ms};
use crate::mapgen::{self, MultiLevelDungeon};
use crate::replay::{ReplayIssue, ReplayReport};
use crate::resolve::{advance_turn, resolve_turn};
use crate::state::{Entity, GameState, GroundItem, LevelMap};
use crate::types::*;

pub mod ai;
pub mod sync;

use ai::{Perception, agent_for};

/// The per-action diff broadcast to every peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub turn: u64,
    pub events: Vec<GameEvent>,
    pub envelope: ActionEnvelope,
    /// Full state included when the delta alone cannot bring a client up
    /// to date (spawns, level transitions, terminal events).
    #[serde(default)]
    pub current_state: Option<GameState>,
}

/// Payload returned to the connecting peer alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub player_id: String,
    pub initial_state: GameState,
    pub mods: Vec<String>,
    pub connected_entity_ids: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ConnectOutcome {
    pub welcome: Welcome,
    pub broadcast: Delta,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessOptions {
    pub skip_ai: bool,
    pub skip_turn_advance: bool,
    pub replaying: bool,
}

impl ProcessOptions {
    pub fn replay(mode: ProcessMode) -> Self {
        match mode {
            ProcessMode::Full => Self { replaying: true, ..Self::default() },
            ProcessMode::Free | ProcessMode::JoinOnly => {
                Self { skip_ai: true, skip_turn_advance: true, replaying: true }
            }
        }
    }
}

pub struct HostEngine {
    state: GameState,
    registry: Arc<dyn Registry>,
    dungeon: MultiLevelDungeon,
    /// peer id -> stable user identity.
    users: BTreeMap<String, String>,
    /// Human identities that have ever had an entity in this game.
    joined_humans: BTreeSet<String>,
    /// Entity ids under roster AI control.
    ai_roster: Vec<String>,
    defeated: bool,
    log: GameLog,
}

impl HostEngine {
    pub fn new(config: GameConfig, registry: Arc<dyn Registry>) -> Self {
        let max_levels = config.max_levels.unwrap_or(1).max(1);
        let mut dungeon = mapgen::generate(config.dungeon_seed, max_levels);
        if let Some(custom) = &config.custom_level {
            dungeon.levels[0] = mapgen::from_custom(custom);
        }

        let mut state = GameState {
            dungeon: dungeon.levels[0].map.clone(),
            entities: Vec::new(),
            ground_items: Vec::new(),
            turn: 0,
            seed: config.rng_seed,
            current_level: 0,
            max_levels,
            level_enemies: BTreeMap::new(),
            level_maps: BTreeMap::new(),
            victory_achieved: false,
            next_ground_id: 0,
        };

        if let Some(custom) = &config.custom_level {
            // Editor-placed entities are static: they act each action but
            // never join the roster.
            for (index, spawn) in custom.entities.iter().enumerate() {
                let id = format!("static-l0-e{index}");
                if let Some(entity) = registry.create_entity(&spawn.template_id, &id, spawn.pos) {
                    state.entities.push(entity);
                }
            }
            for item in &custom.items {
                if let Some(data) = registry.get_item(&item.item_id) {
                    let ground_id = state.alloc_ground_id();
                    state.ground_items.push(GroundItem {
                        ground_id,
                        pos: item.pos,
                        quantity: item.quantity,
                        data,
                    });
                }
            }
        } else {
            spawn_level_enemies(&mut state, &dungeon, 0, registry.as_ref());
        }

        let ai_roster = derive_roster(&state);
        let log = GameLog::new(config, "warren session");

        Self {
            state,
            registry,
            dungeon,
            users: BTreeMap::new(),
            joined_humans: BTreeSet::new(),
            ai_roster,
            defeated: false,
            log,
        }
    }

    /// Map a peer to a stable identity and bring its entity into the game.
    ///
    /// Reconnecting under an identity that already has an entity reclaims
    /// that entity exactly; a synthetic spawn is broadcast and nothing new
    /// joins the state.
    pub fn connect(&mut self, peer_id: &str, persistent_id: Option<&str>) -> ConnectOutcome {
        let user_id = persistent_id.unwrap_or(peer_id).to_string();
        self.users.insert(peer_id.to_string(), user_id.clone());

        let envelope = ActionEnvelope {
            actor_id: user_id.clone(),
            action: Action::Join {
                template_id: None,
                spawn_hint: self.spawn_hint(),
            },
        };

        let events = if let Some(existing) = self.state.entity(&user_id) {
            log::info!("peer {peer_id} reclaimed entity {user_id}");
            vec![GameEvent::Spawned {
                entity_id: existing.id.clone(),
                pos: existing.pos,
                template_id: existing.template_id.clone(),
            }]
        } else {
            log::info!("peer {peer_id} joining as {user_id}");
            let resolution = resolve_turn(&self.state, &envelope, self.registry.as_ref());
            self.state = resolution.state;
            self.ai_roster = derive_roster(&self.state);
            self.append_record(&envelope, &resolution.events, ProcessMode::JoinOnly);
            resolution.events
        };

        if !is_ai_identity(&user_id) && self.state.entity(&user_id).is_some() {
            self.joined_humans.insert(user_id.clone());
        }

        let broadcast = Delta {
            turn: self.state.turn,
            events,
            envelope,
            current_state: Some(self.state.clone()),
        };
        let welcome = Welcome {
            player_id: user_id,
            initial_state: self.state.clone(),
            mods: self.log.config.mods.clone(),
            connected_entity_ids: self.connected_entity_ids(),
        };
        ConnectOutcome { welcome, broadcast }
    }

    /// Resolve one action for a connected peer. The envelope's `actor_id`
    /// is always replaced with the peer's mapped identity first.
    pub fn process_action(
        &mut self,
        peer_id: &str,
        envelope: ActionEnvelope,
        opts: ProcessOptions,
    ) -> Result<Delta, HostError> {
        let identity = match self.users.get(peer_id) {
            Some(user) => user.clone(),
            // Replay applies records whose identities were verified when
            // they were written.
            None if opts.replaying => envelope.actor_id.clone(),
            None => return Err(HostError::NotConnected { peer_id: peer_id.to_string() }),
        };
        Ok(self.process_identity_action(&identity, envelope.action, opts))
    }

    /// The trusted entry point: `identity` has already been verified. The
    /// simultaneous coordinator drives queued batches through here.
    pub fn process_identity_action(
        &mut self,
        identity: &str,
        action: Action,
        opts: ProcessOptions,
    ) -> Delta {
        let identity = identity.to_string();
        let envelope = ActionEnvelope { actor_id: identity.clone(), action };

        let resolution = resolve_turn(&self.state, &envelope, self.registry.as_ref());
        self.state = resolution.state;
        let mut events = resolution.events;

        self.ai_roster = derive_roster(&self.state);

        events.extend(self.check_stairs(&identity));
        events.extend(self.check_victory(&identity));
        events.extend(self.check_defeat());

        events.extend(self.process_static_ai());
        if !opts.skip_ai {
            events.extend(self.process_ai_actions());
        }
        if !opts.skip_turn_advance {
            self.state = advance_turn(&self.state);
        }

        if !opts.replaying {
            let mode = if opts.skip_ai && opts.skip_turn_advance {
                ProcessMode::Free
            } else {
                ProcessMode::Full
            };
            self.append_record(&envelope, &events, mode);
        }

        let include_state = events.iter().any(|event| {
            matches!(
                event,
                GameEvent::Spawned { .. }
                    | GameEvent::LevelTransition { .. }
                    | GameEvent::Victory { .. }
                    | GameEvent::Defeat
            )
        });
        Delta {
            turn: self.state.turn,
            events,
            envelope,
            current_state: include_state.then(|| self.state.clone()),
        }
    }

    /// One decision per roster controller, each resolved exactly like a
    /// human action. Controllers whose entity died are pruned first.
    pub fn process_ai_actions(&mut self) -> Vec<GameEvent> {
        self.ai_roster.retain(|id| self.state.entity(id).is_some());
        let mut events = Vec::new();
        for id in self.ai_roster.clone() {
            // The entity may have died earlier in this same batch.
            let Some(entity) = self.state.entity(&id) else {
                continue;
            };
            let behavior = entity.ai_behavior.clone().unwrap_or_else(|| "chase".to_string());
            let Some(perception) = Perception::build(&self.state, &id) else {
                continue;
            };
            let action = agent_for(&behavior).decide(&perception);
            let envelope = ActionEnvelope { actor_id: id, action };
            let resolution = resolve_turn(&self.state, &envelope, self.registry.as_ref());
            self.state = resolution.state;
            events.extend(resolution.events);
        }
        events
    }

    /// Reconstruct an engine from a persisted log. The snapshot path is
    /// preferred and exact; without a snapshot the turns are replayed
    /// best-effort and every problem lands in the report.
    pub fn from_log(log: &GameLog, registry: Arc<dyn Registry>) -> (Self, ReplayReport) {
        if let Some(snapshot) = &log.state_snapshot {
            let mut engine = Self::new(log.config.clone(), registry);
            engine.state = snapshot.clone();
            engine.ai_roster = derive_roster(&engine.state);
            engine.joined_humans = snapshot
                .entities
                .iter()
                .filter(|entity| entity.kind == EntityKind::Player && !is_ai_identity(&entity.id))
                .map(|entity| entity.id.clone())
                .collect();
            engine.log = log.clone();
            return (engine, ReplayReport::default());
        }

        let mut engine = Self::new(log.config.clone(), registry);
        let mut report = ReplayReport::default();
        for (index, record) in log.turns.iter().enumerate() {
            engine.apply_record(record, index, &mut report);
        }
        engine.log = log.clone();
        (engine, report)
    }

    /// Apply one logged record in replay mode, collecting any failure
    /// into the report instead of aborting.
    pub(crate) fn apply_record(
        &mut self,
        record: &TurnRecord,
        index: usize,
        report: &mut ReplayReport,
    ) {
        if record.mode == ProcessMode::JoinOnly {
            let resolution = resolve_turn(&self.state, &record.envelope, self.registry.as_ref());
            self.state = resolution.state;
            self.ai_roster = derive_roster(&self.state);
            let user_id = &record.envelope.actor_id;
            if !is_ai_identity(user_id) && self.state.entity(user_id).is_some() {
                self.joined_humans.insert(user_id.clone());
            }
            return;
        }

        let peer = record.envelope.actor_id.clone();
        match self.process_action(&peer, record.envelope.clone(), ProcessOptions::replay(record.mode))
        {
            Ok(delta) => {
                for event in &delta.events {
                    if let GameEvent::Error { message } = event {
                        report.issues.push(ReplayIssue {
                            index,
                            turn: record.turn,
                            message: message.clone(),
                        });
                    }
                }
            }
            Err(error) => {
                report.issues.push(ReplayIssue {
                    index,
                    turn: record.turn,
                    message: error.to_string(),
                });
            }
        }
    }

    /// Deep copy for consumers; nothing outside the engine ever holds a
    /// reference into the live state.
    pub fn state(&self) -> GameState {
        self.state.clone()
    }

    pub fn log(&self) -> &GameLog {
        &self.log
    }

    pub fn config(&self) -> &GameConfig {
        &self.log.config
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        Arc::clone(&self.registry)
    }

    pub fn identity_of(&self, peer_id: &str) -> Option<&str> {
        self.users.get(peer_id).map(String::as_str)
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }

    pub fn has_living_entity(&self, id: &str) -> bool {
        self.state.entity(id).is_some_and(Entity::is_alive)
    }

    pub fn snapshot_hash(&self) -> u64 {
        let bytes = serde_json::to_vec(&self.state).unwrap_or_default();
        xxh3_64(&bytes)
    }

    pub fn connected_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .users
            .values()
            .filter(|user| self.state.entity(user).is_some())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn spawn_hint(&self) -> Option<Pos> {
        if self.state.current_level != 0 {
            return None;
        }
        self.log.config.custom_level.as_ref().and_then(|custom| custom.spawn)
    }

    fn append_record(&mut self, envelope: &ActionEnvelope, events: &[GameEvent], mode: ProcessMode) {
        self.log.turns.push(TurnRecord {
            turn: self.state.turn,
            envelope: envelope.clone(),
            events: events.to_vec(),
            timestamp: now_ms(),
            mode,
        });
        self.log.state_snapshot = Some(self.state.clone());
        self.log.meta.last_saved = now_ms();
    }

    // -----------------------------------------------------------------------
    // Post-resolution checks
    // -----------------------------------------------------------------------

    fn check_stairs(&mut self, actor_id: &str) -> Vec<GameEvent> {
        if self.state.max_levels <= 1 {
            return Vec::new();
        }
        let Some(actor) = self.state.entity(actor_id) else {
            return Vec::new();
        };
        match self.state.dungeon.tile_at(actor.pos) {
            TileKind::StairsDown if self.state.current_level + 1 < self.state.max_levels => {
                self.transition_level(self.state.current_level + 1)
            }
            TileKind::StairsUp if self.state.current_level > 0 => {
                self.transition_level(self.state.current_level - 1)
            }
            _ => Vec::new(),
        }
    }

    /// Move every player to `to_level`, preserving the left level's live
    /// enemies and seen tiles so a later visit resumes where it stopped.
    fn transition_level(&mut self, to_level: u32) -> Vec<GameEvent> {
        let from_level = self.state.current_level;
        log::debug!("level transition {from_level} -> {to_level}");

        let (players, enemies): (Vec<Entity>, Vec<Entity>) = mem::take(&mut self.state.entities)
            .into_iter()
            .partition(|entity| entity.kind == EntityKind::Player);
        self.state.level_enemies.insert(from_level, enemies);
        self.state.level_maps.insert(from_level, self.state.dungeon.clone());

        let generated = self.dungeon.level(to_level);
        self.state.dungeon = self
            .state
            .level_maps
            .remove(&to_level)
            .unwrap_or_else(|| generated.map.clone());
        self.state.current_level = to_level;

        // Arriving downstairs puts the party on the new level's up-stairs
        // and vice versa.
        let arrival = if to_level > from_level {
            generated.stairs_up.unwrap_or(generated.spawn)
        } else {
            generated.stairs_down.unwrap_or(generated.spawn)
        };
        self.state.entities = players;
        let mut taken: Vec<Pos> = Vec::new();
        for entity in &mut self.state.entities {
            let pos = next_free_around(&self.state.dungeon, arrival, &taken);
            taken.push(pos);
            entity.pos = pos;
        }

        let returning = self.state.level_enemies.remove(&to_level);
        match returning {
            Some(enemies) => self.state.entities.extend(enemies),
            None => {
                spawn_level_enemies(&mut self.state, &self.dungeon, to_level, self.registry.as_ref())
            }
        }
        self.ai_roster = derive_roster(&self.state);

        // Reveal around each arrival so clients have something to draw.
        let reveals: Vec<(Pos, u32)> = self
            .state
            .entities
            .iter()
            .filter(|entity| entity.kind == EntityKind::Player)
            .map(|entity| (entity.pos, entity.vision_radius))
            .collect();
        for (pos, radius) in reveals {
            self.state.dungeon.reveal_around(pos, radius as i32);
        }

        vec![GameEvent::LevelTransition { from_level, to_level }]
    }

    fn check_victory(&mut self, actor_id: &str) -> Vec<GameEvent> {
        if self.state.victory_achieved {
            return Vec::new();
        }
        let Some(actor) = self.state.entity(actor_id) else {
            return Vec::new();
        };
        if self.state.dungeon.tile_at(actor.pos) != TileKind::Exit {
            return Vec::new();
        }
        self.state.victory_achieved = true;
        log::info!("victory achieved by {actor_id}");
        vec![GameEvent::Victory { entity_id: actor_id.to_string() }]
    }

    fn check_defeat(&mut self) -> Vec<GameEvent> {
        if self.defeated || self.joined_humans.is_empty() {
            return Vec::new();
        }
        let all_dead = self
            .joined_humans
            .iter()
            .all(|user| self.state.entity(user).is_none_or(|entity| !entity.is_alive()));
        if !all_dead {
            return Vec::new();
        }
        self.defeated = true;
        log::info!("all players down, game over");
        vec![GameEvent::Defeat]
    }

    /// Level-editor-placed enemies act synchronously on every processed
    /// action, before roster AI.
    fn process_static_ai(&mut self) -> Vec<GameEvent> {
        let static_ids: Vec<String> = self
            .state
            .entities
            .iter()
            .filter(|entity| {
                entity.kind == EntityKind::Enemy
                    && entity.ai_behavior.is_some()
                    && !is_ai_identity(&entity.id)
            })
            .map(|entity| entity.id.clone())
            .collect();

        let mut events = Vec::new();
        for id in static_ids {
            let Some(entity) = self.state.entity(&id) else {
                continue;
            };
            let behavior = entity.ai_behavior.clone().unwrap_or_default();
            let Some(perception) = Perception::build(&self.state, &id) else {
                continue;
            };
            let action = agent_for(&behavior).decide(&perception);
            let envelope = ActionEnvelope { actor_id: id, action };
            let resolution = resolve_turn(&self.state, &envelope, self.registry.as_ref());
            self.state = resolution.state;
            events.extend(resolution.events);
        }
        events
    }
}

fn is_ai_identity(id: &str) -> bool {
    id.starts_with("ai-")
}

/// Roster controllers are exactly the `ai-` entities carrying a behavior
/// tag. Re-derivable from any state, which is what makes the snapshot
/// restore path exact.
fn derive_roster(state: &GameState) -> Vec<String> {
    state
        .entities
        .iter()
        .filter(|entity| is_ai_identity(&entity.id) && entity.ai_behavior.is_some())
        .map(|entity| entity.id.clone())
        .collect()
}

fn spawn_level_enemies(
    state: &mut GameState,
    dungeon: &MultiLevelDungeon,
    level: u32,
    registry: &dyn Registry,
) {
    let generated = dungeon.level(level);
    for (index, spawn) in generated.enemy_spawns.iter().enumerate() {
        let id = format!("ai-l{level}-e{index}");
        if state.entity(&id).is_some() || state.is_occupied(spawn.pos) {
            continue;
        }
        if let Some(entity) = registry.create_entity(&spawn.template_id, &id, spawn.pos) {
            state.entities.push(entity);
        }
    }
}

/// Nearest free tile to `center` that is not itself a stairs tile, so a
/// freshly arrived party never re-triggers the transition it came from.
fn next_free_around(map: &LevelMap, center: Pos, taken: &[Pos]) -> Pos {
    let placeable = |pos: Pos| {
        map.is_walkable(pos)
            && map.tile_at(pos) != TileKind::StairsDown
            && map.tile_at(pos) != TileKind::StairsUp
            && !taken.contains(&pos)
    };
    if placeable(center) {
        return center;
    }
    for radius in 1..8 {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let pos = center.offset(dx, dy);
                if placeable(pos) {
                    return pos;
                }
            }
        }
    }
    center
}
