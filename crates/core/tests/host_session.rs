use std::sync::Arc;

use warren_core::config::{CustomLevel, CustomSpawn, GameConfig};
use warren_core::content::ContentPack;
use warren_core::host::{HostEngine, ProcessOptions};
use warren_core::types::{Action, ActionEnvelope, GameEvent, HostError, Pos, TileKind};

fn registry() -> Arc<ContentPack> {
    Arc::new(ContentPack::default())
}

fn envelope(actor: &str, action: Action) -> ActionEnvelope {
    ActionEnvelope { actor_id: actor.to_string(), action }
}

/// An open 7x7 room (walled border) with optional extra tiles.
fn room_level() -> CustomLevel {
    let width = 7;
    let height = 7;
    let mut tiles = vec![TileKind::Floor; width * height];
    for x in 0..width {
        tiles[x] = TileKind::Wall;
        tiles[(height - 1) * width + x] = TileKind::Wall;
    }
    for y in 0..height {
        tiles[y * width] = TileKind::Wall;
        tiles[y * width + width - 1] = TileKind::Wall;
    }
    CustomLevel {
        width,
        height,
        tiles,
        entities: Vec::new(),
        items: Vec::new(),
        spawn: Some(Pos { x: 1, y: 1 }),
    }
}

fn config_with_level(custom: CustomLevel) -> GameConfig {
    let mut config = GameConfig::new(3, 4, vec!["alice".to_string()]);
    config.custom_level = Some(custom);
    config
}

#[test]
fn reconnect_reclaims_the_existing_entity() {
    let config = GameConfig::new(21, 22, vec!["alice".to_string()]);
    let mut engine = HostEngine::new(config, registry());

    let first = engine.connect("peer-1", Some("alice"));
    assert!(first.broadcast.events.iter().any(|e| matches!(e, GameEvent::Spawned { .. })));
    engine
        .process_action("peer-1", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
        .unwrap();
    let pos_before = engine.state().entity("alice").unwrap().pos;

    // Same persistent identity from a new peer: identity marriage.
    let second = engine.connect("peer-2", Some("alice"));
    let state = engine.state();
    let alices: Vec<_> = state.entities.iter().filter(|e| e.id == "alice").collect();
    assert_eq!(alices.len(), 1, "no duplicate entity on reconnect");
    assert_eq!(alices[0].pos, pos_before, "the prior entity is reclaimed exactly");
    assert!(
        second.broadcast.events.iter().any(|e| matches!(e, GameEvent::Spawned { .. })),
        "reclaim re-broadcasts a synthetic spawn"
    );
}

#[test]
fn forged_actor_ids_are_overwritten_with_the_mapped_identity() {
    let config = GameConfig::new(21, 22, vec!["alice".to_string(), "bob".to_string()]);
    let mut engine = HostEngine::new(config, registry());
    engine.connect("peer-a", Some("alice"));
    engine.connect("peer-b", Some("bob"));
    let bob_before = engine.state().entity("bob").unwrap().clone();

    // peer-a forges bob's identity; the host resolves for alice anyway.
    let delta = engine
        .process_action("peer-a", envelope("bob", Action::Move { dx: 0, dy: 1 }), ProcessOptions::default())
        .unwrap();

    assert_eq!(delta.envelope.actor_id, "alice");
    let bob_after = engine.state().entity("bob").unwrap().clone();
    assert_eq!(bob_before.pos, bob_after.pos, "bob never moved");
}

#[test]
fn unmapped_peers_are_rejected_outside_replay() {
    let config = GameConfig::new(21, 22, vec![]);
    let mut engine = HostEngine::new(config, registry());
    let result = engine.process_action(
        "stranger",
        envelope("stranger", Action::Wait),
        ProcessOptions::default(),
    );
    assert!(matches!(result, Err(HostError::NotConnected { .. })));
}

#[test]
fn standing_on_the_exit_achieves_victory_once() {
    let mut level = room_level();
    level.tiles[1 * 7 + 2] = TileKind::Exit; // beside the spawn
    let mut engine = HostEngine::new(config_with_level(level), registry());
    engine.connect("alice", None);

    let delta = engine
        .process_action("alice", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
        .unwrap();
    assert!(delta.events.iter().any(|e| matches!(e, GameEvent::Victory { .. })));
    assert!(engine.state().victory_achieved);

    // Stepping off and back on does not re-trigger the terminal flag.
    engine
        .process_action("alice", envelope("alice", Action::Move { dx: -1, dy: 0 }), ProcessOptions::default())
        .unwrap();
    let back = engine
        .process_action("alice", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
        .unwrap();
    assert!(!back.events.iter().any(|e| matches!(e, GameEvent::Victory { .. })));
    assert!(engine.state().victory_achieved);
}

#[test]
fn all_players_down_is_a_defeat() {
    let mut level = room_level();
    // A static orc parked next to the spawn chews through the lone player.
    level.entities.push(CustomSpawn {
        template_id: "core:orc".to_string(),
        pos: Pos { x: 2, y: 1 },
    });
    let mut engine = HostEngine::new(config_with_level(level), registry());
    engine.connect("alice", None);

    let mut defeated = false;
    for _ in 0..40 {
        let delta = engine
            .process_action("alice", envelope("alice", Action::Wait), ProcessOptions::default())
            .unwrap();
        if delta.events.iter().any(|e| matches!(e, GameEvent::Defeat)) {
            defeated = true;
            break;
        }
    }
    assert!(defeated, "the lone player's death ends the game");
    assert!(engine.is_defeated());
    assert!(engine.state().entity("alice").is_none(), "dead entities are purged");
}

#[test]
fn stairs_under_an_actor_trigger_a_level_transition() {
    let mut level = room_level();
    level.tiles[1 * 7 + 2] = TileKind::StairsDown;
    let mut config = config_with_level(level);
    config.max_levels = Some(3);
    let mut engine = HostEngine::new(config, registry());
    engine.connect("alice", None);

    let delta = engine
        .process_action("alice", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
        .unwrap();

    assert!(
        delta
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::LevelTransition { from_level: 0, to_level: 1 })),
        "walking onto down-stairs descends"
    );
    let state = engine.state();
    assert_eq!(state.current_level, 1);
    assert!(state.level_maps.contains_key(&0), "the left level's map is preserved");
    let alice = state.entity("alice").expect("alice travelled");
    let tile = state.dungeon.tile_at(alice.pos);
    assert!(
        tile != TileKind::StairsUp && tile != TileKind::StairsDown,
        "arrival never lands on stairs"
    );
    assert!(delta.current_state.is_some(), "transitions broadcast the full state");
}

#[test]
fn level_rosters_persist_across_transitions() {
    let mut level = room_level();
    level.tiles[1 * 7 + 2] = TileKind::StairsDown;
    let mut config = config_with_level(level);
    config.max_levels = Some(2);
    let mut engine = HostEngine::new(config, registry());
    engine.connect("alice", None);

    engine
        .process_action("alice", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
        .unwrap();
    let state = engine.state();
    assert_eq!(state.current_level, 1);
    let roster: Vec<_> =
        state.entities.iter().filter(|e| e.id.starts_with("ai-l1-")).collect();
    assert!(!roster.is_empty(), "level 1 spawned its deterministic roster");
}

#[test]
fn the_log_round_trips_through_json_exactly() {
    let config = GameConfig::new(55, 56, vec!["alice".to_string()]);
    let mut engine = HostEngine::new(config, registry());
    engine.connect("alice", None);
    for _ in 0..3 {
        engine
            .process_action("alice", envelope("alice", Action::Move { dx: 1, dy: 0 }), ProcessOptions::default())
            .unwrap();
    }

    let log = engine.log();
    let json = serde_json::to_string(log).unwrap();
    let back: warren_core::GameLog = serde_json::from_str(&json).unwrap();
    assert_eq!(*log, back);
}

#[test]
fn welcome_lists_connected_entities_and_mods() {
    let mut config = GameConfig::new(61, 62, vec!["alice".to_string(), "bob".to_string()]);
    config.mods = vec!["mods:torchlight".to_string()];
    let mut engine = HostEngine::new(config, registry());
    engine.connect("peer-a", Some("alice"));
    let outcome = engine.connect("peer-b", Some("bob"));

    assert_eq!(outcome.welcome.player_id, "bob");
    assert_eq!(outcome.welcome.mods, vec!["mods:torchlight".to_string()]);
    let mut ids = outcome.welcome.connected_entity_ids.clone();
    ids.sort();
    assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
}
