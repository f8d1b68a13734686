use std::sync::Arc;

use warren_core::config::GameConfig;
use warren_core::content::ContentPack;
use warren_core::host::{HostEngine, ProcessOptions};
use warren_core::replay::ReplayEngine;
use warren_core::state::GameState;
use warren_core::types::{Action, ActionEnvelope};
use warren_core::SyncCoordinator;

fn registry() -> Arc<ContentPack> {
    Arc::new(ContentPack::default())
}

fn envelope(actor: &str, action: Action) -> ActionEnvelope {
    ActionEnvelope { actor_id: actor.to_string(), action }
}

/// Drive a two-player game for `rounds` rounds through the raw host
/// engine and return its final state plus the recorded log.
fn play_live(rounds: usize) -> (GameState, warren_core::GameLog) {
    let config = GameConfig::new(31, 32, vec!["alice".to_string(), "bob".to_string()]);
    let mut engine = HostEngine::new(config, registry());
    engine.connect("alice", None);
    engine.connect("bob", None);

    // A fixed walk pattern; blocked moves are no-ops, which is fine.
    let walk = [(1, 0), (0, 1), (-1, 0), (0, -1)];
    for round in 0..rounds {
        let (dx, dy) = walk[round % walk.len()];
        engine
            .process_action("alice", envelope("alice", Action::Move { dx, dy }), ProcessOptions::default())
            .unwrap();
        engine
            .process_action("bob", envelope("bob", Action::Move { dx: -dx, dy: -dy }), ProcessOptions::default())
            .unwrap();
    }
    (engine.state(), engine.log().clone())
}

#[test]
fn seeking_to_the_end_matches_the_live_state() {
    for rounds in [0, 1, 5, 12] {
        let (live, log) = play_live(rounds);
        let mut replay = ReplayEngine::new(log, registry());
        let (replayed, report) = replay.seek_to(replay.record_count()).unwrap();
        assert!(report.is_clean(), "replay raised issues: {:?}", report.issues);
        assert_eq!(replayed, live, "replay diverged after {rounds} rounds");
    }
}

#[test]
fn warm_checkpoint_cache_and_cold_seek_agree() {
    let (_, log) = play_live(10);

    // Warm: visit every prefix in order, populating the checkpoint cache.
    let mut warm = ReplayEngine::with_interval(log.clone(), registry(), 3);
    let count = warm.record_count();
    let mut warm_states = Vec::new();
    for index in 0..=count {
        warm_states.push(warm.seek_to(index).unwrap().0);
    }

    // Cold: a fresh engine seeking each prefix directly.
    for index in 0..=count {
        let mut cold = ReplayEngine::with_interval(log.clone(), registry(), 3);
        let (state, _) = cold.seek_to(index).unwrap();
        assert_eq!(state, warm_states[index], "checkpoint cache changed the result at {index}");
    }
}

#[test]
fn seeks_are_independent_of_call_order() {
    let (_, log) = play_live(8);
    let mut replay = ReplayEngine::with_interval(log, registry(), 2);
    let count = replay.record_count();

    let late = replay.seek_to(count).unwrap().0;
    let early = replay.seek_to(2).unwrap().0;
    let late_again = replay.seek_to(count).unwrap().0;
    let early_again = replay.seek_to(2).unwrap().0;

    assert_eq!(late, late_again);
    assert_eq!(early, early_again);
}

#[test]
fn seeking_past_the_log_is_an_error() {
    let (_, log) = play_live(2);
    let mut replay = ReplayEngine::new(log, registry());
    let count = replay.record_count();
    assert!(replay.seek_to(count + 1).is_err());
}

#[test]
fn verify_determinism_passes_for_a_recorded_game() {
    let (_, log) = play_live(6);
    let replay = ReplayEngine::new(log, registry());
    assert!(replay.verify_determinism());
}

#[test]
fn snapshot_restore_is_exact_and_preferred() {
    let (live, log) = play_live(7);
    assert!(log.state_snapshot.is_some(), "live play keeps the snapshot fresh");

    let (restored, report) = HostEngine::from_log(&log, registry());
    assert!(report.is_clean());
    assert_eq!(restored.state(), live);
}

#[test]
fn snapshotless_log_falls_back_to_full_replay() {
    let (live, mut log) = play_live(5);
    log.state_snapshot = None;

    let (restored, report) = HostEngine::from_log(&log, registry());
    assert!(report.is_clean(), "fallback replay raised issues: {:?}", report.issues);
    assert_eq!(restored.state(), live);
}

#[test]
fn restored_engine_continues_identically_to_the_original() {
    let (_, log) = play_live(4);
    let (mut original, _) = HostEngine::from_log(&log, registry());
    let (mut restored, _) = HostEngine::from_log(&log, registry());

    for engine in [&mut original, &mut restored] {
        engine.connect("alice", None);
        engine
            .process_action(
                "alice",
                envelope("alice", Action::Move { dx: 1, dy: 0 }),
                ProcessOptions::default(),
            )
            .unwrap();
    }
    assert_eq!(original.state(), restored.state());
    assert_eq!(original.snapshot_hash(), restored.snapshot_hash());
}

/// The coordinator's free/batched records carry their processing mode in
/// the log, so a game played through simultaneous turns replays exactly.
#[test]
fn coordinated_rounds_replay_exactly() {
    let config = GameConfig::new(91, 92, vec!["alice".to_string(), "bob".to_string()]);
    let mut sync = SyncCoordinator::new(HostEngine::new(config, registry()));
    sync.connect("alice", None);
    sync.connect("bob", None);

    for round in 0..5 {
        let (dx, dy) = [(1, 0), (0, 1), (-1, 0)][round % 3];
        // A free action mid-round, then both turn-ending submissions.
        sync.submit_action("alice", envelope("alice", Action::Wait)).unwrap();
        assert!(sync
            .submit_action("alice", envelope("alice", Action::Move { dx, dy }))
            .unwrap()
            .is_none());
        assert!(sync
            .submit_action("bob", envelope("bob", Action::Move { dx, dy }))
            .unwrap()
            .is_some());
    }

    let live = sync.engine().state();
    let mut log = sync.engine().log().clone();
    log.state_snapshot = None;

    let (restored, report) = HostEngine::from_log(&log, registry());
    assert!(report.is_clean(), "replay raised issues: {:?}", report.issues);
    assert_eq!(restored.state(), live);
}
