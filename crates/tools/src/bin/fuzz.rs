//! Fuzz harness: drives a two-player hosted game with random action
//! streams and asserts the core invariants after every round.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use warren_core::content::ContentPack;
use warren_core::host::HostEngine;
use warren_core::types::{Action, ActionEnvelope, TileKind};
use warren_core::{GameConfig, SyncCoordinator};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    #[arg(short, long, default_value_t = 500)]
    rounds: u32,
}

fn choose<T: Clone>(rng: &mut ChaCha8Rng, slice: &[T]) -> T {
    let index = rng.next_u64() as usize % slice.len();
    slice[index].clone()
}

fn random_action(rng: &mut ChaCha8Rng) -> Action {
    let roll = rng.next_u64() % 10;
    match roll {
        0..=5 => {
            let (dx, dy) = choose(rng, &[(1, 0), (-1, 0), (0, 1), (0, -1)]);
            Action::Move { dx, dy }
        }
        6 => Action::Wait,
        7 => Action::DropItem { slot: (rng.next_u64() % 4) as usize },
        8 => Action::UseItem { slot: (rng.next_u64() % 4) as usize },
        _ => Action::EquipItem { slot: (rng.next_u64() % 4) as usize },
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Fuzzing {} rounds on seed {}...", args.rounds, args.seed);
    let mut config = GameConfig::new(args.seed as u32, (args.seed >> 32) as u32, vec![
        "alice".to_string(),
        "bob".to_string(),
    ]);
    config.max_levels = Some(3);
    let engine = HostEngine::new(config, Arc::new(ContentPack::default()));
    let mut sync = SyncCoordinator::new(engine);
    sync.connect("alice", None);
    sync.connect("bob", None);

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut last_turn = sync.engine().state().turn;

    for round in 0..args.rounds {
        for player in ["alice", "bob"] {
            let action = random_action(&mut rng);
            let envelope = ActionEnvelope { actor_id: player.to_string(), action };
            sync.submit_action(player, envelope)
                .expect("connected players are never rejected");
        }
        // Whoever has not acted yet gets defaulted, so rounds never stall.
        if !sync.phase_status().pending_players.is_empty() {
            sync.force_round();
        }

        let state = sync.engine().state();
        assert!(state.turn >= last_turn, "turn counter went backwards");
        last_turn = state.turn;
        for entity in &state.entities {
            assert!(entity.hp > 0, "dead entity {} persisted", entity.id);
            assert!(entity.hp <= entity.max_hp, "hp above max on {}", entity.id);
            assert!(
                state.dungeon.tile_at(entity.pos) != TileKind::Wall,
                "entity {} is inside a wall",
                entity.id
            );
        }
        if state.victory_achieved {
            println!("Victory on round {round}, stopping early.");
            break;
        }
    }

    let state = sync.engine().state();
    println!("Done. Final turn {}, level {}, {} entities.", state.turn, state.current_level, state.entities.len());
    Ok(())
}
