use proptest::prelude::*;

use warren_core::content::ContentPack;
use warren_core::resolve::resolve_turn;
use warren_core::state::GameState;
use warren_core::test_support::{empty_state, make_entity};
use warren_core::types::{Action, ActionEnvelope, EntityKind, Pos};

/// A small scene with a player next to an enemy so move actions exercise
/// combat, pickups, and the stochastic effect path.
fn combat_scene(seed: u32) -> GameState {
    let mut state = empty_state(8, 8, seed);
    let mut player = make_entity("alice", EntityKind::Player, Pos { x: 3, y: 3 }, 40, 6);
    player.abilities.dexterity = 8;
    player.abilities.strength = 4;
    state.entities.push(player);
    let mut enemy = make_entity("ai-g1", EntityKind::Enemy, Pos { x: 4, y: 3 }, 25, 4);
    enemy.abilities.dexterity = 6;
    state.entities.push(enemy);
    state
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (-1i32..=1, -1i32..=1).prop_map(|(dx, dy)| Action::Move { dx, dy }),
        Just(Action::Wait),
        (0usize..4).prop_map(|slot| Action::DropItem { slot }),
        (0usize..4).prop_map(|slot| Action::UseItem { slot }),
        Just(Action::LevelUp { attributes: vec![], skills: vec![] }),
    ]
}

fn arb_actor() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("alice".to_string()),
        Just("ai-g1".to_string()),
        Just("nobody".to_string()),
    ]
}

proptest! {
    /// Identical `(state, action)` inputs always produce structurally
    /// identical outputs, wherever a random walk takes the scene first.
    #[test]
    fn resolver_is_deterministic(
        seed in any::<u32>(),
        steps in prop::collection::vec((arb_actor(), arb_action()), 1..24),
    ) {
        let registry = ContentPack::default();
        let mut left = combat_scene(seed);
        let mut right = combat_scene(seed);

        for (actor_id, action) in steps {
            let envelope = ActionEnvelope { actor_id, action };
            let a = resolve_turn(&left, &envelope, &registry);
            let b = resolve_turn(&right, &envelope, &registry);
            prop_assert_eq!(&a.state, &b.state);
            prop_assert_eq!(&a.events, &b.events);
            left = a.state;
            right = b.state;
        }
    }

    /// The resolver never mutates its input: the argument's serialized
    /// form is identical before and after the call.
    #[test]
    fn resolver_never_mutates_its_input(
        seed in any::<u32>(),
        steps in prop::collection::vec((arb_actor(), arb_action()), 1..16),
    ) {
        let registry = ContentPack::default();
        let mut state = combat_scene(seed);

        for (actor_id, action) in steps {
            let before = serde_json::to_vec(&state).unwrap();
            let envelope = ActionEnvelope { actor_id, action };
            let resolution = resolve_turn(&state, &envelope, &registry);
            let after = serde_json::to_vec(&state).unwrap();
            prop_assert_eq!(&before, &after, "input state was mutated");
            state = resolution.state;
        }
    }

    /// No entity with hp <= 0 ever survives a resolution.
    #[test]
    fn dead_entities_never_persist(
        seed in any::<u32>(),
        steps in prop::collection::vec((arb_actor(), arb_action()), 1..32),
    ) {
        let registry = ContentPack::default();
        let mut state = combat_scene(seed);

        for (actor_id, action) in steps {
            let envelope = ActionEnvelope { actor_id, action };
            state = resolve_turn(&state, &envelope, &registry).state;
            for entity in &state.entities {
                prop_assert!(entity.hp > 0, "dead entity {} persisted", entity.id);
            }
        }
    }
}
