//! Simultaneous-turn coordination.
//!
//! Turn-based actions from several humans must land as one consistent
//! round, not interleave freely; otherwise a fast client reacts to a slow
//! client's uncommitted move. This layer queues turn-ending actions per
//! identity and releases them as a single batch once every living tracked
//! player has one queued. Free actions pass straight through.
//!
//! There are no wall-clock timers here. A connected-but-idle living player
//! holds the round open until the embedder decides to call `force_round`,
//! which defaults absentees to a wait. That policy choice belongs to the
//! transport layer, not the core.

use std::mem;

use serde::{Deserialize, Serialize};

use crate::host::{ConnectOutcome, Delta, HostEngine, ProcessOptions};
use crate::types::{Action, ActionEnvelope, GameEvent, HostError};

/// Planning-phase status for the `phase` wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: String,
    #[serde(default)]
    pub time_remaining: Option<u64>,
    pub pending_players: Vec<String>,
}

pub struct SyncCoordinator {
    engine: HostEngine,
    /// Human identities gating the round, in join order.
    tracked: Vec<String>,
    /// Queued turn-ending actions, in receipt order.
    pending: Vec<(String, Action)>,
}

impl SyncCoordinator {
    pub fn new(engine: HostEngine) -> Self {
        Self { engine, tracked: Vec::new(), pending: Vec::new() }
    }

    pub fn engine(&self) -> &HostEngine {
        &self.engine
    }

    pub fn connect(&mut self, peer_id: &str, persistent_id: Option<&str>) -> ConnectOutcome {
        let outcome = self.engine.connect(peer_id, persistent_id);
        let user = outcome.welcome.player_id.clone();
        if !user.starts_with("ai-") && !self.tracked.contains(&user) {
            self.tracked.push(user);
        }
        outcome
    }

    /// Submit one action for a connected peer.
    ///
    /// Free actions apply immediately and always return a delta. A
    /// turn-ending action queues and returns `None` until the submission
    /// that completes the living set, which executes the whole round and
    /// returns the merged delta. With one or zero living players there is
    /// nothing to coordinate and the round executes at once.
    pub fn submit_action(
        &mut self,
        peer_id: &str,
        envelope: ActionEnvelope,
    ) -> Result<Option<Delta>, HostError> {
        let Some(user) = self.engine.identity_of(peer_id).map(str::to_string) else {
            return Err(HostError::NotConnected { peer_id: peer_id.to_string() });
        };

        let free_opts =
            ProcessOptions { skip_ai: true, skip_turn_advance: true, replaying: false };

        if !envelope.action.is_turn_ending() {
            return Ok(Some(self.engine.process_identity_action(&user, envelope.action, free_opts)));
        }

        // Dead players are spectators: their moves resolve to nothing and
        // never block or advance the round.
        if !self.engine.has_living_entity(&user) {
            return Ok(Some(self.engine.process_identity_action(&user, envelope.action, free_opts)));
        }

        match self.pending.iter_mut().find(|(queued, _)| *queued == user) {
            Some(entry) => entry.1 = envelope.action,
            None => self.pending.push((user, envelope.action)),
        }

        let living = self.living_tracked();
        let everyone_ready = living
            .iter()
            .all(|player| self.pending.iter().any(|(queued, _)| queued == player));
        if living.len() <= 1 || everyone_ready {
            return Ok(Some(self.execute_round()));
        }
        Ok(None)
    }

    /// Execute the round now, defaulting every living player who has not
    /// submitted to a wait. The embedder's timeout policy decides when.
    pub fn force_round(&mut self) -> Delta {
        self.execute_round()
    }

    pub fn phase_status(&self) -> PhaseStatus {
        let pending: Vec<String> = self
            .living_tracked()
            .into_iter()
            .filter(|player| !self.pending.iter().any(|(queued, _)| queued == player))
            .collect();
        PhaseStatus { phase: "planning".to_string(), time_remaining: None, pending_players: pending }
    }

    fn execute_round(&mut self) -> Delta {
        for player in self.living_tracked() {
            if !self.pending.iter().any(|(queued, _)| queued == &player) {
                self.pending.push((player, Action::Wait));
            }
        }
        let batch = mem::take(&mut self.pending);
        log::debug!("executing round with {} queued actions", batch.len());

        // AI and turn advancement run exactly once per round, on the final
        // action of the batch.
        let count = batch.len();
        let mut merged_events: Vec<GameEvent> = Vec::new();
        let mut last_delta: Option<Delta> = None;
        for (index, (user, action)) in batch.into_iter().enumerate() {
            let last = index + 1 == count;
            let opts = ProcessOptions {
                skip_ai: !last,
                skip_turn_advance: !last,
                replaying: false,
            };
            let delta = self.engine.process_identity_action(&user, action, opts);
            merged_events.extend(delta.events.clone());
            last_delta = Some(delta);
        }

        match last_delta {
            Some(delta) => {
                // A spawn or transition anywhere in the batch means the
                // merged delta must carry the full state, not just the
                // final action's view of it.
                let include_state = merged_events.iter().any(|event| {
                    matches!(
                        event,
                        GameEvent::Spawned { .. }
                            | GameEvent::LevelTransition { .. }
                            | GameEvent::Victory { .. }
                            | GameEvent::Defeat
                    )
                });
                let current_state =
                    if include_state { Some(self.engine.state()) } else { delta.current_state };
                Delta { events: merged_events, current_state, ..delta }
            }
            // An empty round (no tracked players at all) changes nothing.
            None => Delta {
                turn: self.engine.state().turn,
                events: Vec::new(),
                envelope: ActionEnvelope { actor_id: String::new(), action: Action::Wait },
                current_state: None,
            },
        }
    }

    fn living_tracked(&self) -> Vec<String> {
        self.tracked
            .iter()
            .filter(|player| self.engine.has_living_entity(player))
            .cloned()
            .collect()
    }
}
