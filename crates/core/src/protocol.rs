//! Wire messages between host and peers, and the transport contract the
//! core requires: at-least-once delivery of each action to the host, and
//! ordered delivery of the host's broadcasts to each peer. How bytes move
//! (WebRTC, loopback, a test double) is not the core's concern.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::host::sync::{PhaseStatus, SyncCoordinator};
use crate::host::{Delta, Welcome};
use crate::types::ActionEnvelope;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// An intent for the sender's entity. `player_id` is advisory; the
    /// host always resolves against the session-verified identity.
    Action { player_id: String, envelope: ActionEnvelope },
    /// Claim a persistent identity, reclaiming a prior entity on reconnect.
    Identity { user_id: String },
    Spectate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome(Welcome),
    Delta(Delta),
    Error { message: String },
    Phase(PhaseStatus),
}

pub trait Transport {
    fn send(&mut self, peer_id: &str, message: ServerMessage);
    fn broadcast(&mut self, message: ServerMessage);
    fn poll(&mut self) -> Option<(String, ClientMessage)>;
}

/// In-process transport used by tests and local sessions.
#[derive(Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<(String, ClientMessage)>,
    pub sent: Vec<(String, ServerMessage)>,
    pub broadcasts: Vec<ServerMessage>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_incoming(&mut self, peer_id: &str, message: ClientMessage) {
        self.inbound.push_back((peer_id.to_string(), message));
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, peer_id: &str, message: ServerMessage) {
        self.sent.push((peer_id.to_string(), message));
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.broadcasts.push(message);
    }

    fn poll(&mut self) -> Option<(String, ClientMessage)> {
        self.inbound.pop_front()
    }
}

/// Drain queued client messages through the coordinator, one at a time in
/// receipt order. This is the host's whole message-dispatch loop; no
/// action is applied while another is in flight.
pub fn pump(coordinator: &mut SyncCoordinator, transport: &mut impl Transport) {
    while let Some((peer_id, message)) = transport.poll() {
        match message {
            ClientMessage::Identity { user_id } => {
                let outcome = coordinator.connect(&peer_id, Some(&user_id));
                transport.send(&peer_id, ServerMessage::Welcome(outcome.welcome));
                transport.broadcast(ServerMessage::Delta(outcome.broadcast));
            }
            ClientMessage::Action { envelope, .. } => {
                match coordinator.submit_action(&peer_id, envelope) {
                    Ok(Some(delta)) => transport.broadcast(ServerMessage::Delta(delta)),
                    Ok(None) => {
                        transport.broadcast(ServerMessage::Phase(coordinator.phase_status()));
                    }
                    Err(error) => {
                        transport
                            .send(&peer_id, ServerMessage::Error { message: error.to_string() });
                    }
                }
            }
            // Spectators receive broadcasts without ever joining.
            ClientMessage::Spectate => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::content::ContentPack;
    use crate::host::HostEngine;
    use crate::types::Action;
    use std::sync::Arc;

    fn new_coordinator() -> SyncCoordinator {
        let config = GameConfig::new(5, 6, vec!["alice".to_string(), "bob".to_string()]);
        SyncCoordinator::new(HostEngine::new(config, Arc::new(ContentPack::default())))
    }

    #[test]
    fn client_messages_round_trip_through_json() {
        let message = ClientMessage::Action {
            player_id: "alice".to_string(),
            envelope: ActionEnvelope {
                actor_id: "alice".to_string(),
                action: Action::Move { dx: 0, dy: -1 },
            },
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"action\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn pump_connects_then_gates_then_broadcasts_the_round() {
        let mut coordinator = new_coordinator();
        let mut transport = LoopbackTransport::new();

        transport.push_incoming("peer-1", ClientMessage::Identity { user_id: "alice".to_string() });
        transport.push_incoming("peer-2", ClientMessage::Identity { user_id: "bob".to_string() });
        pump(&mut coordinator, &mut transport);

        assert_eq!(transport.sent.len(), 2, "each peer got a welcome");
        assert!(matches!(transport.sent[0].1, ServerMessage::Welcome(_)));

        transport.push_incoming("peer-1", ClientMessage::Action {
            player_id: "alice".to_string(),
            envelope: ActionEnvelope {
                actor_id: "alice".to_string(),
                action: Action::Move { dx: 1, dy: 0 },
            },
        });
        pump(&mut coordinator, &mut transport);
        assert!(
            matches!(transport.broadcasts.last(), Some(ServerMessage::Phase(status))
                if status.pending_players == vec!["bob".to_string()]),
            "queued action broadcasts the planning phase"
        );

        transport.push_incoming("peer-2", ClientMessage::Action {
            player_id: "bob".to_string(),
            envelope: ActionEnvelope {
                actor_id: "bob".to_string(),
                action: Action::Move { dx: 1, dy: 0 },
            },
        });
        pump(&mut coordinator, &mut transport);
        assert!(matches!(transport.broadcasts.last(), Some(ServerMessage::Delta(_))));
    }

    #[test]
    fn unknown_peer_action_is_answered_with_an_error() {
        let mut coordinator = new_coordinator();
        let mut transport = LoopbackTransport::new();
        transport.push_incoming("ghost", ClientMessage::Action {
            player_id: "ghost".to_string(),
            envelope: ActionEnvelope {
                actor_id: "ghost".to_string(),
                action: Action::Wait,
            },
        });
        pump(&mut coordinator, &mut transport);
        assert!(matches!(transport.sent.last(), Some((peer, ServerMessage::Error { .. })) if peer == "ghost"));
    }
}
