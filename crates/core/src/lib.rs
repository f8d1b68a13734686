pub mod config;
pub mod content;
pub mod effects;
pub mod gamelog;
pub mod gamelog_file;
pub mod host;
pub mod mapgen;
pub mod protocol;
pub mod replay;
pub mod resolve;
pub mod rng;
pub mod state;
pub mod test_support;
pub mod types;

pub use config::{CustomLevel, GameConfig};
pub use content::{ContentPack, Registry};
pub use gamelog::{GameLog, LogMeta, ProcessMode, TurnRecord};
pub use gamelog_file::{LoadedLog, LogWriter, load_log_from_file};
pub use host::sync::SyncCoordinator;
pub use host::{ConnectOutcome, Delta, HostEngine, ProcessOptions, Welcome};
pub use replay::{ReplayEngine, ReplayError, ReplayReport};
pub use resolve::{Resolution, advance_turn, resolve_turn};
pub use rng::Mulberry32;
pub use state::{Entity, GameState, GroundItem, ItemData, LevelMap};
pub use types::*;
