//! Replay engine: reconstructs any historical state from a game log.
//!
//! Seeking replays logged records through the same host pipeline the live
//! game used, with logging suppressed. Full-state checkpoints are cached
//! every few records so seeking backwards or scrubbing stays cheap.
//! Per-record failures never abort a replay; they are collected into a
//! report and the caller decides whether a partial reconstruction is
//! acceptable.

use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::sync::Arc;

use crate::content::Registry;
use crate::gamelog::GameLog;
use crate::host::HostEngine;
use crate::state::GameState;

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayIssue {
    /// Index of the failing record in `log.turns`.
    pub index: usize,
    pub turn: u64,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub issues: Vec<ReplayIssue>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplayError {
    OutOfRange { requested: usize, available: usize },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { requested, available } => {
                write!(f, "cannot seek to record {requested}, log has {available}")
            }
        }
    }
}

impl error::Error for ReplayError {}

pub struct ReplayEngine {
    log: GameLog,
    registry: Arc<dyn Registry>,
    checkpoints: BTreeMap<usize, GameState>,
    interval: usize,
}

impl ReplayEngine {
    pub fn new(log: GameLog, registry: Arc<dyn Registry>) -> Self {
        Self::with_interval(log, registry, DEFAULT_CHECKPOINT_INTERVAL)
    }

    pub fn with_interval(log: GameLog, registry: Arc<dyn Registry>, interval: usize) -> Self {
        Self { log, registry, checkpoints: BTreeMap::new(), interval: interval.max(1) }
    }

    pub fn record_count(&self) -> usize {
        self.log.turns.len()
    }

    /// The exact state a live game held after its first `record_index`
    /// logged records, independent of which seeks came before this one.
    pub fn seek_to(
        &mut self,
        record_index: usize,
    ) -> Result<(GameState, ReplayReport), ReplayError> {
        if record_index > self.log.turns.len() {
            return Err(ReplayError::OutOfRange {
                requested: record_index,
                available: self.log.turns.len(),
            });
        }

        // Resume from the nearest cached checkpoint at or before the target.
        let (start, mut engine) = match self.checkpoints.range(..=record_index).next_back() {
            Some((applied, state)) => (*applied, self.engine_at(state.clone())),
            None => (0, self.fresh_engine()),
        };
        log::debug!("seek to {record_index}, replaying from {start}");

        let mut report = ReplayReport::default();
        for index in start..record_index {
            let record = self.log.turns[index].clone();
            engine.apply_record(&record, index, &mut report);
            let applied = index + 1;
            if applied % self.interval == 0 {
                self.checkpoints.entry(applied).or_insert_with(|| engine.state());
            }
        }
        Ok((engine.state(), report))
    }

    /// Replay the full log twice from scratch, ignoring the checkpoint
    /// cache, and require byte-identical serialized final states.
    pub fn verify_determinism(&self) -> bool {
        self.replay_from_scratch() == self.replay_from_scratch()
    }

    fn replay_from_scratch(&self) -> Vec<u8> {
        let mut engine = self.fresh_engine();
        let mut report = ReplayReport::default();
        for (index, record) in self.log.turns.iter().enumerate() {
            engine.apply_record(record, index, &mut report);
        }
        serde_json::to_vec(&engine.state()).unwrap_or_default()
    }

    fn fresh_engine(&self) -> HostEngine {
        HostEngine::new(self.log.config.clone(), Arc::clone(&self.registry))
    }

    /// An engine positioned at an arbitrary historical state, built through
    /// the same snapshot-restore path a saved log uses.
    fn engine_at(&self, state: GameState) -> HostEngine {
        let log = GameLog {
            meta: self.log.meta.clone(),
            config: self.log.config.clone(),
            turns: Vec::new(),
            state_snapshot: Some(state),
        };
        HostEngine::from_log(&log, Arc::clone(&self.registry)).0
    }
}
