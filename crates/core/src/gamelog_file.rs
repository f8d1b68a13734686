//! File-backed JSONL game log with a SHA-256 hash chain for crash
//! recovery.
//!
//! The format is line-delimited JSON:
//! - Line 1: header with `format_version`, `build_id`, the log metadata
//!   and the full game configuration.
//! - Lines 2+: one turn record per accepted action, each carrying a
//!   SHA-256 chain (`prev_sha256_hex`, `sha256_hex`) for corruption
//!   detection.
//!
//! Writing flushes every record immediately so the file survives crashes.
//! Loading validates each line's JSON shape and hash chain and stops at
//! the first invalid or incomplete line.

use std::error;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GameConfig;
use crate::gamelog::{GameLog, LogMeta, TurnRecord};

// ---------------------------------------------------------------------------
// File format structs
// ---------------------------------------------------------------------------

pub const FILE_FORMAT_VERSION: u16 = 1;

/// First line of the JSONL log file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct FileHeader {
    format_version: u16,
    build_id: String,
    meta: LogMeta,
    config: GameConfig,
}

/// Fields hashed for a record: serialized to JSON and concatenated with
/// `prev_sha256_hex`.
#[derive(Serialize)]
struct RecordBody<'a> {
    seq: u64,
    record: &'a TurnRecord,
}

/// Full record line written to the file.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct FileRecord {
    seq: u64,
    record: TurnRecord,
    prev_sha256_hex: String,
    sha256_hex: String,
}

// ---------------------------------------------------------------------------
// SHA-256 helpers
// ---------------------------------------------------------------------------

/// Previous-hash value for the first record of a chain.
const INITIAL_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

fn compute_record_sha256(body_json: &str, prev_sha256_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body_json.as_bytes());
    hasher.update(prev_sha256_hex.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:064x}")
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends turn records to a JSONL file with a SHA-256 hash chain.
pub struct LogWriter {
    writer: BufWriter<File>,
    last_sha256_hex: String,
    next_seq: u64,
}

impl LogWriter {
    /// Create a new log file, writing the header line immediately.
    pub fn create(
        path: &Path,
        meta: &LogMeta,
        config: &GameConfig,
        build_id: &str,
    ) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = FileHeader {
            format_version: FILE_FORMAT_VERSION,
            build_id: build_id.to_string(),
            meta: meta.clone(),
            config: config.clone(),
        };
        let header_json = serde_json::to_string(&header).map_err(io::Error::other)?;
        writeln!(writer, "{header_json}")?;
        writer.flush()?;

        Ok(Self { writer, last_sha256_hex: INITIAL_HASH.to_string(), next_seq: 0 })
    }

    /// Resume appending to an existing file after loading it.
    /// `last_sha256_hex` and `next_seq` come from [`LoadedLog`].
    pub fn resume(path: &Path, last_sha256_hex: String, next_seq: u64) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer, last_sha256_hex, next_seq })
    }

    /// Append one turn record and flush immediately.
    pub fn append(&mut self, record: &TurnRecord) -> io::Result<()> {
        let body = RecordBody { seq: self.next_seq, record };
        let body_json = serde_json::to_string(&body).map_err(io::Error::other)?;
        let sha256_hex = compute_record_sha256(&body_json, &self.last_sha256_hex);

        let line = FileRecord {
            seq: self.next_seq,
            record: record.clone(),
            prev_sha256_hex: self.last_sha256_hex.clone(),
            sha256_hex: sha256_hex.clone(),
        };

        let line_json = serde_json::to_string(&line).map_err(io::Error::other)?;
        writeln!(self.writer, "{line_json}")?;
        self.writer.flush()?;

        self.last_sha256_hex = sha256_hex;
        self.next_seq += 1;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Successfully loaded log with the metadata needed to resume appends.
#[derive(Debug)]
pub struct LoadedLog {
    pub log: GameLog,
    /// SHA-256 hex of the last valid record (or the initial hash if empty).
    pub last_sha256_hex: String,
    /// Sequence number for the next appended record.
    pub next_seq: u64,
}

#[derive(Debug)]
pub enum LogFileError {
    Io(io::Error),
    EmptyFile,
    InvalidHeader { line: usize, message: String },
    InvalidRecord { line: usize, message: String },
    /// The file ended without a trailing newline, so the last line may be
    /// a torn write.
    IncompleteLine { line: usize },
    HashChainBroken { line: usize },
}

impl fmt::Display for LogFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "log file I/O error: {e}"),
            Self::EmptyFile => write!(f, "log file is empty"),
            Self::InvalidHeader { line, message } => {
                write!(f, "invalid log header at line {line}: {message}")
            }
            Self::InvalidRecord { line, message } => {
                write!(f, "invalid log record at line {line}: {message}")
            }
            Self::IncompleteLine { line } => write!(f, "incomplete log line at line {line}"),
            Self::HashChainBroken { line } => {
                write!(f, "SHA-256 hash chain broken at line {line}")
            }
        }
    }
}

impl error::Error for LogFileError {}

/// Load and validate a JSONL log file.
///
/// Returns the in-memory log (without a state snapshot; the caller replays
/// or restores separately) plus metadata for resuming appends.
pub fn load_log_from_file(path: &Path) -> Result<LoadedLog, LogFileError> {
    let content = fs::read_to_string(path).map_err(LogFileError::Io)?;
    if content.is_empty() {
        return Err(LogFileError::EmptyFile);
    }
    let has_trailing_newline = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Err(LogFileError::EmptyFile);
    }
    if !has_trailing_newline {
        return Err(LogFileError::IncompleteLine { line: lines.len() });
    }

    // --- header (line 1) ---
    let header: FileHeader = serde_json::from_str(lines[0])
        .map_err(|e| LogFileError::InvalidHeader { line: 1, message: e.to_string() })?;

    let mut log = GameLog {
        meta: header.meta,
        config: header.config,
        turns: Vec::new(),
        state_snapshot: None,
    };

    let mut prev_sha256_hex = INITIAL_HASH.to_string();
    let mut next_seq: u64 = 0;

    // --- records (lines 2+) ---
    for (line_index, line) in lines.iter().skip(1).enumerate() {
        let line_number = line_index + 2; // 1-indexed; header is line 1

        if line.is_empty() {
            return Err(LogFileError::InvalidRecord {
                line: line_number,
                message: "empty line".to_string(),
            });
        }

        let file_record: FileRecord = serde_json::from_str(line).map_err(|e| {
            LogFileError::InvalidRecord { line: line_number, message: e.to_string() }
        })?;

        if file_record.seq != next_seq {
            return Err(LogFileError::InvalidRecord {
                line: line_number,
                message: format!("expected seq {next_seq}, found {}", file_record.seq),
            });
        }

        if file_record.prev_sha256_hex != prev_sha256_hex {
            return Err(LogFileError::HashChainBroken { line: line_number });
        }

        let body = RecordBody { seq: file_record.seq, record: &file_record.record };
        let body_json = serde_json::to_string(&body).map_err(|e| {
            LogFileError::InvalidRecord { line: line_number, message: e.to_string() }
        })?;
        let expected_sha256 = compute_record_sha256(&body_json, &prev_sha256_hex);

        if file_record.sha256_hex != expected_sha256 {
            return Err(LogFileError::HashChainBroken { line: line_number });
        }

        log.turns.push(file_record.record);

        prev_sha256_hex = file_record.sha256_hex;
        next_seq += 1;
    }

    Ok(LoadedLog { log, last_sha256_hex: prev_sha256_hex, next_seq })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
