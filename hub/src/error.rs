use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single guardian evaluation. Never reaches `analyze` callers: the hub
/// downgrades it to a `None` verdict carrying the message.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardianError {
    /// Text exceeds the configured maximum length.
    #[error("input too large: {len} bytes exceeds the {max} byte limit")]
    InputTooLarge {
        /// Length of the rejected input in bytes.
        len: usize,
        /// Configured limit in bytes.
        max: usize,
    },
    /// Text is malformed for this guardian.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Guardian did not finish inside its time budget.
    #[error("evaluation timed out after {0:?}")]
    EvaluationTimeout(Duration),
    /// Guardian crashed (panicked task or similar).
    #[error("evaluation fault: {0}")]
    Fault(String),
}

/// Rejected hub configuration; raised before any hub exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `spawn_factor` was zero.
    #[error("spawn factor must be at least 1")]
    SpawnFactorTooSmall,
    /// `max_guardians` cannot absorb one growth step.
    #[error("max guardians ({max}) must be at least the spawn factor ({spawn_factor})")]
    CapacityBelowSpawnFactor {
        /// Configured cap.
        max: usize,
        /// Configured spawn factor.
        spawn_factor: usize,
    },
    /// `max_guardians` cannot hold the initial seed set.
    #[error("max guardians ({max}) cannot hold the {seed} seed guardians")]
    CapacityBelowSeed {
        /// Configured cap.
        max: usize,
        /// Number of seed guardians.
        seed: usize,
    },
    /// A time budget was zero.
    #[error("{0} must be greater than zero")]
    ZeroBudget(&'static str),
    /// `max_input_bytes` was zero.
    #[error("max input bytes must be greater than zero")]
    ZeroInputLimit,
    /// An override value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride {
        /// Setting or variable name.
        key: String,
        /// Raw rejected value.
        value: String,
    },
    /// Config file could not be read.
    #[error("reading hub config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for `HubConfig`.
    #[error("parsing hub config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}
