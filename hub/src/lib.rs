#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Cerberus guardian hub: every input is screened by a pool of independent detectors,
//! the worst verdict wins, and serious threats grow the pool until it reaches its cap
//! and shuts the gate for good.

/// Threat levels, spans and per-guardian verdicts.
pub mod threat;

/// Error types for guardians and configuration.
pub mod error;

/// Hub configuration, file loading and env overrides.
pub mod config;

/// Guardian contract and the built-in detectors.
pub mod guardian;

/// Spawn style selection.
pub mod selector;

/// Verdict aggregation.
pub mod aggregate;

/// Caller-facing decisions and status snapshots.
pub mod decision;

/// Guardian pool and its growth/shutdown state machine.
pub mod pool;

/// Structured logs and lifecycle events.
pub mod telemetry;

/// The coordinator.
pub mod hub;

pub use aggregate::{aggregate, Aggregate};
pub use config::HubConfig;
pub use decision::{Decision, GuardianInfo, HubStatus, HALTED_SUMMARY};
pub use error::{ConfigError, GuardianError};
pub use guardian::{
    ContextualGuardian, Guardian, GuardianFactory, GuardianId, GuardianStyle,
    HeuristicGuardian, InputLimit, RuleGuardian, StandardGuardianFactory,
};
pub use hub::{GuardianHub, GuardianHubBuilder};
pub use pool::{GuardianPool, PoolState, SpawnRecord, Transition};
pub use selector::{RandomStyleSelector, StyleSelector};
pub use telemetry::{HubTelemetry, HubTelemetryBuilder};
pub use threat::{Span, ThreatLevel, Verdict};
