//! Guardian contract, identifiers, and the three detection styles.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::GuardianError, threat::Verdict};

/// Exact and substring blocklist matching.
pub mod rule;
/// Weighted combination of independent text signals.
pub mod heuristic;
/// Trigger tokens refined by rules applied to the surrounding window.
pub mod contextual;

pub use contextual::ContextualGuardian;
pub use heuristic::HeuristicGuardian;
pub use rule::RuleGuardian;

/// Stable identifier of one guardian instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuardianId(String);

impl GuardianId {
    /// Draws a fresh random identifier (`guardian-<12 hex>`).
    #[must_use]
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(format!("guardian-{}", &raw[..12]))
    }

    /// Borrowed form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuardianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GuardianId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for GuardianId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Detection style of a guardian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianStyle {
    /// Blocklist matching.
    RuleBased,
    /// Weighted signal scoring.
    Heuristic,
    /// Context windows around trigger tokens.
    Contextual,
}

impl GuardianStyle {
    /// All styles, in seed order.
    pub const ALL: [Self; 3] = [Self::RuleBased, Self::Heuristic, Self::Contextual];

    /// Short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::Heuristic => "heuristic",
            Self::Contextual => "contextual",
        }
    }

    /// Operator-facing explanation of how the style detects threats.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::RuleBased => {
                "Strict blocklist matching of injection phrases and keywords; \
                 prefers false positives over misses."
            }
            Self::Heuristic => {
                "Weighted scoring of command structure, capitalization, \
                 instruction phrasing and length anomalies."
            }
            Self::Contextual => {
                "Trigger phrases re-assessed inside a window of surrounding text \
                 to judge intent and severity."
            }
        }
    }
}

impl fmt::Display for GuardianStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One detector. `evaluate` must be a pure function of the text and the guardian's fixed
/// configuration, and must finish in time linear in the input.
pub trait Guardian: Send + Sync {
    /// Identifier assigned at spawn.
    fn id(&self) -> &GuardianId;

    /// Detection style.
    fn style(&self) -> GuardianStyle;

    /// Assesses `text`. Errors are reserved for malformed input.
    fn evaluate(&self, text: &str) -> Result<Verdict, GuardianError>;
}

impl fmt::Debug for dyn Guardian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardian")
            .field("id", self.id())
            .field("style", &self.style())
            .finish()
    }
}

/// Input limit shared by the built-in guardians.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimit {
    max_bytes: usize,
}

impl InputLimit {
    /// Limit of `max_bytes` bytes.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Maximum accepted length in bytes.
    #[must_use]
    pub const fn max_bytes(self) -> usize {
        self.max_bytes
    }

    /// Fails with `InputTooLarge` when `text` exceeds the limit.
    pub const fn check(self, text: &str) -> Result<(), GuardianError> {
        if text.len() > self.max_bytes {
            return Err(GuardianError::InputTooLarge {
                len: text.len(),
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Builds guardians for the pool. The pool never names concrete guardian types.
pub trait GuardianFactory: Send + Sync {
    /// Constructs a guardian of `style` identified by `id`.
    fn build(&self, style: GuardianStyle, id: GuardianId) -> Arc<dyn Guardian>;
}

/// Factory for the three built-in styles.
#[derive(Debug, Clone, Copy)]
pub struct StandardGuardianFactory {
    limit: InputLimit,
}

impl StandardGuardianFactory {
    /// Factory whose guardians reject inputs above `limit`.
    #[must_use]
    pub const fn new(limit: InputLimit) -> Self {
        Self { limit }
    }
}

impl GuardianFactory for StandardGuardianFactory {
    fn build(&self, style: GuardianStyle, id: GuardianId) -> Arc<dyn Guardian> {
        match style {
            GuardianStyle::RuleBased => Arc::new(RuleGuardian::new(id, self.limit)),
            GuardianStyle::Heuristic => Arc::new(HeuristicGuardian::new(id, self.limit)),
            GuardianStyle::Contextual => Arc::new(ContextualGuardian::new(id, self.limit)),
        }
    }
}

/// Largest char boundary `<= index`.
pub(crate) fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary `>= index`.
pub(crate) fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
