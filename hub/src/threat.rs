use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, GuardianError},
    guardian::{GuardianId, GuardianStyle},
};

/// Ordered threat classification, `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// Nothing suspicious.
    #[default]
    None,
    /// Weak signal, allowed under the default threshold.
    Low,
    /// Suspicious content.
    Medium,
    /// Likely attack; triggers pool growth.
    High,
    /// Confirmed attack pattern; triggers pool growth.
    Critical,
}

impl ThreatLevel {
    /// Every level in ascending order.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    /// Lowercase label used in summaries and serialized output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// One level up, saturating at `Critical`.
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::None => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Whether an aggregated decision at this level grows the guardian pool.
    #[must_use]
    pub fn is_growth_trigger(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ThreatLevel {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::InvalidOverride {
                key: "threat level".into(),
                value: raw.into(),
            })
    }
}

/// Byte range `[start, end)` into the analysed text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Span {
    /// Creates a span; the bounds are reordered if given backwards.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }
}

/// One guardian's assessment of one text. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// Producing guardian.
    pub guardian_id: GuardianId,
    /// Style of the producing guardian.
    pub style: GuardianStyle,
    /// Assessed level.
    pub level: ThreatLevel,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable evidence, in discovery order.
    pub reasons: Vec<String>,
    /// Offsets of the evidence in the input.
    pub matched_spans: BTreeSet<Span>,
    /// Set when this verdict stands in for a failed evaluation.
    pub faulted: bool,
}

impl Verdict {
    /// Starts a verdict with zero confidence and no evidence.
    #[must_use]
    pub fn new(guardian_id: GuardianId, style: GuardianStyle, level: ThreatLevel) -> Self {
        Self {
            guardian_id,
            style,
            level,
            confidence: 0.0,
            reasons: Vec::new(),
            matched_spans: BTreeSet::new(),
            faulted: false,
        }
    }

    /// `None`-level stand-in for a guardian whose evaluation failed.
    #[must_use]
    pub fn fault(guardian_id: GuardianId, style: GuardianStyle, error: &GuardianError) -> Self {
        let mut verdict = Self::new(guardian_id, style, ThreatLevel::None)
            .with_reason(format!("evaluation fault: {error}"));
        verdict.faulted = true;
        verdict
    }

    /// Sets the confidence, clamped to `[0, 1]`; NaN becomes 0.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Appends a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Records a matched span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.matched_spans.insert(span);
        self
    }

    /// Records several matched spans.
    #[must_use]
    pub fn with_spans(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.matched_spans.extend(spans);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> GuardianId {
        GuardianId::from("guardian-test")
    }

    #[test]
    fn levels_are_totally_ordered() {
        for pair in ThreatLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(ThreatLevel::ALL.iter().max(), Some(&ThreatLevel::Critical));
    }

    #[test]
    fn escalate_saturates() {
        assert_eq!(ThreatLevel::None.escalate(), ThreatLevel::Low);
        assert_eq!(ThreatLevel::High.escalate(), ThreatLevel::Critical);
        assert_eq!(ThreatLevel::Critical.escalate(), ThreatLevel::Critical);
    }

    #[test]
    fn growth_triggers_start_at_high() {
        assert!(!ThreatLevel::Medium.is_growth_trigger());
        assert!(ThreatLevel::High.is_growth_trigger());
        assert!(ThreatLevel::Critical.is_growth_trigger());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LOW".parse::<ThreatLevel>().unwrap(), ThreatLevel::Low);
        assert_eq!(" critical ".parse::<ThreatLevel>().unwrap(), ThreatLevel::Critical);
        assert!("severe".parse::<ThreatLevel>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ThreatLevel::High).unwrap(), "\"high\"");
    }

    #[test]
    fn confidence_is_clamped() {
        let verdict = Verdict::new(id(), GuardianStyle::Heuristic, ThreatLevel::Low)
            .with_confidence(1.7);
        assert!((verdict.confidence - 1.0).abs() < f32::EPSILON);
        let verdict = Verdict::new(id(), GuardianStyle::Heuristic, ThreatLevel::Low)
            .with_confidence(f32::NAN);
        assert!(verdict.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn fault_verdict_is_none_and_carries_reason() {
        let error = GuardianError::InputTooLarge { len: 10, max: 4 };
        let verdict = Verdict::fault(id(), GuardianStyle::RuleBased, &error);
        assert_eq!(verdict.level, ThreatLevel::None);
        assert!(verdict.faulted);
        assert!(verdict.reasons[0].contains("input too large"));
    }

    #[test]
    fn spans_are_normalized_and_deduplicated() {
        let verdict = Verdict::new(id(), GuardianStyle::Contextual, ThreatLevel::High)
            .with_span(Span::new(9, 3))
            .with_span(Span::new(3, 9));
        assert_eq!(verdict.matched_spans.len(), 1);
        assert_eq!(verdict.matched_spans.first(), Some(&Span { start: 3, end: 9 }));
    }
}
