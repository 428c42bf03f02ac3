use crate::threat::{ThreatLevel, Verdict};

/// Combined view of one call's verdicts.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Maximum level across all verdicts.
    pub highest_threat: ThreatLevel,
    /// Verdicts at `highest_threat`, input order; empty when nothing was found.
    pub contributing: Vec<Verdict>,
    /// Deterministic one-line description.
    pub summary: String,
    /// `highest_threat <= safe_threshold`, false when there was nothing to aggregate.
    pub is_safe: bool,
    /// Highest confidence among contributing verdicts.
    pub confidence: f32,
    /// Number of verdicts aggregated.
    pub evaluated: usize,
    /// Verdicts standing in for failed evaluations.
    pub faulted: usize,
}

/// Folds verdicts by maximum level. Pure; larger batches cannot dilute a detection.
///
/// An empty batch fails closed (`is_safe == false`); the pool never fans out to zero
/// guardians, so this only guards misuse.
#[must_use]
pub fn aggregate(verdicts: Vec<Verdict>, safe_threshold: ThreatLevel) -> Aggregate {
    let evaluated = verdicts.len();
    let faulted = verdicts.iter().filter(|verdict| verdict.faulted).count();
    let Some(highest_threat) = verdicts.iter().map(|verdict| verdict.level).max() else {
        return Aggregate {
            highest_threat: ThreatLevel::None,
            contributing: Vec::new(),
            summary: "no guardians evaluated the input".into(),
            is_safe: false,
            confidence: 0.0,
            evaluated,
            faulted,
        };
    };

    let contributing: Vec<Verdict> = if highest_threat == ThreatLevel::None {
        Vec::new()
    } else {
        verdicts
            .into_iter()
            .filter(|verdict| verdict.level == highest_threat)
            .collect()
    };
    let confidence = contributing
        .iter()
        .map(|verdict| verdict.confidence)
        .fold(0.0_f32, f32::max);
    let summary = if contributing.is_empty() {
        format!("no threat found by {evaluated} guardian(s)")
    } else {
        format!(
            "{highest_threat} threat reported by {} of {evaluated} guardian(s)",
            contributing.len()
        )
    };

    Aggregate {
        highest_threat,
        contributing,
        summary,
        is_safe: highest_threat <= safe_threshold,
        confidence,
        evaluated,
        faulted,
    }
}
