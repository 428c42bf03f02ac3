use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::Aggregate,
    guardian::{Guardian, GuardianId, GuardianStyle},
    threat::{ThreatLevel, Verdict},
};

/// Summary used for every request refused by a halted hub.
pub const HALTED_SUMMARY: &str =
    "SYSTEM SHUTDOWN: guardian capacity reached; all input is blocked without analysis";

/// Caller-facing result of one `analyze` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the text may pass the gate.
    pub is_safe: bool,
    /// Aggregated level (`Critical` when halted).
    pub highest_threat: ThreatLevel,
    /// Verdicts at `highest_threat`, in fan-out order.
    pub contributing_verdicts: Vec<Verdict>,
    /// Human-readable description.
    pub summary: String,
    /// Highest confidence among contributing verdicts (1.0 when halted).
    pub confidence: f32,
    /// Guardians evaluated for this call.
    pub evaluated_guardians: usize,
    /// Guardians whose evaluation failed and was downgraded.
    pub faulted_guardians: usize,
    /// Pool size once this call's transition was applied.
    pub pool_size_after: usize,
    /// Pool is shut down after this call.
    pub shutdown_triggered: bool,
}

impl Decision {
    /// Blocking decision returned without evaluation once the pool is shut down.
    ///
    /// `contributing_verdicts` stays empty: the halt is a pool property, not a detection.
    #[must_use]
    pub fn halted(pool_size: usize) -> Self {
        Self {
            is_safe: false,
            highest_threat: ThreatLevel::Critical,
            contributing_verdicts: Vec::new(),
            summary: HALTED_SUMMARY.into(),
            confidence: 1.0,
            evaluated_guardians: 0,
            faulted_guardians: 0,
            pool_size_after: pool_size,
            shutdown_triggered: true,
        }
    }

    /// Decision for an evaluated call, stamped with the post-transition pool state.
    /// A pool that is shut down forces the decision to block.
    #[must_use]
    pub fn evaluated(aggregate: Aggregate, pool_size_after: usize, shutdown: bool) -> Self {
        let summary = if shutdown {
            format!("{}; hub is now shut down", aggregate.summary)
        } else {
            aggregate.summary
        };
        Self {
            is_safe: aggregate.is_safe && !shutdown,
            highest_threat: aggregate.highest_threat,
            contributing_verdicts: aggregate.contributing,
            summary,
            confidence: aggregate.confidence,
            evaluated_guardians: aggregate.evaluated,
            faulted_guardians: aggregate.faulted,
            pool_size_after,
            shutdown_triggered: shutdown,
        }
    }
}

/// One pool member as reported by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianInfo {
    /// Identifier.
    pub id: GuardianId,
    /// Style.
    pub style: GuardianStyle,
    /// Style description.
    pub description: String,
}

impl GuardianInfo {
    /// Describes a live guardian.
    #[must_use]
    pub fn describe(guardian: &dyn Guardian) -> Self {
        Self {
            id: guardian.id().clone(),
            style: guardian.style(),
            description: guardian.style().description().into(),
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatus {
    /// Current member count.
    pub pool_size: usize,
    /// Terminal shutdown flag.
    pub is_shutdown: bool,
    /// Spawn episodes so far.
    pub growth_events: u64,
    /// Growth-trigger decisions observed while active.
    pub threat_triggers: u64,
    /// Configured cap.
    pub max_guardians: usize,
    /// Configured spawn factor.
    pub spawn_factor: usize,
    /// Members in pool iteration order.
    pub guardians: Vec<GuardianInfo>,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    #[test]
    fn halted_decision_blocks_without_evidence() {
        let decision = Decision::halted(27);
        assert!(!decision.is_safe);
        assert!(decision.shutdown_triggered);
        assert_eq!(decision.highest_threat, ThreatLevel::Critical);
        assert!(decision.contributing_verdicts.is_empty());
        assert_eq!(decision.pool_size_after, 27);
        assert!(decision.summary.contains("SHUTDOWN"));
    }

    #[test]
    fn shutdown_overrides_a_safe_aggregate() {
        let safe = aggregate(
            vec![Verdict::new(
                GuardianId::from("g"),
                GuardianStyle::RuleBased,
                ThreatLevel::None,
            )],
            ThreatLevel::Low,
        );
        assert!(safe.is_safe);
        let decision = Decision::evaluated(safe, 27, true);
        assert!(!decision.is_safe);
        assert!(decision.summary.ends_with("hub is now shut down"));
    }

    #[test]
    fn decision_serializes_levels_lowercase() {
        let json = serde_json::to_value(Decision::halted(3)).unwrap();
        assert_eq!(json["highest_threat"], "critical");
        assert_eq!(json["shutdown_triggered"], true);
    }
}
