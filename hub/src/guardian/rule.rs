use once_cell::sync::Lazy;
use regex::Regex;

use super::{Guardian, GuardianId, GuardianStyle, InputLimit};
use crate::{
    error::GuardianError,
    threat::{Span, ThreatLevel, Verdict},
};

const BLOCKED_CONFIDENCE: f32 = 0.95;
const KEYWORD_CONFIDENCE: f32 = 0.9;

static BLOCKED_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)ignore\s+(?:all\s+)?(?:previous\s+)?instructions?",
            "instruction override",
        ),
        (
            r"(?i)disregard\s+(?:your|all)\s+(?:rules|guidelines)",
            "rule disregard",
        ),
        (r"(?i)you\s+are\s+now\s+(?:a|an)\s+\w+", "identity reassignment"),
        (r"(?i)pretend\s+(?:you(?:'re|\s+are)|to\s+be)", "role pretence"),
        (r"(?i)act\s+as\s+(?:if|though)", "role pretence"),
        (r"(?i)system\s*prompt\s*[:=]", "system prompt injection"),
        (r"(?i)\[(?:system|admin|override)\]", "privileged tag"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("static blocklist pattern"), label))
    .collect()
});

const SUSPICIOUS_KEYWORDS: [&str; 8] = [
    "jailbreak",
    "bypass",
    "override",
    "exploit",
    "injection",
    "sudo",
    "admin",
    "root",
];

/// Blocklist guardian. Deterministic and deliberately over-eager: a keyword inside an
/// unrelated word (`rooted`, `administer`) still counts.
#[derive(Debug, Clone)]
pub struct RuleGuardian {
    id: GuardianId,
    limit: InputLimit,
}

impl RuleGuardian {
    /// Creates the guardian.
    #[must_use]
    pub const fn new(id: GuardianId, limit: InputLimit) -> Self {
        Self { id, limit }
    }

    fn blocked_matches(text: &str) -> (Vec<&'static str>, Vec<Span>) {
        let mut labels = Vec::new();
        let mut spans = Vec::new();
        for (pattern, label) in BLOCKED_PATTERNS.iter() {
            let mut hit = false;
            for found in pattern.find_iter(text) {
                spans.push(Span::new(found.start(), found.end()));
                hit = true;
            }
            if hit && !labels.contains(label) {
                labels.push(*label);
            }
        }
        (labels, spans)
    }

    fn keyword_matches(text: &str) -> (Vec<&'static str>, Vec<Span>) {
        // ASCII lowering keeps byte offsets aligned with the original text.
        let lowered = text.to_ascii_lowercase();
        let mut keywords = Vec::new();
        let mut spans = Vec::new();
        for keyword in SUSPICIOUS_KEYWORDS {
            let mut hit = false;
            for (start, matched) in lowered.match_indices(keyword) {
                spans.push(Span::new(start, start + matched.len()));
                hit = true;
            }
            if hit {
                keywords.push(keyword);
            }
        }
        (keywords, spans)
    }
}

impl Guardian for RuleGuardian {
    fn id(&self) -> &GuardianId {
        &self.id
    }

    fn style(&self) -> GuardianStyle {
        GuardianStyle::RuleBased
    }

    fn evaluate(&self, text: &str) -> Result<Verdict, GuardianError> {
        self.limit.check(text)?;
        let id = self.id.clone();

        let (labels, spans) = Self::blocked_matches(text);
        if !labels.is_empty() {
            let verdict = labels.iter().fold(
                Verdict::new(id, GuardianStyle::RuleBased, ThreatLevel::Critical)
                    .with_confidence(BLOCKED_CONFIDENCE),
                |verdict, label| verdict.with_reason(format!("blocked pattern: {label}")),
            );
            return Ok(verdict.with_spans(spans));
        }

        let (keywords, spans) = Self::keyword_matches(text);
        if !keywords.is_empty() {
            return Ok(
                Verdict::new(id, GuardianStyle::RuleBased, ThreatLevel::High)
                    .with_confidence(KEYWORD_CONFIDENCE)
                    .with_reason(format!("suspicious keywords: {}", keywords.join(", ")))
                    .with_spans(spans),
            );
        }

        Ok(Verdict::new(id, GuardianStyle::RuleBased, ThreatLevel::None))
    }
}
