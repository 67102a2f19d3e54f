//! Race-scenario classification.
//!
//! An ordered chain of pure predicate rules over an immutable
//! `FieldSummary`; the first rule that matches wins. TRAP is deliberately
//! checked before SURPRISE: a fragile favorite the market over-trusts is
//! the dominant signal even when a value horse also exists.

use crate::db::models::{Scenario, ScenarioVerdict, ScoredParticipant, ValueSignal};

/// Classification thresholds. Loaded once from configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Below this many runners the race is unplayable
    pub min_field_size: usize,
    /// Below this top score the race is unplayable
    pub min_top_score: u32,
    /// DOMINANT_FAVORITE: top score at least this…
    pub dominant_top_score: u32,
    /// …and margin over the runner-up at least this
    pub dominant_margin: u32,
    /// TRAP: favorite odds strictly below this ("short-priced")…
    pub trap_max_odds: f64,
    /// …while its score is strictly below this ("fragile")
    pub trap_max_score: u32,
    /// SURPRISE: a value signal with at least this edge
    pub surprise_edge: f64,
    /// OPEN_CONTEST: at least this many runners…
    pub contest_min_runners: usize,
    /// …scoring at least this…
    pub competitive_floor: u32,
    /// …within a score band no wider than this
    pub contest_max_band: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            min_field_size: 4,
            min_top_score: 50,
            dominant_top_score: 85,
            dominant_margin: 10,
            trap_max_odds: 5.0,
            trap_max_score: 65,
            surprise_edge: 0.15,
            contest_min_runners: 5,
            competitive_floor: 65,
            contest_max_band: 15,
        }
    }
}

/// Immutable distillation of the scored field that the rules read.
#[derive(Debug, Clone)]
pub struct FieldSummary {
    pub field_size: usize,
    pub top_score: u32,
    pub second_score: u32,
    /// Lowest market odds in the field (the favorite); infinity when no
    /// runner has a usable price
    pub favorite_odds: f64,
    /// Score of that favorite
    pub favorite_score: u32,
    /// Strongest value-signal edge, if any
    pub best_edge: Option<f64>,
    /// Runners at or above the competitive floor
    pub competitive_count: usize,
    /// Score spread among those competitive runners
    pub competitive_band: u32,
}

impl FieldSummary {
    pub fn build(
        field: &[ScoredParticipant],
        signals: &[ValueSignal],
        config: &ClassifierConfig,
    ) -> Self {
        let mut scores: Vec<u32> = field.iter().map(|s| s.total).collect();
        scores.sort_unstable_by(|a, b| b.cmp(a));

        let favorite = field
            .iter()
            .filter(|s| s.odds > 1.0)
            .min_by(|a, b| a.odds.partial_cmp(&b.odds).unwrap_or(std::cmp::Ordering::Equal));

        let competitive: Vec<u32> = scores
            .iter()
            .copied()
            .filter(|s| *s >= config.competitive_floor)
            .collect();
        let competitive_band = match (competitive.first(), competitive.last()) {
            (Some(hi), Some(lo)) => hi - lo,
            _ => 0,
        };

        FieldSummary {
            field_size: field.len(),
            top_score: scores.first().copied().unwrap_or(0),
            second_score: scores.get(1).copied().unwrap_or(0),
            favorite_odds: favorite.map(|f| f.odds).unwrap_or(f64::INFINITY),
            favorite_score: favorite.map(|f| f.total).unwrap_or(0),
            best_edge: signals.first().map(|s| s.edge),
            competitive_count: competitive.len(),
            competitive_band,
        }
    }
}

type Rule = fn(&FieldSummary, &ClassifierConfig) -> Option<(Scenario, u8, String)>;

/// Rule order is the precedence order. First match wins.
const RULES: &[Rule] = &[
    rule_unplayable_structure,
    rule_dominant_favorite,
    rule_trap,
    rule_surprise,
    rule_open_contest,
];

pub fn classify(summary: &FieldSummary, config: &ClassifierConfig) -> ScenarioVerdict {
    for rule in RULES {
        if let Some((scenario, confidence, reason)) = rule(summary, config) {
            return ScenarioVerdict {
                scenario,
                confidence: confidence.clamp(1, 10),
                field_size: summary.field_size,
                reason,
            };
        }
    }
    // Nothing matched: not enough structure to classify
    ScenarioVerdict {
        scenario: Scenario::Unplayable,
        confidence: 3,
        field_size: summary.field_size,
        reason: "no scenario rule matched".into(),
    }
}

fn rule_unplayable_structure(
    s: &FieldSummary,
    c: &ClassifierConfig,
) -> Option<(Scenario, u8, String)> {
    if s.field_size < c.min_field_size {
        return Some((
            Scenario::Unplayable,
            2,
            format!("field of {} below minimum {}", s.field_size, c.min_field_size),
        ));
    }
    if s.top_score < c.min_top_score {
        return Some((
            Scenario::Unplayable,
            2,
            format!("top score {} below floor {}", s.top_score, c.min_top_score),
        ));
    }
    None
}

fn rule_dominant_favorite(
    s: &FieldSummary,
    c: &ClassifierConfig,
) -> Option<(Scenario, u8, String)> {
    let margin = s.top_score.saturating_sub(s.second_score);
    if s.top_score >= c.dominant_top_score && margin >= c.dominant_margin {
        // Confidence grows with the margin beyond the threshold
        let confidence = 7 + ((margin - c.dominant_margin) / 5) as u8;
        return Some((
            Scenario::DominantFavorite,
            confidence,
            format!("top score {} with margin {}", s.top_score, margin),
        ));
    }
    None
}

fn rule_trap(s: &FieldSummary, c: &ClassifierConfig) -> Option<(Scenario, u8, String)> {
    if s.favorite_odds < c.trap_max_odds && s.favorite_score < c.trap_max_score {
        // The more fragile the favorite, the more confident the call
        let fragility = c.trap_max_score.saturating_sub(s.favorite_score);
        let confidence = 6 + (fragility / 5) as u8;
        return Some((
            Scenario::Trap,
            confidence,
            format!(
                "favorite at {:.1} odds scores only {}",
                s.favorite_odds, s.favorite_score
            ),
        ));
    }
    None
}

fn rule_surprise(s: &FieldSummary, c: &ClassifierConfig) -> Option<(Scenario, u8, String)> {
    let edge = s.best_edge?;
    if edge >= c.surprise_edge {
        let confidence = 6 + ((edge - c.surprise_edge) * 10.0) as u8;
        return Some((
            Scenario::Surprise,
            confidence,
            format!("value signal with +{:.0}% edge", edge * 100.0),
        ));
    }
    None
}

fn rule_open_contest(s: &FieldSummary, c: &ClassifierConfig) -> Option<(Scenario, u8, String)> {
    if s.competitive_count >= c.contest_min_runners && s.competitive_band <= c.contest_max_band {
        // Tighter band, more genuine contest
        let confidence = 9u8.saturating_sub((s.competitive_band / 4) as u8);
        return Some((
            Scenario::OpenContest,
            confidence,
            format!(
                "{} runners within {} points",
                s.competitive_count, s.competitive_band
            ),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DataConfidence, ProfileTag, ScoreBreakdown};

    fn scored(number: u32, total: u32, odds: f64) -> ScoredParticipant {
        ScoredParticipant {
            number,
            name: format!("HORSE {}", number),
            odds,
            total,
            profile: ProfileTag::Steady,
            confidence: DataConfidence::High,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn signal(number: u32, edge: f64) -> ValueSignal {
        ValueSignal {
            number,
            market_prob: 0.10,
            model_prob: 0.10 * (1.0 + edge),
            edge,
            rationale: String::new(),
        }
    }

    fn verdict(field: &[ScoredParticipant], signals: &[ValueSignal]) -> ScenarioVerdict {
        let config = ClassifierConfig::default();
        classify(&FieldSummary::build(field, signals, &config), &config)
    }

    fn eight_runner_field(top: u32, second: u32, favorite_odds: f64) -> Vec<ScoredParticipant> {
        let mut field = vec![scored(1, top, favorite_odds), scored(2, second, 6.0)];
        for n in 3..=8 {
            field.push(scored(n, 55, 8.0 + n as f64));
        }
        field
    }

    #[test]
    fn test_dominant_favorite_classification() {
        // Top score 90 with a 20-point margin over the runner-up
        let v = verdict(&eight_runner_field(90, 70, 2.5), &[]);
        assert_eq!(v.scenario, Scenario::DominantFavorite);
        assert!(v.confidence >= 8, "confidence {} < 8", v.confidence);
        assert_eq!(v.field_size, 8);
    }

    #[test]
    fn test_trap_when_favorite_is_fragile() {
        // Favorite at 2.2 odds scoring only 60
        let mut field = eight_runner_field(90, 70, 6.0);
        field.push(scored(9, 60, 2.2));
        let v = verdict(&field, &[]);
        // DOMINANT rule still fires first here (top 90, margin 20), so
        // drop the top score to expose the trap
        assert_eq!(v.scenario, Scenario::DominantFavorite);

        let mut field = eight_runner_field(80, 70, 6.0);
        field.push(scored(9, 60, 2.2));
        let v = verdict(&field, &[]);
        assert_eq!(v.scenario, Scenario::Trap);
    }

    #[test]
    fn test_trap_takes_precedence_over_surprise() {
        let mut field = eight_runner_field(80, 72, 6.0);
        field.push(scored(9, 60, 2.2)); // fragile favorite
        let signals = vec![signal(2, 0.40)]; // strong value signal too
        let v = verdict(&field, &signals);
        assert_eq!(v.scenario, Scenario::Trap);
    }

    #[test]
    fn test_surprise_on_strong_edge() {
        let field = eight_runner_field(80, 72, 6.0);
        let v = verdict(&field, &[signal(5, 0.30)]);
        assert_eq!(v.scenario, Scenario::Surprise);
        assert!(v.confidence >= 6);
    }

    #[test]
    fn test_weak_edge_does_not_trigger_surprise() {
        let field = eight_runner_field(80, 72, 6.0);
        let v = verdict(&field, &[signal(5, 0.11)]);
        assert_ne!(v.scenario, Scenario::Surprise);
    }

    #[test]
    fn test_open_contest() {
        let field = vec![
            scored(1, 74, 4.5),
            scored(2, 72, 5.5),
            scored(3, 70, 6.0),
            scored(4, 69, 7.0),
            scored(5, 67, 8.0),
            scored(6, 50, 20.0),
        ];
        let v = verdict(&field, &[]);
        assert_eq!(v.scenario, Scenario::OpenContest);
        assert!(v.confidence >= 6);
    }

    #[test]
    fn test_small_field_is_unplayable() {
        let field = vec![scored(1, 90, 2.0), scored(2, 70, 4.0), scored(3, 60, 8.0)];
        let v = verdict(&field, &[]);
        assert_eq!(v.scenario, Scenario::Unplayable);
    }

    #[test]
    fn test_weak_top_score_is_unplayable() {
        let field = vec![
            scored(1, 45, 3.0),
            scored(2, 42, 5.0),
            scored(3, 40, 7.0),
            scored(4, 38, 9.0),
        ];
        let v = verdict(&field, &[]);
        assert_eq!(v.scenario, Scenario::Unplayable);
    }

    #[test]
    fn test_unstructured_field_falls_through_to_unplayable() {
        // Playable size and top score, but no rule matches
        let field = vec![
            scored(1, 62, 6.0),
            scored(2, 58, 7.0),
            scored(3, 55, 9.0),
            scored(4, 52, 12.0),
        ];
        let v = verdict(&field, &[]);
        assert_eq!(v.scenario, Scenario::Unplayable);
    }

    #[test]
    fn test_confidence_always_in_range() {
        let v = verdict(&eight_runner_field(100, 40, 1.5), &[]);
        assert!((1..=10).contains(&v.confidence));
    }
}
