//! Mispriced-horse (value) detection.
//!
//! Market-implied win probability is the reciprocal of decimal odds,
//! renormalized so the field sums to 1 (removes the house margin). The
//! model probability comes from a fixed monotonic mapping of the score.
//! A signal fires only when the relative edge clears the threshold AND the
//! model probability clears a floor: a large relative edge on a
//! low-score outsider is statistical noise, not value.

use crate::db::models::{ScoredParticipant, ValueSignal};

/// Fixed monotonic score → probability mapping.
pub fn model_probability(score: u32) -> f64 {
    if score >= 90 {
        0.30
    } else if score >= 85 {
        0.27
    } else if score >= 80 {
        0.25
    } else if score >= 75 {
        0.22
    } else if score >= 70 {
        0.20
    } else if score >= 65 {
        0.15
    } else {
        0.10
    }
}

/// Overround-free market probabilities, index-aligned with `field`.
/// `None` for runners without a usable price (odds ≤ 1.0).
pub fn market_probabilities(field: &[ScoredParticipant]) -> Vec<Option<f64>> {
    let inverse_sum: f64 = field
        .iter()
        .filter(|s| s.odds > 1.0)
        .map(|s| 1.0 / s.odds)
        .sum();

    field
        .iter()
        .map(|s| {
            if s.odds > 1.0 && inverse_sum > 0.0 {
                Some((1.0 / s.odds) / inverse_sum)
            } else {
                None
            }
        })
        .collect()
}

/// Scan the scored field for value signals. Pure function of its inputs.
pub fn detect(
    field: &[ScoredParticipant],
    edge_threshold: f64,
    model_prob_floor: f64,
) -> Vec<ValueSignal> {
    let market = market_probabilities(field);

    let mut signals: Vec<ValueSignal> = field
        .iter()
        .zip(market)
        .filter_map(|(s, market_prob)| {
            let market_prob = market_prob?;
            let model_prob = model_probability(s.total);
            if model_prob < model_prob_floor {
                return None;
            }
            let edge = (model_prob - market_prob) / market_prob;
            if edge < edge_threshold {
                return None;
            }
            Some(ValueSignal {
                number: s.number,
                market_prob,
                model_prob,
                edge,
                rationale: rationale(s, edge),
            })
        })
        .collect();

    // Strongest edge first; ties broken by number for reproducibility
    signals.sort_by(|a, b| {
        b.edge
            .partial_cmp(&a.edge)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.number.cmp(&b.number))
    });
    signals
}

fn rationale(s: &ScoredParticipant, edge: f64) -> String {
    let mut parts = vec![format!(
        "score {} at {:.1} odds, edge +{:.0}%",
        s.total,
        s.odds,
        edge * 100.0
    )];
    for bonus in &s.breakdown.bonuses {
        let label = match bonus.as_str() {
            "elite_driver" => "elite driver",
            "fully_unshod" => "shoes removed",
            "partially_unshod" => "partial shoe change",
            "excellent_time" => "excellent normalized time",
            "winning_streak" => "on a winning streak",
            "trainer_positive" => "positive trainer report",
            "venue_affinity" => "proven at the venue",
            "consistency" => "consistent placings",
            other => other,
        };
        parts.push(label.to_string());
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DataConfidence, ProfileTag, ScoreBreakdown};
    use approx::assert_relative_eq;

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

    #[test]
    fn test_market_probabilities_sum_to_one() {
        let field = vec![scored(1, 80, 2.5), scored(2, 70, 5.0), scored(3, 60, 10.0)];
        let probs = market_probabilities(&field);
        let sum: f64 = probs.iter().flatten().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_odds_yield_no_probability() {
        let field = vec![scored(1, 80, 2.5), scored(2, 70, 0.0)];
        let probs = market_probabilities(&field);
        assert!(probs[0].is_some());
        assert!(probs[1].is_none());
    }

    #[test]
    fn test_model_mapping_is_monotonic() {
        let mut last = 0.0;
        for score in 0..=100 {
            let p = model_probability(score);
            assert!(p >= last, "mapping decreased at score {}", score);
            last = p;
        }
    }

    #[test]
    fn test_detects_underpriced_midfield_horse() {
        // #2 scores 78 (model 0.22) but the market prices it like an
        // outsider; that is the value signal.
        let field = vec![
            scored(1, 82, 2.0),
            scored(2, 78, 12.0),
            scored(3, 65, 6.0),
            scored(4, 55, 8.0),
        ];
        let signals = detect(&field, 0.10, 0.15);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].number, 2);
        assert!(signals[0].edge > 0.10);
    }

    #[test]
    fn test_low_score_outsider_filtered_by_probability_floor() {
        // Huge relative edge but model prob 0.10 < floor 0.15
        let field = vec![scored(1, 85, 1.5), scored(2, 40, 80.0)];
        let signals = detect(&field, 0.10, 0.15);
        assert!(signals.iter().all(|s| s.number != 2));
    }

    #[test]
    fn test_short_priced_favorite_is_not_value() {
        let field = vec![scored(1, 88, 1.8), scored(2, 70, 6.0), scored(3, 68, 9.0)];
        let signals = detect(&field, 0.10, 0.15);
        assert!(signals.iter().all(|s| s.number != 1));
    }

    #[test]
    fn test_signals_sorted_by_edge_descending() {
        let field = vec![
            scored(1, 60, 2.0),
            scored(2, 75, 15.0),
            scored(3, 72, 18.0),
        ];
        let signals = detect(&field, 0.10, 0.15);
        assert!(signals.len() >= 2);
        assert!(signals[0].edge >= signals[1].edge);
    }
}
