//! Budget-constrained bet allocation.
//!
//! Each scenario maps to a fixed allocation template: a data table of
//! (bet type, budget share, selection rule, expected ROI). New scenarios
//! or tiers are new table rows, not new control flow. Stakes round down
//! to the currency step, so the budget lock holds by construction; the
//! final check exists to catch template/rounding defects, which are fatal.

use tracing::debug;

use super::{EngineError, BUDGET_TOLERANCE};
use crate::db::models::{
    BetProposal, BetType, RecommendationSet, Scenario, ScenarioVerdict, ScoredParticipant,
    ValueSignal,
};

/// How a template slot picks its runners from the scored field.
#[derive(Debug, Clone, Copy)]
enum Selection {
    /// Highest score
    Best,
    /// Two highest scores
    TopTwo,
    /// N highest scores
    TopN(usize),
    /// Strongest value signal
    ValueHorse,
    /// Value horse coupled with the best scorer
    ValueWithBest,
    /// Highest score that is not the market favorite
    BestNonFavorite,
    /// Second-highest score that is not the market favorite
    SecondNonFavorite,
    /// Two highest scores excluding the market favorite
    TopTwoNonFavorite,
}

struct Slot {
    bet_type: BetType,
    share: f64,
    selection: Selection,
    expected_roi: f64,
    label: &'static str,
}

const DOMINANT_TEMPLATE: &[Slot] = &[
    Slot {
        bet_type: BetType::Win,
        share: 0.70,
        selection: Selection::Best,
        expected_roi: 2.5,
        label: "clear favorite on top",
    },
    Slot {
        bet_type: BetType::ExactaPlace,
        share: 0.30,
        selection: Selection::TopTwo,
        expected_roi: 3.0,
        label: "top two coupled for place",
    },
];

const CONTEST_TEMPLATE: &[Slot] = &[
    Slot {
        bet_type: BetType::MultiCombination,
        share: 0.50,
        selection: Selection::TopN(5),
        expected_roi: 4.0,
        label: "open race, wide combination",
    },
    Slot {
        bet_type: BetType::Trio,
        share: 0.30,
        selection: Selection::TopN(3),
        expected_roi: 3.5,
        label: "top three in any order",
    },
    Slot {
        bet_type: BetType::ExactaPlace,
        share: 0.20,
        selection: Selection::TopTwo,
        expected_roi: 2.5,
        label: "top two safety coupling",
    },
];

const SURPRISE_TEMPLATE: &[Slot] = &[
    Slot {
        bet_type: BetType::Win,
        share: 0.25,
        selection: Selection::ValueHorse,
        expected_roi: 5.0,
        label: "underpriced by the market",
    },
    Slot {
        bet_type: BetType::Place,
        share: 0.45,
        selection: Selection::Best,
        expected_roi: 1.8,
        label: "safety place on the best scorer",
    },
    Slot {
        bet_type: BetType::ExactaPlace,
        share: 0.30,
        selection: Selection::ValueWithBest,
        expected_roi: 3.0,
        label: "value horse coupled with the top scorer",
    },
];

const TRAP_TEMPLATE: &[Slot] = &[
    Slot {
        bet_type: BetType::Win,
        share: 0.45,
        selection: Selection::BestNonFavorite,
        expected_roi: 3.0,
        label: "best runner outside the fragile favorite",
    },
    Slot {
        bet_type: BetType::Place,
        share: 0.30,
        selection: Selection::SecondNonFavorite,
        expected_roi: 2.0,
        label: "second pick outside the favorite",
    },
    Slot {
        bet_type: BetType::ExactaPlace,
        share: 0.25,
        selection: Selection::TopTwoNonFavorite,
        expected_roi: 3.0,
        label: "coupling without the favorite",
    },
];

fn template(scenario: Scenario) -> &'static [Slot] {
    match scenario {
        Scenario::DominantFavorite => DOMINANT_TEMPLATE,
        Scenario::OpenContest => CONTEST_TEMPLATE,
        Scenario::Surprise => SURPRISE_TEMPLATE,
        Scenario::Trap => TRAP_TEMPLATE,
        Scenario::Unplayable => &[],
    }
}

/// Allocate a budget over the scenario template.
///
/// UNPLAYABLE yields a valid empty set. A slot whose selection cannot be
/// satisfied by the field is skipped; its share stays unspent (reproducible
/// and trivially budget-safe). A violated budget lock is a logic defect and
/// aborts the evaluation.
pub fn allocate(
    field: &[ScoredParticipant],
    signals: &[ValueSignal],
    verdict: &ScenarioVerdict,
    budget: f64,
    currency_step: f64,
) -> Result<RecommendationSet, EngineError> {
    let mut ranked: Vec<&ScoredParticipant> = field.iter().collect();
    ranked.sort_by(|a, b| b.total.cmp(&a.total).then(a.number.cmp(&b.number)));

    let favorite = ranked
        .iter()
        .filter(|s| s.odds > 1.0)
        .min_by(|a, b| a.odds.partial_cmp(&b.odds).unwrap_or(std::cmp::Ordering::Equal))
        .map(|s| s.number);

    let mut bets = Vec::new();
    for slot in template(verdict.scenario) {
        let stake = round_down(budget * slot.share, currency_step);
        if stake < currency_step {
            continue;
        }
        let Some(picks) = resolve(slot.selection, &ranked, signals, favorite) else {
            debug!(
                "template slot {:?}/{:?} unsatisfiable with {} runner(s), skipped",
                verdict.scenario,
                slot.bet_type,
                ranked.len()
            );
            continue;
        };
        if !slot.bet_type.accepts(picks.len()) {
            return Err(EngineError::BadCardinality {
                bet_type: slot.bet_type,
                got: picks.len(),
            });
        }
        bets.push(BetProposal {
            bet_type: slot.bet_type,
            participants: picks,
            stake,
            expected_roi: slot.expected_roi,
            justification: slot.label.to_string(),
        });
    }

    let set = RecommendationSet::from_bets(bets);
    if set.total_stake > budget + BUDGET_TOLERANCE {
        return Err(EngineError::BudgetOverrun {
            staked: set.total_stake,
            budget,
            tolerance: BUDGET_TOLERANCE,
        });
    }
    Ok(set)
}

fn round_down(amount: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return amount;
    }
    (amount / step).floor() * step
}

fn resolve(
    selection: Selection,
    ranked: &[&ScoredParticipant],
    signals: &[ValueSignal],
    favorite: Option<u32>,
) -> Option<Vec<u32>> {
    let top_n = |n: usize| -> Option<Vec<u32>> {
        if ranked.len() < n {
            return None;
        }
        Some(ranked[..n].iter().map(|s| s.number).collect())
    };
    let non_favorites = || -> Vec<u32> {
        ranked
            .iter()
            .map(|s| s.number)
            .filter(|n| Some(*n) != favorite)
            .collect()
    };

    match selection {
        Selection::Best => top_n(1),
        Selection::TopTwo => top_n(2),
        Selection::TopN(n) => top_n(n),
        Selection::ValueHorse => signals.first().map(|s| vec![s.number]),
        Selection::ValueWithBest => {
            let value = signals.first()?.number;
            let best = ranked
                .iter()
                .map(|s| s.number)
                .find(|n| *n != value)?;
            Some(vec![value, best])
        }
        Selection::BestNonFavorite => non_favorites().first().map(|n| vec![*n]),
        Selection::SecondNonFavorite => non_favorites().get(1).map(|n| vec![*n]),
        Selection::TopTwoNonFavorite => {
            let picks = non_favorites();
            if picks.len() < 2 {
                None
            } else {
                Some(picks[..2].to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DataConfidence, ProfileTag, Scenario, ScoreBreakdown};
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

    fn verdict(scenario: Scenario) -> ScenarioVerdict {
        ScenarioVerdict {
            scenario,
            confidence: 8,
            field_size: 8,
            reason: String::new(),
        }
    }

    fn field_of(n: u32) -> Vec<ScoredParticipant> {
        (1..=n)
            .map(|i| scored(i, 90u32.saturating_sub(i * 3), 2.0 + i as f64))
            .collect()
    }

    #[test]
    fn test_dominant_template_splits_70_30() {
        // Budget 20 splits into 14 on WIN and 6 on the place coupling
        let field = field_of(8);
        let set = allocate(&field, &[], &verdict(Scenario::DominantFavorite), 20.0, 0.50).unwrap();
        assert_eq!(set.bets.len(), 2);
        assert_eq!(set.bets[0].bet_type, BetType::Win);
        assert_eq!(set.bets[0].participants, vec![1]);
        assert_relative_eq!(set.bets[0].stake, 14.0);
        assert_eq!(set.bets[1].bet_type, BetType::ExactaPlace);
        assert_eq!(set.bets[1].participants, vec![1, 2]);
        assert_relative_eq!(set.bets[1].stake, 6.0);
        assert_relative_eq!(set.total_stake, 20.0);
    }

    #[test]
    fn test_unplayable_yields_empty_set() {
        let field = field_of(8);
        let set = allocate(&field, &[], &verdict(Scenario::Unplayable), 20.0, 0.50).unwrap();
        assert!(set.is_empty());
        assert_relative_eq!(set.total_stake, 0.0);
    }

    #[test]
    fn test_budget_lock_holds_for_every_template() {
        let field = field_of(8);
        let signals = vec![ValueSignal {
            number: 5,
            market_prob: 0.08,
            model_prob: 0.20,
            edge: 1.5,
            rationale: String::new(),
        }];
        for scenario in [
            Scenario::DominantFavorite,
            Scenario::OpenContest,
            Scenario::Surprise,
            Scenario::Trap,
            Scenario::Unplayable,
        ] {
            for budget in [5.0, 10.0, 15.0, 20.0, 7.3] {
                let set =
                    allocate(&field, &signals, &verdict(scenario), budget, 0.50).unwrap();
                assert!(
                    set.total_stake <= budget + BUDGET_TOLERANCE,
                    "{:?} at budget {} staked {}",
                    scenario,
                    budget,
                    set.total_stake
                );
            }
        }
    }

    #[test]
    fn test_trap_excludes_favorite_everywhere() {
        // #3 is the market favorite (shortest odds) but scores poorly
        let mut field = field_of(6);
        field[2].odds = 1.8;
        field[2].total = 60;
        let set = allocate(&field, &[], &verdict(Scenario::Trap), 20.0, 0.50).unwrap();
        assert!(!set.bets.is_empty());
        for bet in &set.bets {
            assert!(
                !bet.participants.contains(&3),
                "favorite leaked into {:?}",
                bet.bet_type
            );
        }
    }

    #[test]
    fn test_surprise_backs_the_value_horse() {
        let field = field_of(8);
        let signals = vec![ValueSignal {
            number: 6,
            market_prob: 0.07,
            model_prob: 0.20,
            edge: 1.8,
            rationale: String::new(),
        }];
        let set = allocate(&field, &signals, &verdict(Scenario::Surprise), 20.0, 0.50).unwrap();
        let win = set
            .bets
            .iter()
            .find(|b| b.bet_type == BetType::Win)
            .expect("missing WIN bet");
        assert_eq!(win.participants, vec![6]);
        // Minority stake on the value horse
        assert!(win.stake < set.total_stake / 2.0);
    }

    #[test]
    fn test_unsatisfiable_slot_is_skipped_not_fatal() {
        // Four runners: the MULTI_COMBINATION (needs 5) is skipped,
        // TRIO and EXACTA_PLACE still go through
        let field = field_of(4);
        let set = allocate(&field, &[], &verdict(Scenario::OpenContest), 20.0, 0.50).unwrap();
        assert!(set.bets.iter().all(|b| b.bet_type != BetType::MultiCombination));
        assert!(set.bets.iter().any(|b| b.bet_type == BetType::Trio));
        assert!(set.total_stake <= 20.0 + BUDGET_TOLERANCE);
    }

    #[test]
    fn test_stakes_round_to_currency_step() {
        let field = field_of(8);
        let set = allocate(&field, &[], &verdict(Scenario::DominantFavorite), 7.3, 0.50).unwrap();
        for bet in &set.bets {
            let units = bet.stake / 0.50;
            assert_relative_eq!(units, units.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tiny_budget_drops_sub_step_slots() {
        let field = field_of(8);
        // 30% of 1.0 rounds below one step; only the 70% slot survives
        let set = allocate(&field, &[], &verdict(Scenario::DominantFavorite), 1.0, 0.50).unwrap();
        assert_eq!(set.bets.len(), 1);
        assert_eq!(set.bets[0].bet_type, BetType::Win);
    }

    #[test]
    fn test_aggregate_roi_is_stake_weighted() {
        let field = field_of(8);
        let set = allocate(&field, &[], &verdict(Scenario::DominantFavorite), 20.0, 0.50).unwrap();
        let expected = (14.0 * 2.5 + 6.0 * 3.0) / 20.0;
        assert_relative_eq!(set.expected_roi, expected, epsilon = 1e-9);
    }
}
