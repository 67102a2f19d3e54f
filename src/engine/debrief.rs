//! Post-race debrief.
//!
//! Settles each proposal against the actual finish order with
//! bet-type-specific rules. Bets naming a scratched runner are void:
//! reported separately, excluded from win/loss counts and from the
//! realized-ROI denominator. With no dividend feed, a won bet pays
//! stake × its expected ROI multiplier.

use crate::db::models::{
    BetOutcome, BetProposal, BetStatus, BetType, DebriefReport, FinalRecommendation,
};

pub fn evaluate(
    recommendation: &FinalRecommendation,
    finish_order: &[u32],
    scratched: &[u32],
) -> DebriefReport {
    let mut outcomes = Vec::with_capacity(recommendation.set.bets.len());
    let mut total_stake = 0.0;
    let mut total_payout = 0.0;

    for bet in &recommendation.set.bets {
        let status = settle(bet, finish_order, scratched);
        let payout = match status {
            BetStatus::Won => bet.stake * bet.expected_roi,
            BetStatus::Lost | BetStatus::Void => 0.0,
        };
        if status != BetStatus::Void {
            total_stake += bet.stake;
            total_payout += payout;
        }
        outcomes.push(BetOutcome {
            bet: bet.clone(),
            status,
            payout,
        });
    }

    let realized_roi = if total_stake > 0.0 {
        total_payout / total_stake
    } else {
        0.0
    };

    DebriefReport {
        finish_order: finish_order.to_vec(),
        scratched: scratched.to_vec(),
        outcomes,
        total_stake,
        total_payout,
        realized_roi,
        top3_precision: top3_precision(&recommendation.set.bets, finish_order),
    }
}

fn settle(bet: &BetProposal, finish: &[u32], scratched: &[u32]) -> BetStatus {
    if bet.participants.iter().any(|n| scratched.contains(n)) {
        return BetStatus::Void;
    }

    let within = |n: &u32, top: usize| finish.iter().take(top).any(|f| f == n);
    let all_within = |top: usize| bet.participants.iter().all(|n| within(n, top));

    let won = match bet.bet_type {
        BetType::Win => finish.first() == bet.participants.first(),
        BetType::Place => bet.participants.first().is_some_and(|n| within(n, 3)),
        BetType::ExactaWin => all_within(2),
        BetType::ExactaPlace => all_within(3),
        BetType::Trio => all_within(3),
        // First four finishers must all be among the named runners
        BetType::MultiCombination => {
            finish.len() >= 4
                && finish
                    .iter()
                    .take(4)
                    .all(|f| bet.participants.contains(f))
        }
        // At least two of the named four inside the top four
        BetType::BoxTwoOfFour => {
            bet.participants.iter().filter(|n| within(n, 4)).count() >= 2
        }
    };

    if won {
        BetStatus::Won
    } else {
        BetStatus::Lost
    }
}

/// The recommendation's implied top-3 picks are the first three distinct
/// runners named across the proposals, in proposal order. Precision is the
/// share of those picks inside the actual top 3, order-insensitive.
fn top3_precision(bets: &[BetProposal], finish: &[u32]) -> f64 {
    let mut picks: Vec<u32> = Vec::new();
    for bet in bets {
        for n in &bet.participants {
            if !picks.contains(n) {
                picks.push(*n);
            }
            if picks.len() == 3 {
                break;
            }
        }
        if picks.len() == 3 {
            break;
        }
    }
    if picks.is_empty() {
        return 0.0;
    }

    let actual_top3: Vec<u32> = finish.iter().take(3).copied().collect();
    let hits = picks.iter().filter(|p| actual_top3.contains(p)).count();
    hits as f64 / picks.len() as f64
}
