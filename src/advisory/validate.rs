//! Advisory response validation.
//!
//! The advisory output is held to exactly the same contract as the
//! deterministic allocator: known bet types, correct cardinality, runners
//! that exist in the field, and the budget lock. A budget-violating
//! response is rejected outright, never rescaled into compliance.

use serde::Deserialize;

use super::AdvisoryError;
use crate::db::models::{
    AdvisoryAnalysis, BetProposal, RecommendationSet, Scenario, ScoredParticipant,
};
use crate::engine::BUDGET_TOLERANCE;

/// Raw response shape the advisory service is asked to produce.
#[derive(Debug, Deserialize)]
pub struct AdvisoryResponse {
    pub scenario: Scenario,
    pub bets: Vec<BetProposal>,
    #[serde(default)]
    pub critique: String,
}

/// Parse and validate the advisory JSON payload.
pub fn validate_response(
    payload: &str,
    field: &[ScoredParticipant],
    budget: f64,
) -> Result<AdvisoryAnalysis, AdvisoryError> {
    let response: AdvisoryResponse = serde_json::from_str(payload)
        .map_err(|e| AdvisoryError::Malformed(e.to_string()))?;

    for bet in &response.bets {
        if !bet.bet_type.accepts(bet.participants.len()) {
            return Err(AdvisoryError::Malformed(format!(
                "{:?} cannot name {} runner(s)",
                bet.bet_type,
                bet.participants.len()
            )));
        }
        if !(bet.stake > 0.0 && bet.stake.is_finite()) {
            return Err(AdvisoryError::Malformed(format!(
                "non-positive stake {} on {:?}",
                bet.stake, bet.bet_type
            )));
        }
        for n in &bet.participants {
            if !field.iter().any(|s| s.number == *n) {
                return Err(AdvisoryError::Malformed(format!(
                    "unknown runner #{} in {:?}",
                    n, bet.bet_type
                )));
            }
        }
    }

    let set = RecommendationSet::from_bets(response.bets);
    if set.total_stake > budget + BUDGET_TOLERANCE {
        return Err(AdvisoryError::BudgetViolation {
            staked: set.total_stake,
            budget,
        });
    }

    Ok(AdvisoryAnalysis {
        scenario: response.scenario,
        set,
        critique: response.critique,
    })
}
