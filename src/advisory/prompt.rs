//! Structured context for the advisory request.
//!
//! The external model receives the already-computed scores with their
//! full explainability payload (sub-scores, defaulted inputs, value
//! rationale). It critiques and re-allocates, it never re-scores.

use serde_json::{json, Value};

use crate::db::models::{RaceCard, ScenarioVerdict, ScoredParticipant, ValueSignal};

/// Instructions sent as the text part of every advisory request. The
/// response contract mirrors `validate::AdvisoryResponse`.
pub const INSTRUCTIONS: &str = r#"You are a harness-racing betting analyst. You receive a race that has already been scored by a deterministic model. Propose your own betting allocation for the given budget.

Respond with ONLY a JSON object, no markdown, of this exact shape:
{
  "scenario": "DOMINANT_FAVORITE" | "OPEN_CONTEST" | "SURPRISE" | "TRAP" | "UNPLAYABLE",
  "bets": [
    {
      "type": "WIN" | "PLACE" | "EXACTA_WIN" | "EXACTA_PLACE" | "TRIO" | "MULTI_COMBINATION" | "BOX_TWO_OF_FOUR",
      "participants": [<saddle-cloth numbers>],
      "stake": <currency units>,
      "expected_roi": <payout multiplier>,
      "justification": "<one sentence>"
    }
  ],
  "critique": "<short critique of the deterministic read>"
}

Hard rules: the sum of stakes must not exceed the budget; participant numbers must exist in the field; WIN/PLACE name 1 runner, EXACTA_* 2, TRIO 3, MULTI_COMBINATION 4 or 5, BOX_TWO_OF_FOUR 4. An empty bets array is valid for an unplayable race."#;

/// Assemble the JSON context document.
pub fn build_context(
    card: &RaceCard,
    field: &[ScoredParticipant],
    verdict: &ScenarioVerdict,
    signals: &[ValueSignal],
    budget: f64,
) -> Value {
    json!({
        "race": {
            "date": card.date,
            "meeting": card.meeting,
            "race": card.race,
            "venue": card.venue,
            "distance_m": card.distance,
            "discipline": card.discipline,
            "field_size": field.len(),
            "scratched": card.scratched,
        },
        "deterministic_read": {
            "scenario": verdict.scenario,
            "confidence": verdict.confidence,
            "reason": verdict.reason,
        },
        "scored_field": field,
        "value_signals": signals,
        "budget": budget,
    })
}

/// Full prompt text: instructions followed by the context document.
pub fn build_prompt(
    card: &RaceCard,
    field: &[ScoredParticipant],
    verdict: &ScenarioVerdict,
    signals: &[ValueSignal],
    budget: f64,
) -> String {
    let context = build_context(card, field, verdict, signals, budget);
    format!("{}\n\n<race_context>\n{}\n</race_context>", INSTRUCTIONS, context)
}
