//! Hybrid strategy selection.
//!
//! Pure reconciliation of two already-computed candidates. The actual
//! advisory network call lives in `crate::advisory`, so this function is
//! unit-testable without any mocking. `advisory` is `None` whenever the
//! adapter reported a failure or its response failed validation.

use crate::db::models::{FinalRecommendation, Origin, RecommendationSet};

/// Choose the final recommendation.
///
/// Precedence: kill switch (confidence below threshold forces the empty,
/// minimal-risk set) → advisory fallback → higher aggregate expected ROI,
/// with exact ties going to the deterministic candidate for
/// reproducibility.
pub fn select(
    deterministic: RecommendationSet,
    advisory: Option<RecommendationSet>,
    confidence: u8,
    kill_switch_threshold: u8,
) -> FinalRecommendation {
    if confidence < kill_switch_threshold {
        return FinalRecommendation {
            set: RecommendationSet::empty(),
            origin: Origin::Deterministic,
            confidence,
        };
    }

    let (set, origin) = match advisory {
        Some(adv) if adv.expected_roi > deterministic.expected_roi => (adv, Origin::Advisory),
        _ => (deterministic, Origin::Deterministic),
    };

    FinalRecommendation {
        set,
        origin,
        confidence,
    }
}
