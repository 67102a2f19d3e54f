pub mod allocator;
pub mod debrief;
pub mod scenario;
pub mod scoring;
pub mod selector;
pub mod tracks;
pub mod value;

use thiserror::Error;

use crate::db::models::BetType;

/// Typed failures of the deterministic engine.
///
/// `UnknownVenue` is an input defect the caller can react to;
/// `BudgetOverrun` and `BadCardinality` indicate a logic defect (broken
/// template or rounding) and must abort the evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("budget overrun: staked {staked:.2} against budget {budget:.2} (+{tolerance:.2} tolerance)")]
    BudgetOverrun {
        staked: f64,
        budget: f64,
        tolerance: f64,
    },

    #[error("{bet_type:?} cannot name {got} runner(s)")]
    BadCardinality { bet_type: BetType, got: usize },
}

/// Budget tolerance in currency units shared by the allocator and the
/// advisory validator.
pub const BUDGET_TOLERANCE: f64 = 0.50;
