use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Shoeing change declared for a runner. Removing shoes is a strong
/// intent signal in trotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShoeChange {
    #[default]
    Unchanged,
    /// Front or hind pair removed
    PartialUnshod,
    /// All four shoes removed
    FullyUnshod,
}

/// Trainer's published opinion on the runner's chances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrainerOpinion {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// A single runner as supplied by the upstream racing-data provider.
/// Immutable once ingested for a given evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Saddle-cloth number (race-local identifier)
    pub number: u32,
    pub name: String,
    pub age: u32,
    pub driver: String,
    pub trainer: String,
    /// Recent placings, most recent first, e.g. "12a05" (0 = unplaced)
    pub recent_form: String,
    pub starts: u32,
    pub wins: u32,
    pub places: u32,
    /// Last recorded km-reduction time in seconds (e.g. 74.2 for 1'14"2)
    pub last_time: Option<f64>,
    /// Decimal market odds; providers report 0.0 when no price exists yet
    pub odds: f64,
    pub shoeing: ShoeChange,
    pub trainer_opinion: TrainerOpinion,
    /// Venues where the horse has a winning record
    pub venue_affinity: Vec<String>,
    /// Running in the opposite discipline (harness vs mounted) to its record
    pub discipline_switch: bool,
}

/// One race as fetched from the provider, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceCard {
    pub date: NaiveDate,
    pub meeting: u32,
    pub race: u32,
    pub venue: String,
    /// Race distance in metres
    pub distance: u32,
    pub discipline: String,
    pub field: Vec<Participant>,
    /// Numbers declared non-starters before the off
    pub scratched: Vec<u32>,
}

/// Post-race data from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    /// Saddle-cloth numbers in finishing order
    pub finish_order: Vec<u32>,
    pub scratched: Vec<u32>,
}

/// Per-criterion sub-scores, each bounded to its fixed share of 100.
/// `defaulted` lists the criteria that fell back to a neutral default
/// because the input was missing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    /// 0–30
    pub form: u32,
    /// 0–25
    pub time: u32,
    /// 0–20
    pub connections: u32,
    /// 0–15
    pub condition: u32,
    /// 0–10
    pub context: u32,
    pub defaulted: Vec<String>,
    /// Named bonuses that fired, for value-bet rationale text
    pub bonuses: Vec<String>,
}

/// Named profile derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTag {
    SafeFavorite,
    Steady,
    Risky,
    Outsider,
}

/// How complete the inputs behind a score were
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConfidence {
    High,
    Medium,
    Low,
}

/// A participant with its computed score. Read-only after the Scoring
/// Engine produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredParticipant {
    pub number: u32,
    pub name: String,
    pub odds: f64,
    /// 0–100
    pub total: u32,
    pub profile: ProfileTag,
    pub confidence: DataConfidence,
    pub breakdown: ScoreBreakdown,
}

/// A horse the model believes the market underprices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSignal {
    pub number: u32,
    /// Market-implied win probability after removing the house margin
    pub market_prob: f64,
    /// Model-implied probability from the score mapping
    pub model_prob: f64,
    /// (model − market) / market
    pub edge: f64,
    pub rationale: String,
}

/// Coarse race archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    DominantFavorite,
    OpenContest,
    Surprise,
    Trap,
    Unplayable,
}

/// Classification outcome: archetype + 1–10 confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioVerdict {
    pub scenario: Scenario,
    /// 1–10
    pub confidence: u8,
    pub field_size: usize,
    pub reason: String,
}

/// Fixed enumeration of supported pool bets with the number of runners
/// each names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetType {
    Win,
    Place,
    ExactaWin,
    ExactaPlace,
    Trio,
    MultiCombination,
    BoxTwoOfFour,
}

impl BetType {
    /// Allowed cardinality of named runners, inclusive.
    pub fn cardinality(&self) -> (usize, usize) {
        match self {
            BetType::Win | BetType::Place => (1, 1),
            BetType::ExactaWin | BetType::ExactaPlace => (2, 2),
            BetType::Trio => (3, 3),
            BetType::MultiCombination => (4, 5),
            BetType::BoxTwoOfFour => (4, 4),
        }
    }

    pub fn accepts(&self, n: usize) -> bool {
        let (lo, hi) = self.cardinality();
        (lo..=hi).contains(&n)
    }
}

/// One proposed bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetProposal {
    #[serde(rename = "type")]
    pub bet_type: BetType,
    pub participants: Vec<u32>,
    pub stake: f64,
    /// Expected payout multiplier on the stake if the bet wins
    pub expected_roi: f64,
    pub justification: String,
}

/// Ordered bet proposals plus aggregates. Invariant: `total_stake`
/// never exceeds budget + 0.50.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub bets: Vec<BetProposal>,
    pub total_stake: f64,
    /// Stake-weighted mean of per-bet expected ROI; 0.0 when empty
    pub expected_roi: f64,
}

impl RecommendationSet {
    pub fn empty() -> Self {
        RecommendationSet {
            bets: Vec::new(),
            total_stake: 0.0,
            expected_roi: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Recompute aggregates from the bet list.
    pub fn from_bets(bets: Vec<BetProposal>) -> Self {
        let total_stake: f64 = bets.iter().map(|b| b.stake).sum();
        let expected_roi = if total_stake > 0.0 {
            bets.iter().map(|b| b.stake * b.expected_roi).sum::<f64>() / total_stake
        } else {
            0.0
        };
        RecommendationSet {
            bets,
            total_stake,
            expected_roi,
        }
    }
}

/// Which path produced the final recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Deterministic,
    Advisory,
}

/// The recommendation that survived the strategy selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub set: RecommendationSet,
    pub origin: Origin,
    /// Classifier confidence that passed (or tripped) the kill switch
    pub confidence: u8,
}

/// Successful advisory opinion: its own scenario read, bets and critique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryAnalysis {
    pub scenario: Scenario,
    pub set: RecommendationSet,
    pub critique: String,
}

/// The full analysis document served to the caller and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub date: NaiveDate,
    pub meeting: u32,
    pub race: u32,
    pub venue: String,
    pub verdict: ScenarioVerdict,
    /// Ordered by score descending
    pub scored_field: Vec<ScoredParticipant>,
    pub value_signals: Vec<ValueSignal>,
    pub recommendation: FinalRecommendation,
    pub budget_total: f64,
    pub budget_used: f64,
    /// Share of runners with at most one defaulted criterion, 0–100
    pub data_quality: u32,
    pub scratched: Vec<u32>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

/// Settlement status of one proposal against the actual finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Won,
    Lost,
    /// Named a scratched runner; excluded from counts and ROI
    Void,
}

/// One settled proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetOutcome {
    pub bet: BetProposal,
    pub status: BetStatus,
    pub payout: f64,
}

/// Post-race accuracy report. Created once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebriefReport {
    pub finish_order: Vec<u32>,
    pub scratched: Vec<u32>,
    pub outcomes: Vec<BetOutcome>,
    /// Stake over non-void bets
    pub total_stake: f64,
    pub total_payout: f64,
    /// total_payout / total_stake; exactly 0.0 on zero stake
    pub realized_roi: f64,
    /// Share of the recommendation's implied top-3 picks found in the
    /// actual top 3, order-insensitive
    pub top3_precision: f64,
}
