//! Race evaluation pipeline.
//!
//! One `analyze` call runs the full deterministic chain (score, classify,
//! detect value, allocate) and consults the advisory adapter concurrently
//! under a hard deadline. The deterministic result never waits on network
//! success; a dead advisory only narrows the selector's choice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::advisory::{AdvisoryClient, AdvisoryError};
use crate::config::Config;
use crate::db::models::{
    AdvisoryAnalysis, AnalysisReport, DebriefReport, RaceCard, Scenario, ScenarioVerdict,
    ScoredParticipant, ValueSignal,
};
use crate::db::Database;
use crate::engine::scenario::{self, ClassifierConfig, FieldSummary};
use crate::engine::{allocator, debrief, scoring, selector, tracks, value, EngineError};
use crate::provider::{ProviderError, RaceDataProvider};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("race has not been analyzed yet")]
    NotAnalyzed,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Evaluates races and settles them afterwards.
#[derive(Clone)]
pub struct Analyzer {
    provider: Arc<dyn RaceDataProvider>,
    advisory: AdvisoryClient,
    db: Database,
    budget: f64,
    currency_step: f64,
    edge_threshold: f64,
    model_prob_floor: f64,
    kill_switch_confidence: u8,
    advisory_timeout: Duration,
    classifier: ClassifierConfig,
}

impl Analyzer {
    pub fn new(
        config: &Config,
        provider: Arc<dyn RaceDataProvider>,
        advisory: AdvisoryClient,
        db: Database,
    ) -> Self {
        Analyzer {
            provider,
            advisory,
            db,
            budget: config.budget,
            currency_step: config.currency_step,
            edge_threshold: config.edge_threshold,
            model_prob_floor: config.model_prob_floor,
            kill_switch_confidence: config.kill_switch_confidence,
            advisory_timeout: Duration::from_secs(config.advisory_timeout_secs),
            classifier: ClassifierConfig::default(),
        }
    }

    /// Full pre-race evaluation. The report is persisted before it is
    /// returned; re-analyzing a race replaces the stored document.
    pub async fn analyze(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<AnalysisReport, PipelineError> {
        let card = self.provider.fetch_race(date, meeting, race).await?;
        info!(
            "Analyzing {} R{}C{} at {} ({} runners)",
            date,
            meeting,
            race,
            card.venue,
            card.field.len()
        );

        // An unknown venue degrades the time criterion instead of killing
        // the whole evaluation; the scores record the default.
        let coefficient = match tracks::coefficient(&card.venue) {
            Ok(c) => {
                debug!(
                    "Venue {} offset {:+.1}s ({:?} surface)",
                    card.venue,
                    c,
                    tracks::category(c)
                );
                Some(c)
            }
            Err(e) => {
                warn!("{}; scoring without time normalization", e);
                None
            }
        };

        let mut scored: Vec<ScoredParticipant> = card
            .field
            .iter()
            .filter(|p| !card.scratched.contains(&p.number))
            .map(|p| scoring::score(p, coefficient, card.distance))
            .collect();
        scored.sort_by(|a, b| b.total.cmp(&a.total).then(a.number.cmp(&b.number)));

        let signals = value::detect(&scored, self.edge_threshold, self.model_prob_floor);
        let summary = FieldSummary::build(&scored, &signals, &self.classifier);
        let verdict = scenario::classify(&summary, &self.classifier);
        info!(
            "Scenario: {} (confidence {}/10): {}",
            scenario_label(verdict.scenario),
            verdict.confidence,
            verdict.reason
        );

        let deterministic =
            allocator::allocate(&scored, &signals, &verdict, self.budget, self.currency_step)?;

        let advisory = self
            .consult_advisory(&card, &scored, &verdict, &signals)
            .await;

        let recommendation = selector::select(
            deterministic,
            advisory.as_ref().map(|a| a.set.clone()),
            verdict.confidence,
            self.kill_switch_confidence,
        );

        let mut remark = if verdict.confidence < self.kill_switch_confidence {
            format!(
                "Abstained: confidence {}/10 is below the {}/10 threshold. {}",
                verdict.confidence, self.kill_switch_confidence, verdict.reason
            )
        } else {
            verdict.reason.clone()
        };
        if let Some(adv) = &advisory {
            if !adv.critique.is_empty() {
                remark.push_str(" Advisory: ");
                remark.push_str(&adv.critique);
            }
        }

        let report = AnalysisReport {
            date,
            meeting,
            race,
            venue: card.venue.clone(),
            verdict,
            data_quality: scoring::data_quality(&scored),
            scored_field: scored,
            value_signals: signals,
            budget_total: self.budget,
            budget_used: recommendation.set.total_stake,
            recommendation,
            scratched: card.scratched,
            remark,
            created_at: Utc::now(),
        };
        self.db.insert_analysis(&report)?;
        Ok(report)
    }

    /// Run the advisory consultation in its own task under the configured
    /// deadline. Every failure mode collapses to `None` here; the selector
    /// treats that as "deterministic only".
    async fn consult_advisory(
        &self,
        card: &RaceCard,
        scored: &[ScoredParticipant],
        verdict: &ScenarioVerdict,
        signals: &[ValueSignal],
    ) -> Option<AdvisoryAnalysis> {
        let client = self.advisory.clone();
        let card = card.clone();
        let scored = scored.to_vec();
        let verdict = verdict.clone();
        let signals = signals.to_vec();
        let budget = self.budget;

        let mut handle = tokio::spawn(async move {
            client
                .advise(&card, &scored, &verdict, &signals, budget)
                .await
        });

        match timeout(self.advisory_timeout, &mut handle).await {
            Ok(Ok(Ok(analysis))) => Some(analysis),
            Ok(Ok(Err(AdvisoryError::NotConfigured))) => {
                debug!("Advisory not configured, deterministic only");
                None
            }
            Ok(Ok(Err(e))) => {
                warn!("Advisory unavailable: {}", e);
                None
            }
            Ok(Err(e)) => {
                warn!("Advisory task failed: {}", e);
                None
            }
            Err(_) => {
                handle.abort();
                warn!(
                    "Advisory missed the {:?} deadline, deterministic only",
                    self.advisory_timeout
                );
                None
            }
        }
    }

    /// Settle a previously analyzed race against its actual finish.
    pub async fn debrief(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<DebriefReport, PipelineError> {
        let (analysis_id, analysis) = self
            .db
            .get_analysis(date, meeting, race)?
            .ok_or(PipelineError::NotAnalyzed)?;

        let result = self.provider.fetch_result(date, meeting, race).await?;

        // Late scratches only show up in the result feed
        let mut scratched = analysis.scratched.clone();
        for n in &result.scratched {
            if !scratched.contains(n) {
                scratched.push(*n);
            }
        }

        let report = debrief::evaluate(&analysis.recommendation, &result.finish_order, &scratched);
        self.db.insert_debrief(analysis_id, &report)?;
        info!(
            "Debrief {} R{}C{}: staked {:.2}, returned {:.2} (ROI {:.2})",
            date, meeting, race, report.total_stake, report.total_payout, report.realized_roi
        );
        Ok(report)
    }
}

fn scenario_label(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::DominantFavorite => "DOMINANT_FAVORITE",
        Scenario::OpenContest => "OPEN_CONTEST",
        Scenario::Surprise => "SURPRISE",
        Scenario::Trap => "TRAP",
        Scenario::Unplayable => "UNPLAYABLE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        Participant, RaceCard, RaceResult, ShoeChange, TrainerOpinion,
    };
    use async_trait::async_trait;
    use clap::Parser;

    struct FixedProvider {
        card: RaceCard,
        result: RaceResult,
    }

    #[async_trait]
    impl RaceDataProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_race(
            &self,
            _date: NaiveDate,
            _meeting: u32,
            _race: u32,
        ) -> Result<RaceCard, ProviderError> {
            Ok(self.card.clone())
        }

        async fn fetch_result(
            &self,
            _date: NaiveDate,
            _meeting: u32,
            _race: u32,
        ) -> Result<RaceResult, ProviderError> {
            Ok(self.result.clone())
        }
    }

    fn runner(number: u32, wins: u32, odds: f64, last_time: Option<f64>) -> Participant {
        Participant {
            number,
            name: format!("RUNNER {}", number),
            age: 6,
            driver: "J. DOE".into(),
            trainer: "T. SMITH".into(),
            recent_form: "1a2a3a".into(),
            starts: 20,
            wins,
            places: wins + 4,
            last_time,
            odds,
            shoeing: ShoeChange::Unchanged,
            trainer_opinion: TrainerOpinion::Neutral,
            venue_affinity: vec![],
            discipline_switch: false,
        }
    }

    fn card() -> RaceCard {
        RaceCard {
            date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            meeting: 1,
            race: 4,
            venue: "VINCENNES".into(),
            distance: 2700,
            discipline: "ATTELE".into(),
            field: vec![
                runner(1, 9, 2.5, Some(71.0)),
                runner(2, 3, 8.0, Some(73.5)),
                runner(3, 2, 12.0, Some(74.0)),
                runner(4, 1, 20.0, Some(74.5)),
                runner(5, 1, 25.0, None),
                runner(6, 0, 40.0, None),
            ],
            scratched: vec![7],
        }
    }

    fn analyzer(provider: FixedProvider) -> Analyzer {
        let config = Config::parse_from(["turfpilot"]);
        let advisory = AdvisoryClient::new(
            &config.advisory_api_url,
            None,
            &config.advisory_model,
            Duration::from_secs(1),
            0,
        )
        .unwrap();
        let db = Database::open(":memory:").unwrap();
        Analyzer::new(&config, Arc::new(provider), advisory, db)
    }

    #[tokio::test]
    async fn test_analyze_persists_and_reports() {
        let provider = FixedProvider {
            card: card(),
            result: RaceResult {
                finish_order: vec![1, 2, 3, 4, 5],
                scratched: vec![],
            },
        };
        let analyzer = analyzer(provider);
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();

        let report = analyzer.analyze(date, 1, 4).await.unwrap();
        assert_eq!(report.venue, "VINCENNES");
        assert_eq!(report.scored_field.len(), 6);
        // No advisory key configured, so the origin must be deterministic
        assert_eq!(
            report.recommendation.origin,
            crate::db::models::Origin::Deterministic
        );
        assert!(report.budget_used <= report.budget_total + 0.5);
        // Field is ordered by score descending
        assert!(report.scored_field[0].total >= report.scored_field[1].total);

        let debrief = analyzer.debrief(date, 1, 4).await.unwrap();
        assert!(debrief.realized_roi >= 0.0);
    }

    #[tokio::test]
    async fn test_debrief_without_analysis_fails() {
        let provider = FixedProvider {
            card: card(),
            result: RaceResult {
                finish_order: vec![1, 2, 3],
                scratched: vec![],
            },
        };
        let analyzer = analyzer(provider);
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert!(matches!(
            analyzer.debrief(date, 1, 4).await,
            Err(PipelineError::NotAnalyzed)
        ));
    }

    #[tokio::test]
    async fn test_scratched_runner_is_not_scored() {
        let mut race_card = card();
        race_card.field.push(runner(7, 5, 3.0, Some(72.0)));
        let provider = FixedProvider {
            card: race_card,
            result: RaceResult {
                finish_order: vec![1, 2, 3],
                scratched: vec![],
            },
        };
        let analyzer = analyzer(provider);
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let report = analyzer.analyze(date, 1, 4).await.unwrap();
        assert!(report.scored_field.iter().all(|s| s.number != 7));
        assert_eq!(report.scratched, vec![7]);
    }
}
