use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub mod models;
use models::{AnalysisReport, BetStatus, DebriefReport};

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Analyses ──────────────────────────────────────────────────────────────

    /// Store an analysis. Re-analyzing the same race replaces the previous
    /// document and orphans nothing (debriefs cascade).
    pub fn insert_analysis(&self, report: &AnalysisReport) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let document = serde_json::to_string(report).context("Failed to serialize analysis")?;
        conn.execute(
            "INSERT INTO analyses (
                race_date, meeting, race, venue, scenario, confidence,
                origin, total_stake, expected_roi, data_quality,
                document, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT(race_date, meeting, race) DO UPDATE SET
                venue=excluded.venue,
                scenario=excluded.scenario,
                confidence=excluded.confidence,
                origin=excluded.origin,
                total_stake=excluded.total_stake,
                expected_roi=excluded.expected_roi,
                data_quality=excluded.data_quality,
                document=excluded.document,
                created_at=excluded.created_at",
            params![
                report.date.to_string(),
                report.meeting,
                report.race,
                report.venue,
                serde_plain_label(&report.verdict.scenario)?,
                report.verdict.confidence,
                serde_plain_label(&report.recommendation.origin)?,
                report.recommendation.set.total_stake,
                report.recommendation.set.expected_roi,
                report.data_quality,
                document,
                report.created_at,
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM analyses WHERE race_date=?1 AND meeting=?2 AND race=?3",
            params![report.date.to_string(), report.meeting, report.race],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Load a stored analysis by race reference.
    pub fn get_analysis(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<Option<(i64, AnalysisReport)>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, document FROM analyses
                 WHERE race_date=?1 AND meeting=?2 AND race=?3",
                params![date.to_string(), meeting, race],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((id, document)) => {
                let report =
                    serde_json::from_str(&document).context("Failed to parse stored analysis")?;
                Ok(Some((id, report)))
            }
            None => Ok(None),
        }
    }

    // ── Debriefs ──────────────────────────────────────────────────────────────

    pub fn insert_debrief(&self, analysis_id: i64, report: &DebriefReport) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let document = serde_json::to_string(report).context("Failed to serialize debrief")?;
        let won = report
            .outcomes
            .iter()
            .filter(|o| o.status == BetStatus::Won)
            .count() as i64;
        let lost = report
            .outcomes
            .iter()
            .filter(|o| o.status == BetStatus::Lost)
            .count() as i64;
        let void = report
            .outcomes
            .iter()
            .filter(|o| o.status == BetStatus::Void)
            .count() as i64;
        conn.execute(
            "INSERT INTO debriefs (
                analysis_id, total_stake, total_payout, realized_roi,
                top3_precision, won_bets, lost_bets, void_bets,
                document, settled_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(analysis_id) DO UPDATE SET
                total_stake=excluded.total_stake,
                total_payout=excluded.total_payout,
                realized_roi=excluded.realized_roi,
                top3_precision=excluded.top3_precision,
                won_bets=excluded.won_bets,
                lost_bets=excluded.lost_bets,
                void_bets=excluded.void_bets,
                document=excluded.document,
                settled_at=excluded.settled_at",
            params![
                analysis_id,
                report.total_stake,
                report.total_payout,
                report.realized_roi,
                report.top3_precision,
                won,
                lost,
                void,
                document,
                Utc::now(),
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM debriefs WHERE analysis_id=?1",
            params![analysis_id],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    // ── History & stats ───────────────────────────────────────────────────────

    /// Recent analyses with their settlement, newest first.
    pub fn list_history(&self, limit: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.race_date, a.meeting, a.race, a.venue, a.scenario,
                    a.confidence, a.origin, a.total_stake, a.expected_roi,
                    a.data_quality, a.created_at,
                    d.realized_roi, d.total_payout, d.top3_precision
             FROM analyses a
             LEFT JOIN debriefs d ON d.analysis_id = a.id
             ORDER BY a.created_at DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                let date: String = row.get(0)?;
                Ok(HistoryEntry {
                    date,
                    meeting: row.get(1)?,
                    race: row.get(2)?,
                    venue: row.get(3)?,
                    scenario: row.get(4)?,
                    confidence: row.get(5)?,
                    origin: row.get(6)?,
                    total_stake: row.get(7)?,
                    expected_roi: row.get(8)?,
                    data_quality: row.get(9)?,
                    created_at: row.get(10)?,
                    realized_roi: row.get(11)?,
                    total_payout: row.get(12)?,
                    top3_precision: row.get(13)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Aggregate performance across all settled races.
    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.conn.lock().unwrap();
        let total_analyses: i64 = conn
            .query_row("SELECT COUNT(*) FROM analyses", [], |r| r.get(0))
            .unwrap_or(0);
        let settled_races: i64 = conn
            .query_row("SELECT COUNT(*) FROM debriefs", [], |r| r.get(0))
            .unwrap_or(0);
        let won_bets: i64 = conn
            .query_row("SELECT COALESCE(SUM(won_bets),0) FROM debriefs", [], |r| {
                r.get(0)
            })
            .unwrap_or(0);
        let lost_bets: i64 = conn
            .query_row("SELECT COALESCE(SUM(lost_bets),0) FROM debriefs", [], |r| {
                r.get(0)
            })
            .unwrap_or(0);
        let total_staked: f64 = conn
            .query_row(
                "SELECT COALESCE(SUM(total_stake),0) FROM debriefs",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0.0);
        let total_returned: f64 = conn
            .query_row(
                "SELECT COALESCE(SUM(total_payout),0) FROM debriefs",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0.0);
        let avg_top3_precision: f64 = conn
            .query_row(
                "SELECT COALESCE(AVG(top3_precision),0) FROM debriefs",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0.0);

        let overall_roi = if total_staked > 0.0 {
            total_returned / total_staked
        } else {
            0.0
        };

        Ok(Stats {
            total_analyses,
            settled_races,
            won_bets,
            lost_bets,
            total_staked,
            total_returned,
            overall_roi,
            avg_top3_precision,
        })
    }
}

/// Scenario/origin enums serialize as bare JSON strings; store that label.
fn serde_plain_label<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => anyhow::bail!("expected string label, got {}", other),
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS analyses (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    race_date    TEXT    NOT NULL,
    meeting      INTEGER NOT NULL,
    race         INTEGER NOT NULL,
    venue        TEXT    NOT NULL,
    scenario     TEXT    NOT NULL,
    confidence   INTEGER NOT NULL,
    origin       TEXT    NOT NULL,
    total_stake  REAL    NOT NULL,
    expected_roi REAL    NOT NULL,
    data_quality INTEGER NOT NULL,
    document     TEXT    NOT NULL,
    created_at   TEXT    NOT NULL,
    UNIQUE(race_date, meeting, race)
);

CREATE TABLE IF NOT EXISTS debriefs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    analysis_id    INTEGER NOT NULL UNIQUE,
    total_stake    REAL    NOT NULL,
    total_payout   REAL    NOT NULL,
    realized_roi   REAL    NOT NULL,
    top3_precision REAL    NOT NULL,
    won_bets       INTEGER NOT NULL,
    lost_bets      INTEGER NOT NULL,
    void_bets      INTEGER NOT NULL,
    document       TEXT    NOT NULL,
    settled_at     TEXT    NOT NULL,
    FOREIGN KEY (analysis_id) REFERENCES analyses(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_analyses_race ON analyses(race_date, meeting, race);
CREATE INDEX IF NOT EXISTS idx_debriefs_analysis ON debriefs(analysis_id);
"#;

/// One row of the history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub meeting: u32,
    pub race: u32,
    pub venue: String,
    pub scenario: String,
    pub confidence: u8,
    pub origin: String,
    pub total_stake: f64,
    pub expected_roi: f64,
    pub data_quality: u32,
    pub created_at: DateTime<Utc>,
    pub realized_roi: Option<f64>,
    pub total_payout: Option<f64>,
    pub top3_precision: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_analyses: i64,
    pub settled_races: i64,
    pub won_bets: i64,
    pub lost_bets: i64,
    pub total_staked: f64,
    pub total_returned: f64,
    /// total_returned / total_staked over settled races; 0.0 before any
    pub overall_roi: f64,
    pub avg_top3_precision: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        FinalRecommendation, Origin, RecommendationSet, Scenario, ScenarioVerdict,
    };

    fn sample_report() -> AnalysisReport {
        AnalysisReport {
            date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            meeting: 1,
            race: 4,
            venue: "VINCENNES".into(),
            verdict: ScenarioVerdict {
                scenario: Scenario::OpenContest,
                confidence: 7,
                field_size: 12,
                reason: "tight scores".into(),
            },
            scored_field: vec![],
            value_signals: vec![],
            recommendation: FinalRecommendation {
                set: RecommendationSet::empty(),
                origin: Origin::Deterministic,
                confidence: 7,
            },
            budget_total: 20.0,
            budget_used: 0.0,
            data_quality: 83,
            scratched: vec![9],
            remark: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_analysis_round_trip() {
        let db = Database::open(":memory:").unwrap();
        let report = sample_report();
        let id = db.insert_analysis(&report).unwrap();
        let (loaded_id, loaded) = db
            .get_analysis(report.date, report.meeting, report.race)
            .unwrap()
            .unwrap();
        assert_eq!(id, loaded_id);
        assert_eq!(loaded.venue, "VINCENNES");
        assert_eq!(loaded.verdict.scenario, Scenario::OpenContest);
        assert_eq!(loaded.scratched, vec![9]);
    }

    #[test]
    fn test_reanalysis_replaces_previous_row() {
        let db = Database::open(":memory:").unwrap();
        let mut report = sample_report();
        let first = db.insert_analysis(&report).unwrap();
        report.remark = "second pass".into();
        let second = db.insert_analysis(&report).unwrap();
        assert_eq!(first, second);
        let (_, loaded) = db
            .get_analysis(report.date, report.meeting, report.race)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.remark, "second pass");
        assert_eq!(db.list_history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_analysis_is_none() {
        let db = Database::open(":memory:").unwrap();
        let found = db
            .get_analysis(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 1, 1)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_debrief_feeds_stats() {
        let db = Database::open(":memory:").unwrap();
        let id = db.insert_analysis(&sample_report()).unwrap();
        let debrief = DebriefReport {
            finish_order: vec![7, 3, 1],
            scratched: vec![],
            outcomes: vec![],
            total_stake: 14.0,
            total_payout: 35.0,
            realized_roi: 2.5,
            top3_precision: 2.0 / 3.0,
        };
        db.insert_debrief(id, &debrief).unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_analyses, 1);
        assert_eq!(stats.settled_races, 1);
        assert!((stats.overall_roi - 2.5).abs() < 1e-9);

        let history = db.list_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].realized_roi, Some(2.5));
    }

    #[test]
    fn test_stats_empty_database() {
        let db = Database::open(":memory:").unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_analyses, 0);
        assert_eq!(stats.overall_roi, 0.0);
    }
}
