//! Deterministic 0–100 suitability scoring.
//!
//! Five weighted criteria, each bounded to a fixed share of 100:
//! form 30, time 25, connections 20, condition 15, context 10.
//! A missing input never fails the horse: the criterion degrades to its
//! documented neutral default and the degradation is recorded in
//! `ScoreBreakdown::defaulted` so consumers can see what was assumed.

use crate::db::models::{
    DataConfidence, Participant, ProfileTag, ScoreBreakdown, ScoredParticipant, ShoeChange,
    TrainerOpinion,
};

/// Drivers whose presence alone moves the market.
const ELITE_DRIVERS: &[&str] = &[
    "NIVARD",
    "ABRIVARD",
    "MOTTIER",
    "LEBELLER",
    "VERVA",
    "LECANU",
    "RAFFIN",
    "BRIAND",
    "BARRIER",
    "LOCQUENEUX",
];

/// Elite reference times (seconds of km-reduction) per distance at the
/// reference track. Nearest distance wins.
const REFERENCE_TIMES: &[(u32, f64)] = &[(2100, 66.0), (2700, 72.0), (2850, 75.0), (4150, 105.0)];

fn reference_time(distance: u32) -> f64 {
    REFERENCE_TIMES
        .iter()
        .min_by_key(|(d, _)| d.abs_diff(distance))
        .map(|(_, t)| *t)
        .unwrap_or(72.0)
}

/// Score one participant. `coefficient` is the venue offset from
/// `tracks::coefficient`; `None` means the caller chose to proceed without
/// normalization (unknown venue) and the time criterion degrades.
pub fn score(p: &Participant, coefficient: Option<f64>, distance: u32) -> ScoredParticipant {
    let mut br = ScoreBreakdown::default();

    br.form = score_form(p, &mut br.defaulted, &mut br.bonuses);
    br.time = score_time(p, coefficient, distance, &mut br.defaulted, &mut br.bonuses);
    br.connections = score_connections(p, &mut br.defaulted, &mut br.bonuses);
    br.condition = score_condition(p, &mut br.defaulted, &mut br.bonuses);
    br.context = score_context(p, &mut br.bonuses);

    let total = br.form + br.time + br.connections + br.condition + br.context;
    let profile = profile_tag(total, p.odds);
    let confidence = match br.defaulted.len() {
        0 => DataConfidence::High,
        1 | 2 => DataConfidence::Medium,
        _ => DataConfidence::Low,
    };

    ScoredParticipant {
        number: p.number,
        name: p.name.clone(),
        odds: p.odds,
        total,
        profile,
        confidence,
        breakdown: br,
    }
}

/// Form (0–30): career win ratio (≤15), consistency bonus (5), and the
/// last five placings (wins ×5, places ×2, ≤15).
fn score_form(p: &Participant, defaulted: &mut Vec<String>, bonuses: &mut Vec<String>) -> u32 {
    let mut score = 0u32;

    if p.starts > 0 {
        let win_ratio = p.wins as f64 / p.starts as f64;
        score += (win_ratio * 100.0) as u32; // capped below
        score = score.min(15);

        if p.starts >= 5 {
            let place_ratio = (p.wins + p.places) as f64 / p.starts as f64;
            if place_ratio >= 0.6 {
                score += 5;
                bonuses.push("consistency".into());
            }
        }
    } else {
        defaulted.push("starts".into());
    }

    if !p.recent_form.is_empty() {
        let recent: String = p.recent_form.chars().take(5).collect();
        let recent_wins = recent.matches('1').count() as u32;
        let recent_places = (recent.matches('2').count() + recent.matches('3').count()) as u32;
        score += (recent_wins * 5 + recent_places * 2).min(15);
        if recent.chars().take(3).filter(|c| *c == '1').count() >= 2 {
            bonuses.push("winning_streak".into());
        }
    } else {
        defaulted.push("recent_form".into());
    }

    score.min(30)
}

/// Time (0–25): banded by normalized-time gap against the distance
/// reference. Missing time or unknown venue scores 0 and is recorded.
fn score_time(
    p: &Participant,
    coefficient: Option<f64>,
    distance: u32,
    defaulted: &mut Vec<String>,
    bonuses: &mut Vec<String>,
) -> u32 {
    let (raw, coef) = match (p.last_time, coefficient) {
        (Some(raw), Some(coef)) => (raw, coef),
        _ => {
            defaulted.push("time".into());
            return 0;
        }
    };

    let gap = (raw + coef) - reference_time(distance);
    if gap <= -1.5 {
        bonuses.push("excellent_time".into());
        25
    } else if gap <= -0.5 {
        20
    } else if gap <= 0.5 {
        15
    } else if gap <= 1.5 {
        10
    } else {
        5
    }
}

/// Connections (0–20): base 10, elite driver +5, trainer opinion ±.
fn score_connections(
    p: &Participant,
    defaulted: &mut Vec<String>,
    bonuses: &mut Vec<String>,
) -> u32 {
    let mut score = 10i32;

    if p.driver.is_empty() {
        defaulted.push("driver".into());
    } else {
        let upper = p.driver.to_uppercase();
        if ELITE_DRIVERS.iter().any(|d| upper.contains(d)) {
            score += 5;
            bonuses.push("elite_driver".into());
        }
    }

    match p.trainer_opinion {
        TrainerOpinion::Positive => {
            score += 5;
            bonuses.push("trainer_positive".into());
        }
        TrainerOpinion::Negative => score -= 3,
        TrainerOpinion::Neutral => {}
    }

    score.clamp(0, 20) as u32
}

/// Condition (0–15): base 10, shoeing change bonus, age window.
fn score_condition(
    p: &Participant,
    defaulted: &mut Vec<String>,
    bonuses: &mut Vec<String>,
) -> u32 {
    let mut score = 10i32;

    match p.shoeing {
        ShoeChange::FullyUnshod => {
            score += 5;
            bonuses.push("fully_unshod".into());
        }
        ShoeChange::PartialUnshod => {
            score += 3;
            bonuses.push("partially_unshod".into());
        }
        ShoeChange::Unchanged => {}
    }

    if p.age == 0 {
        defaulted.push("age".into());
    } else if (4..=8).contains(&p.age) {
        score += 2;
    } else if p.age > 10 {
        score -= 2;
    }

    score.clamp(0, 15) as u32
}

/// Context (0–10): base 5, venue affinity +3, discipline switch −2.
fn score_context(p: &Participant, bonuses: &mut Vec<String>) -> u32 {
    let mut score = 5i32;

    if !p.venue_affinity.is_empty() {
        // Affinity list entries are venue names as the provider spells them
        bonuses.push("venue_affinity".into());
        score += 3;
    }
    if p.discipline_switch {
        score -= 2;
    }

    score.clamp(0, 10) as u32
}

fn profile_tag(total: u32, odds: f64) -> ProfileTag {
    let base = if total >= 80 {
        ProfileTag::SafeFavorite
    } else if total >= 70 {
        ProfileTag::Steady
    } else if total >= 60 {
        ProfileTag::Risky
    } else {
        ProfileTag::Outsider
    };

    // Market agreement shifts the edges of the bands
    if odds > 0.0 && odds < 4.0 && total >= 75 {
        ProfileTag::SafeFavorite
    } else if odds > 15.0 && total < 70 {
        ProfileTag::Outsider
    } else {
        base
    }
}

/// Share of runners with at most one defaulted criterion, as a 0–100
/// percentage. Drives the report's data-quality indicator.
pub fn data_quality(field: &[ScoredParticipant]) -> u32 {
    if field.is_empty() {
        return 0;
    }
    let complete = field
        .iter()
        .filter(|s| s.breakdown.defaulted.len() <= 1)
        .count();
    ((complete as f64 / field.len() as f64) * 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(number: u32) -> Participant {
        Participant {
            number,
            name: format!("HORSE {}", number),
            age: 6,
            driver: "E. RAFFIN".into(),
            trainer: "T. DUVALDESTIN".into(),
            recent_form: "1a2a1a3a5".into(),
            starts: 20,
            wins: 6,
            places: 8,
            last_time: Some(72.5),
            odds: 4.5,
            shoeing: ShoeChange::FullyUnshod,
            trainer_opinion: TrainerOpinion::Positive,
            venue_affinity: vec!["VINCENNES".into()],
            discipline_switch: false,
        }
    }

    #[test]
    fn test_strong_runner_scores_high() {
        let s = score(&runner(1), Some(0.0), 2700);
        assert!(s.total >= 80, "expected >= 80, got {}", s.total);
        assert_eq!(s.confidence, DataConfidence::High);
        assert!(s.breakdown.defaulted.is_empty());
        assert!(s.breakdown.bonuses.iter().any(|b| b == "elite_driver"));
    }

    #[test]
    fn test_subscores_respect_their_bounds() {
        let s = score(&runner(1), Some(-0.5), 2700);
        assert!(s.breakdown.form <= 30);
        assert!(s.breakdown.time <= 25);
        assert!(s.breakdown.connections <= 20);
        assert!(s.breakdown.condition <= 15);
        assert!(s.breakdown.context <= 10);
        assert!(s.total <= 100);
    }

    #[test]
    fn test_missing_inputs_degrade_and_are_recorded() {
        let mut p = runner(2);
        p.starts = 0;
        p.wins = 0;
        p.places = 0;
        p.recent_form = String::new();
        p.last_time = None;
        p.driver = String::new();
        p.age = 0;
        let s = score(&p, Some(0.0), 2700);
        // Neutral defaults, not a rejection
        assert_eq!(s.breakdown.form, 0);
        assert_eq!(s.breakdown.time, 0);
        assert_eq!(s.breakdown.connections, 15); // base + positive opinion
        for key in ["starts", "recent_form", "time", "driver", "age"] {
            assert!(
                s.breakdown.defaulted.iter().any(|d| d == key),
                "missing {} in defaulted list",
                key
            );
        }
        assert_eq!(s.confidence, DataConfidence::Low);
    }

    #[test]
    fn test_unknown_venue_degrades_time_criterion() {
        let s = score(&runner(3), None, 2700);
        assert_eq!(s.breakdown.time, 0);
        assert!(s.breakdown.defaulted.iter().any(|d| d == "time"));
    }

    #[test]
    fn test_determinism() {
        let p = runner(4);
        let a = score(&p, Some(0.3), 2850);
        let b = score(&p, Some(0.3), 2850);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_excellent_time_band() {
        let mut p = runner(5);
        p.last_time = Some(70.0); // 2.0s under the 2700m reference
        let s = score(&p, Some(0.0), 2700);
        assert_eq!(s.breakdown.time, 25);
        assert!(s.breakdown.bonuses.iter().any(|b| b == "excellent_time"));
    }

    #[test]
    fn test_profile_tags() {
        assert_eq!(profile_tag(85, 6.0), ProfileTag::SafeFavorite);
        assert_eq!(profile_tag(72, 6.0), ProfileTag::Steady);
        assert_eq!(profile_tag(62, 6.0), ProfileTag::Risky);
        assert_eq!(profile_tag(50, 6.0), ProfileTag::Outsider);
        // Short price promotes a 75+ horse
        assert_eq!(profile_tag(76, 3.0), ProfileTag::SafeFavorite);
        // Long price demotes a sub-70 horse
        assert_eq!(profile_tag(65, 20.0), ProfileTag::Outsider);
    }

    #[test]
    fn test_data_quality_indicator() {
        let clean = score(&runner(1), Some(0.0), 2700);
        let mut p = runner(2);
        p.starts = 0;
        p.recent_form = String::new();
        p.last_time = None;
        let degraded = score(&p, Some(0.0), 2700);
        assert_eq!(data_quality(&[clean.clone()]), 100);
        assert_eq!(data_quality(&[clean, degraded]), 50);
        assert_eq!(data_quality(&[]), 0);
    }
}
