use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::{ProviderError, RaceDataProvider};
use crate::db::models::{Participant, RaceCard, RaceResult, ShoeChange, TrainerOpinion};

/// Declared statuses that mean a runner will not start.
const NON_STARTER_STATUSES: &[&str] = &[
    "FORFAIT",
    "NON_PARTANT",
    "RETIRE",
    "ABSENT",
    "DISQUALIFIE_AVANT_COURSE",
    "NP",
];

/// Client for the public PMU turf-info REST API.
#[derive(Clone)]
pub struct PmuClient {
    http: Client,
    base_url: String,
}

impl PmuClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build provider HTTP client: {}", e))?;
        Ok(PmuClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `programme/{DDMMYYYY}/R{meeting}/C{race}` is the base path for every
    /// per-race endpoint on this API.
    fn race_path(&self, date: NaiveDate, meeting: u32, race: u32) -> String {
        format!(
            "{}/programme/{}/R{}/C{}",
            self.base_url,
            date.format("%d%m%Y"),
            meeting,
            race
        )
    }

    async fn get_json(&self, url: &str, label: &str) -> Result<serde_json::Value, ProviderError> {
        debug!("Fetching {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 404 || status.as_u16() == 204 {
            return Err(ProviderError::NoData(label.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
            });
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RaceDataProvider for PmuClient {
    fn name(&self) -> &str {
        "PMU"
    }

    async fn fetch_race(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<RaceCard, ProviderError> {
        let label = format!("{} R{}C{}", date.format("%d%m%Y"), meeting, race);
        let base = self.race_path(date, meeting, race);

        let course = self.get_json(&base, &label).await?;
        let participants = self
            .get_json(&format!("{}/participants", base), &label)
            .await?;
        // Detailed past performances are best-effort enrichment
        let performances = self
            .get_json(&format!("{}/performances-detaillees", base), &label)
            .await
            .ok();

        let venue = course["hippodrome"]["libelleCourt"]
            .as_str()
            .or_else(|| course["hippodrome"]["libelleLong"].as_str())
            .ok_or_else(|| ProviderError::Malformed("missing venue".into()))?
            .to_uppercase();
        let distance = course["distance"]
            .as_u64()
            .ok_or_else(|| ProviderError::Malformed("missing distance".into()))?
            as u32;
        let discipline = course["specialite"]
            .as_str()
            .or_else(|| course["discipline"].as_str())
            .unwrap_or("ATTELE")
            .to_uppercase();

        let declared = participants["participants"]
            .as_array()
            .ok_or_else(|| ProviderError::Malformed("missing participants array".into()))?;
        if declared.is_empty() {
            return Err(ProviderError::NoData(label));
        }

        let mut field = Vec::new();
        let mut scratched = Vec::new();
        for raw in declared {
            if is_non_starter(raw) {
                if let Some(n) = raw["numPmu"].as_u64() {
                    info!("Non-starter #{} {}", n, raw["nom"].as_str().unwrap_or("?"));
                    scratched.push(n as u32);
                }
                continue;
            }
            match parse_participant(raw) {
                Some(p) => field.push(p),
                None => warn!("Skipping unreadable participant entry: {}", raw),
            }
        }
        if field.is_empty() {
            return Err(ProviderError::NoData(label));
        }

        if let Some(perfs) = performances {
            enrich_from_performances(&perfs, &mut field, &discipline);
        }

        info!(
            "Fetched {}: {} at {}m, {} runner(s), {} scratched",
            label,
            venue,
            distance,
            field.len(),
            scratched.len()
        );

        Ok(RaceCard {
            date,
            meeting,
            race,
            venue,
            distance,
            discipline,
            field,
            scratched,
        })
    }

    async fn fetch_result(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<RaceResult, ProviderError> {
        let label = format!("{} R{}C{}", date.format("%d%m%Y"), meeting, race);
        let base = self.race_path(date, meeting, race);

        let course = self.get_json(&base, &label).await?;
        let finish_order = parse_finish_order(&course);
        if finish_order.is_empty() {
            return Err(ProviderError::NoData(label));
        }

        // Late scratches show up on the participants list, not the arrival
        let scratched = match self.get_json(&format!("{}/participants", base), &label).await {
            Ok(participants) => participants["participants"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter(|p| is_non_starter(p))
                        .filter_map(|p| p["numPmu"].as_u64().map(|n| n as u32))
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        Ok(RaceResult {
            finish_order,
            scratched,
        })
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

fn is_non_starter(raw: &serde_json::Value) -> bool {
    let status = raw["statut"].as_str().unwrap_or("").to_uppercase();
    if NON_STARTER_STATUSES.contains(&status.as_str()) {
        return true;
    }
    if raw["forfait"].as_bool() == Some(true) {
        return true;
    }
    if raw["participant"].as_bool() == Some(false) {
        return true;
    }
    raw["deferre"].as_str().map(str::to_uppercase).as_deref() == Some("NP")
}

fn parse_participant(raw: &serde_json::Value) -> Option<Participant> {
    let number = raw["numPmu"].as_u64()? as u32;
    let name = raw["nom"].as_str()?.to_string();

    let odds = raw["dernierRapportDirect"]["rapport"]
        .as_f64()
        .unwrap_or(0.0);

    Some(Participant {
        number,
        name,
        age: raw["age"].as_u64().unwrap_or(0) as u32,
        driver: raw["driver"].as_str().unwrap_or("").to_string(),
        trainer: raw["entraineur"].as_str().unwrap_or("").to_string(),
        recent_form: raw["musique"].as_str().unwrap_or("").to_string(),
        starts: raw["nombreCourses"].as_u64().unwrap_or(0) as u32,
        wins: raw["nombreVictoires"].as_u64().unwrap_or(0) as u32,
        places: raw["nombrePlaces"].as_u64().unwrap_or(0) as u32,
        last_time: parse_km_reduction(&raw["reductionKilometrique"]),
        odds,
        shoeing: parse_shoeing(raw["deferre"].as_str()),
        trainer_opinion: parse_trainer_opinion(raw["avisEntraineur"].as_str()),
        venue_affinity: Vec::new(),
        discipline_switch: false,
    })
}

/// The API reports the km-reduction time in hundredths of a second
/// (7450 = 74.50s). Never parse the display string.
fn parse_km_reduction(value: &serde_json::Value) -> Option<f64> {
    let raw = value.as_f64()?;
    if raw <= 0.0 {
        return None;
    }
    Some(raw / 100.0)
}

fn parse_shoeing(deferre: Option<&str>) -> ShoeChange {
    match deferre.map(str::to_uppercase).as_deref() {
        Some(s) if s.contains("DEFERRE") && s.contains("ANTERIEURS") && s.contains("POSTERIEURS") => {
            ShoeChange::FullyUnshod
        }
        Some(s) if s.contains("DEFERRE") => ShoeChange::PartialUnshod,
        _ => ShoeChange::Unchanged,
    }
}

fn parse_trainer_opinion(avis: Option<&str>) -> TrainerOpinion {
    match avis.map(str::to_uppercase).as_deref() {
        Some("POSITIF") => TrainerOpinion::Positive,
        Some("NEGATIF") => TrainerOpinion::Negative,
        _ => TrainerOpinion::Neutral,
    }
}

/// Fill in the two signals only the past-performance feed carries:
/// venues where the horse already won, and a switch away from the
/// discipline of its recent record.
fn enrich_from_performances(
    perfs: &serde_json::Value,
    field: &mut [Participant],
    race_discipline: &str,
) {
    let entries = match perfs["participants"].as_array() {
        Some(a) => a,
        None => return,
    };

    for entry in entries {
        let number = match entry["numPmu"].as_u64() {
            Some(n) => n as u32,
            None => continue,
        };
        let runner = match field.iter_mut().find(|p| p.number == number) {
            Some(r) => r,
            None => continue,
        };
        let courses = match entry["coursesCourues"].as_array() {
            Some(c) => c,
            None => continue,
        };

        // Most recent outing first
        if let Some(last) = courses.first() {
            let last_discipline = last["discipline"]
                .as_str()
                .or_else(|| last["specialite"].as_str())
                .unwrap_or("")
                .to_uppercase();
            if !last_discipline.is_empty() && last_discipline != race_discipline {
                runner.discipline_switch = true;
            }
        }

        for course in courses {
            let won = course["participants"]
                .as_array()
                .and_then(|ps| ps.iter().find(|p| p["numPmu"].as_u64() == Some(number as u64)))
                .and_then(|p| p["place"]["place"].as_u64().or_else(|| p["place"].as_u64()))
                == Some(1);
            if !won {
                continue;
            }
            let track = course["hippodrome"]["libelleCourt"]
                .as_str()
                .or_else(|| course["hippodrome"].as_str())
                .unwrap_or("")
                .to_uppercase();
            if !track.is_empty() && !runner.venue_affinity.contains(&track) {
                runner.venue_affinity.push(track);
            }
        }
    }
}

/// The arrival order nests dead heats: `[[7], [3, 5], [1]]`.
fn parse_finish_order(course: &serde_json::Value) -> Vec<u32> {
    let groups = match course["ordreArrivee"].as_array() {
        Some(a) => a,
        None => return Vec::new(),
    };

    let mut order = Vec::new();
    for group in groups {
        match group.as_array() {
            Some(tied) => {
                for n in tied {
                    if let Some(n) = n.as_u64() {
                        order.push(n as u32);
                    }
                }
            }
            None => {
                if let Some(n) = group.as_u64() {
                    order.push(n as u32);
                }
            }
        }
    }
    order
}
