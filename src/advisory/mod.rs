//! External advisory (LLM) adapter.
//!
//! One advisory call per evaluation, bounded by a timeout and a small
//! retry budget. Only transient failures (timeout, rate-limit, 5xx) are
//! retried, with exponential backoff and jitter; auth, quota and malformed
//! responses fail immediately. The adapter itself enforces that no two
//! advisory calls are ever in flight at once.

pub mod prompt;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::models::{AdvisoryAnalysis, RaceCard, ScenarioVerdict, ScoredParticipant, ValueSignal};

/// Why an advisory call produced no usable opinion. Every variant is a
/// fallback condition for the strategy selector, never a user-facing error.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory request timed out")]
    Timeout,

    #[error("advisory rate-limited")]
    RateLimited,

    #[error("advisory quota exhausted")]
    QuotaExceeded,

    #[error("advisory authentication failed")]
    AuthFailed,

    #[error("malformed advisory response: {0}")]
    Malformed(String),

    #[error("advisory stakes {staked:.2} exceed budget {budget:.2}")]
    BudgetViolation { staked: f64, budget: f64 },

    #[error("advisory service error (HTTP {status})")]
    Http { status: u16 },

    #[error("advisory transport error: {0}")]
    Transport(String),

    #[error("advisory service not configured")]
    NotConfigured,
}

impl AdvisoryError {
    /// Worth another attempt? Permanent failures are not.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            AdvisoryError::Timeout
                | AdvisoryError::RateLimited
                | AdvisoryError::Http { status: 500..=599 }
                | AdvisoryError::Transport(_)
        )
    }
}

/// Client for a Gemini-style `generateContent` endpoint.
#[derive(Clone)]
pub struct AdvisoryClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
    /// One in-flight advisory call at a time, adapter-enforced.
    single_flight: Arc<Semaphore>,
}

impl AdvisoryClient {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build advisory HTTP client: {}", e))?;
        Ok(AdvisoryClient {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_retries,
            single_flight: Arc::new(Semaphore::new(1)),
        })
    }

    /// Ask the advisory service for its own read of the race.
    ///
    /// The returned analysis has already passed the same shape/budget
    /// validation as the deterministic allocator output.
    pub async fn advise(
        &self,
        card: &RaceCard,
        field: &[ScoredParticipant],
        verdict: &ScenarioVerdict,
        signals: &[ValueSignal],
        budget: f64,
    ) -> Result<AdvisoryAnalysis, AdvisoryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AdvisoryError::NotConfigured)?;

        // Serialize calls; dropping the permit on any exit path releases it
        let _permit = self
            .single_flight
            .acquire()
            .await
            .map_err(|_| AdvisoryError::Transport("adapter shut down".into()))?;

        let prompt_text = prompt::build_prompt(card, field, verdict, signals, budget);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt_text }] }],
            "generationConfig": {
                "temperature": 0.4,
                "response_mime_type": "application/json",
            },
        });
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, api_key
        );

        let mut attempt = 0u32;
        loop {
            match self.call_once(&url, &body, field, budget).await {
                Ok(analysis) => {
                    info!(
                        "Advisory opinion received: {:?}, {} bet(s), {:.2} staked",
                        analysis.scenario,
                        analysis.set.bets.len(),
                        analysis.set.total_stake
                    );
                    return Ok(analysis);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff_delay(attempt);
                    warn!(
                        "Advisory attempt {} failed ({}), retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!("Advisory failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn call_once(
        &self,
        url: &str,
        body: &serde_json::Value,
        field: &[ScoredParticipant],
        budget: f64,
    ) -> Result<AdvisoryAnalysis, AdvisoryError> {
        let resp = self.http.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                AdvisoryError::Timeout
            } else {
                AdvisoryError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), &text));
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AdvisoryError::Malformed(e.to_string()))?;
        let text = raw["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AdvisoryError::Malformed("no text candidate in response".into()))?;

        validate::validate_response(strip_json_wrapper(text), field, budget)
    }
}

fn classify_http_failure(status: u16, body: &str) -> AdvisoryError {
    match status {
        401 | 403 => AdvisoryError::AuthFailed,
        429 => {
            // Rate limit is transient; an exhausted daily quota is not
            if body.to_lowercase().contains("quota") {
                AdvisoryError::QuotaExceeded
            } else {
                AdvisoryError::RateLimited
            }
        }
        s => AdvisoryError::Http { status: s },
    }
}

/// Exponential backoff with jitter: 1s, 2s, 4s… plus up to 250ms.
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << (attempt - 1).min(4));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
    base + jitter
}

/// Models occasionally wrap the JSON in markdown fences or prose despite
/// instructions; keep only the outermost object.
fn strip_json_wrapper(text: &str) -> &str {
    let start = text.find('{').unwrap_or(0);
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    text.get(start..end).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AdvisoryError::Timeout.is_transient());
        assert!(AdvisoryError::RateLimited.is_transient());
        assert!(AdvisoryError::Http { status: 503 }.is_transient());
        assert!(!AdvisoryError::AuthFailed.is_transient());
        assert!(!AdvisoryError::QuotaExceeded.is_transient());
        assert!(!AdvisoryError::Malformed("x".into()).is_transient());
        assert!(!AdvisoryError::Http { status: 404 }.is_transient());
    }

    #[test]
    fn test_http_failure_classification() {
        assert!(matches!(
            classify_http_failure(401, ""),
            AdvisoryError::AuthFailed
        ));
        assert!(matches!(
            classify_http_failure(429, "slow down"),
            AdvisoryError::RateLimited
        ));
        assert!(matches!(
            classify_http_failure(429, "daily QUOTA exceeded"),
            AdvisoryError::QuotaExceeded
        ));
        assert!(matches!(
            classify_http_failure(500, ""),
            AdvisoryError::Http { status: 500 }
        ));
    }

    #[test]
    fn test_strip_json_wrapper() {
        assert_eq!(
            strip_json_wrapper("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_json_wrapper("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_json_wrapper("no json here"), "no json here");
    }

    #[test]
    fn test_backoff_grows() {
        assert!(backoff_delay(2) >= Duration::from_secs(2));
        assert!(backoff_delay(3) >= Duration::from_secs(4));
        // Capped exponent keeps the delay bounded
        assert!(backoff_delay(30) < Duration::from_secs(17));
    }
}
