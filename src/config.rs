use clap::Parser;

/// Harness-racing analysis and wagering recommendation service
#[derive(Parser, Debug, Clone)]
#[command(name = "turfpilot", version, about)]
pub struct Config {
    /// Betting budget per race (currency units)
    #[arg(long, env = "RACE_BUDGET", default_value = "20.0")]
    pub budget: f64,

    /// Smallest stake increment accepted by the betting operator
    #[arg(long, env = "CURRENCY_STEP", default_value = "0.5")]
    pub currency_step: f64,

    /// Minimum relative edge for a value signal (0.10 = 10%)
    #[arg(long, env = "EDGE_THRESHOLD", default_value = "0.10")]
    pub edge_threshold: f64,

    /// Minimum model win probability for a value signal
    #[arg(long, env = "MODEL_PROB_FLOOR", default_value = "0.15")]
    pub model_prob_floor: f64,

    /// Classifier confidence below which no bets are recommended (1-10)
    #[arg(long, env = "KILL_SWITCH_CONFIDENCE", default_value = "6")]
    pub kill_switch_confidence: u8,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "turfpilot.db")]
    pub database_path: String,

    /// Racing-data API base URL
    #[arg(
        long,
        env = "PMU_API_URL",
        default_value = "https://online.turfinfo.api.pmu.fr/rest/client/1"
    )]
    pub pmu_api_url: String,

    /// Advisory (LLM) API base URL
    #[arg(
        long,
        env = "ADVISORY_API_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub advisory_api_url: String,

    /// Advisory API key; without it the deterministic path runs alone
    #[arg(long, env = "ADVISORY_API_KEY")]
    pub advisory_api_key: Option<String>,

    /// Advisory model name
    #[arg(long, env = "ADVISORY_MODEL", default_value = "gemini-2.0-flash")]
    pub advisory_model: String,

    /// Hard deadline for one advisory consultation, in seconds
    #[arg(long, env = "ADVISORY_TIMEOUT_SECS", default_value = "12")]
    pub advisory_timeout_secs: u64,

    /// Retries after a transient advisory failure
    #[arg(long, env = "ADVISORY_MAX_RETRIES", default_value = "2")]
    pub advisory_max_retries: u32,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.budget <= 0.0 {
            anyhow::bail!("budget must be positive");
        }
        if self.currency_step <= 0.0 || self.currency_step > self.budget {
            anyhow::bail!("currency_step must be positive and no larger than the budget");
        }
        if !(0.0..=1.0).contains(&self.edge_threshold) {
            anyhow::bail!("edge_threshold must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.model_prob_floor) {
            anyhow::bail!("model_prob_floor must be between 0.0 and 1.0");
        }
        if !(1..=10).contains(&self.kill_switch_confidence) {
            anyhow::bail!("kill_switch_confidence must be between 1 and 10");
        }
        if self.advisory_timeout_secs == 0 {
            anyhow::bail!("advisory_timeout_secs must be positive");
        }
        Ok(())
    }
}
