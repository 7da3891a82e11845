//! Configuration types, built from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Default completion API base (OpenAI-compatible).
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default completion model.
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
/// Default payment provider API base.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
/// Hourly, on the hour (seconds-resolution cron).
pub const DEFAULT_SYNC_SCHEDULE: &str = "0 0 * * * *";

/// Where persisted entities live.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Hosted BaaS reached over its REST interface.
    Baas {
        url: String,
        service_key: SecretString,
    },
    /// Local libSQL file.
    Local { path: PathBuf },
}

/// Payment provider configuration. Absent when `STRIPE_SECRET_KEY` is unset.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub secret_key: SecretString,
    pub api_base: String,
    pub webhook_secret: Option<SecretString>,
    /// Maximum accepted webhook timestamp age. `None` disables the check.
    pub webhook_tolerance: Option<Duration>,
}

/// Subscription sync job configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub schedule: String,
    /// Rows fetched per page while walking local subscriptions.
    pub page_size: usize,
    /// Days past the period end after which a past-due subscription is cancelled.
    pub past_due_cancel_days: i64,
    /// Flow-state rows untouched for this many days are pruned.
    pub flow_state_retention_days: i64,
    /// Messages older than this many days are pruned.
    pub message_retention_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: DEFAULT_SYNC_SCHEDULE.to_string(),
            page_size: 100,
            past_due_cancel_days: 30,
            flow_state_retention_days: 30,
            message_retention_days: 90,
        }
    }
}

/// Sampling parameters for the coach dialogue.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// Sampling parameters for workout generation.
#[derive(Debug, Clone)]
pub struct WorkoutConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub payment: Option<PaymentConfig>,
    pub sync: SyncConfig,
    pub coach: CoachConfig,
    pub workout: WorkoutConfig,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_parse("FITCRAFT_PORT")?.unwrap_or(8080);

        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GROQ_API_KEY".to_string()))?;
        let llm = LlmConfig {
            api_key: SecretString::from(api_key),
            base_url: env_or("FITCRAFT_LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            model: env_or("FITCRAFT_LLM_MODEL", DEFAULT_LLM_MODEL),
            timeout: env_parse::<u64>("FITCRAFT_LLM_TIMEOUT_SECS")?.map(Duration::from_secs),
        };

        let storage = match (
            std::env::var("SUPABASE_URL").ok(),
            std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
        ) {
            (Some(url), Some(key)) => StorageConfig::Baas {
                url: url.trim_end_matches('/').to_string(),
                service_key: SecretString::from(key),
            },
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar(
                    "SUPABASE_SERVICE_ROLE_KEY".to_string(),
                ));
            }
            _ => StorageConfig::Local {
                path: PathBuf::from(env_or("FITCRAFT_DB_PATH", "./data/fitcraft.db")),
            },
        };

        let payment = match std::env::var("STRIPE_SECRET_KEY") {
            Ok(key) => {
                let tolerance_secs: u64 =
                    env_parse("STRIPE_WEBHOOK_TOLERANCE_SECS")?.unwrap_or(300);
                Some(PaymentConfig {
                    secret_key: SecretString::from(key),
                    api_base: env_or("STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE)
                        .trim_end_matches('/')
                        .to_string(),
                    webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                        .ok()
                        .map(SecretString::from),
                    webhook_tolerance: (tolerance_secs > 0)
                        .then(|| Duration::from_secs(tolerance_secs)),
                })
            }
            Err(_) => None,
        };

        let sync = SyncConfig {
            enabled: env_parse("FITCRAFT_SYNC_ENABLED")?.unwrap_or(payment.is_some()),
            schedule: env_or("FITCRAFT_SYNC_SCHEDULE", DEFAULT_SYNC_SCHEDULE),
            ..SyncConfig::default()
        };

        Ok(Self {
            port,
            llm,
            storage,
            payment,
            sync,
            coach: CoachConfig::default(),
            workout: WorkoutConfig::default(),
            log_dir: std::env::var("FITCRAFT_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional env var, failing loudly on a malformed value.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
