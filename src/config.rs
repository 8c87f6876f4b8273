//! Layered gateway configuration
//!
//! Sources, lowest precedence first: built-in defaults, `config/default`,
//! `config/{ENVIRONMENT}`, `config/local`, `TOLLBOOTH__*` environment
//! variables, then the conventional provider variables such as
//! `OPENAI_API_KEY`.

pub use ::config::ConfigError;
use ::config::{Config, Environment, File};
use crate::providers::constants::base_urls;
use crate::proxy::{ProxyConfig, RequestSizeLimit};
use crate::scheduler::{IntervalSettings, SchedulerConfig, TimeOfDayPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub scheduler: SchedulerSettings,
    pub providers: ProvidersSettings,
    pub billing: BillingSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    /// Full connection URL; takes precedence over the individual parts
    #[serde(default)]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub max_connections: u32,
    pub ledger_backend: LedgerBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    pub concurrency: usize,
    pub min_interval_ms: u64,
    pub peak_interval_ms: u64,
    pub off_peak_interval_ms: u64,
    pub max_interval_ms: u64,
    pub recompute_every_secs: u64,
    pub utc_offset_hours: i32,
    pub off_peak_start_minute: u32,
    pub off_peak_end_minute: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// OpenRouter attribution, ignored elsewhere
    #[serde(default)]
    pub http_referer: Option<String>,
    #[serde(default)]
    pub x_title: Option<String>,
    pub connect_timeout_secs: u64,
}

impl ProviderSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersSettings {
    pub openai: ProviderSettings,
    pub openrouter: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub gemini: ProviderSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BillingSettings {
    pub enabled: bool,
    /// Environment variable holding the pricing override JSON
    pub pricing_override_env: String,
    /// Completion budget assumed by the pre-flight check when unset
    pub default_max_tokens: u64,
    /// Starting balances in cents for the memory ledger
    #[serde(default)]
    pub memory_balances: HashMap<String, i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    /// `pw_a:perm1,perm2;pw_b:perm3`
    pub feature_passwords: String,
    pub feature_passwords_enabled: bool,
    /// Reject callers without a platform session instead of forwarding them
    pub require_user: bool,
    /// Static session token to user ID table
    #[serde(default)]
    pub session_tokens: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

/// Conventional variables and the settings keys they override
const CONVENTIONAL_OVERRIDES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "providers.openai.api_key"),
    ("OPENAI_BASE_URL", "providers.openai.base_url"),
    ("OPENROUTER_API_KEY", "providers.openrouter.api_key"),
    ("OPENROUTER_BASE_URL", "providers.openrouter.base_url"),
    ("OPENROUTER_HTTP_REFERER", "providers.openrouter.http_referer"),
    ("OPENROUTER_X_TITLE", "providers.openrouter.x_title"),
    ("DEEPSEEK_API_KEY", "providers.deepseek.api_key"),
    ("DEEPSEEK_BASE_URL", "providers.deepseek.base_url"),
    ("GEMINI_API_KEY", "providers.gemini.api_key"),
    ("GEMINI_BASE_URL", "providers.gemini.base_url"),
    ("FEATURE_PASSWORDS", "auth.feature_passwords"),
    ("DATABASE_URL", "database.url"),
];

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(|name| env::var(name).ok())
    }

    /// Load with `lookup` standing in for the process environment
    /// when reading the conventional variables
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let mut builder = Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment.clone())?
            .set_default("application.max_request_bytes", 10 * 1024 * 1024)?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "password")?
            .set_default("database.database_name", "tollbooth")?
            .set_default("database.max_connections", 10)?
            .set_default("database.ledger_backend", "postgres")?
            .set_default("scheduler.concurrency", 1)?
            .set_default("scheduler.min_interval_ms", 200)?
            .set_default("scheduler.peak_interval_ms", 2_000)?
            .set_default("scheduler.off_peak_interval_ms", 500)?
            .set_default("scheduler.max_interval_ms", 60_000)?
            .set_default("scheduler.recompute_every_secs", 15 * 60)?
            .set_default("scheduler.utc_offset_hours", 8)?
            .set_default("scheduler.off_peak_start_minute", 30)?
            .set_default("scheduler.off_peak_end_minute", 8 * 60 + 30)?
            .set_default("providers.openai.base_url", "https://api.openai.com/v1")?
            .set_default("providers.openai.connect_timeout_secs", 10)?
            .set_default("providers.openrouter.base_url", base_urls::OPENROUTER)?
            .set_default("providers.openrouter.connect_timeout_secs", 10)?
            .set_default("providers.deepseek.base_url", base_urls::DEEPSEEK)?
            .set_default("providers.deepseek.connect_timeout_secs", 10)?
            .set_default("providers.gemini.base_url", base_urls::GEMINI)?
            .set_default("providers.gemini.connect_timeout_secs", 10)?
            .set_default("billing.enabled", true)?
            .set_default("billing.pricing_override_env", "AI_PRICING_JSON")?
            .set_default("billing.default_max_tokens", 1024)?
            .set_default("auth.feature_passwords", "")?
            .set_default("auth.feature_passwords_enabled", true)?
            .set_default("auth.require_user", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("TOLLBOOTH").separator("__"));

        for (variable, key) in CONVENTIONAL_OVERRIDES {
            let value = lookup(variable).filter(|value| !value.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        // Anything but a literal "false" leaves the check on
        let enabled = lookup("FEATURE_PASSWORD_ENABLED").map(|value| value.trim() != "false");
        builder = builder.set_override_option("auth.feature_passwords_enabled", enabled)?;

        builder.build()?.try_deserialize()
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = self.database.url.as_deref().filter(|url| !url.is_empty()) {
            return url.to_string();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database_name
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let scheduler = &self.scheduler;
        SchedulerConfig {
            concurrency: scheduler.concurrency,
            intervals: IntervalSettings {
                min_ms: scheduler.min_interval_ms,
                peak_ms: scheduler.peak_interval_ms,
                off_peak_ms: scheduler.off_peak_interval_ms,
                max_ms: scheduler.max_interval_ms,
            },
            policy: TimeOfDayPolicy {
                utc_offset_hours: scheduler.utc_offset_hours,
                off_peak_start_minute: scheduler.off_peak_start_minute,
                off_peak_end_minute: scheduler.off_peak_end_minute,
            },
            recompute_every: Duration::from_secs(scheduler.recompute_every_secs.max(1)),
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            max_request_size: RequestSizeLimit::try_new(self.application.max_request_bytes)
                .unwrap_or_else(|_| RequestSizeLimit::default_limit()),
            require_user: self.auth.require_user,
        }
    }
}
