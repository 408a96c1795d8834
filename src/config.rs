//! Environment configuration
//!
//! Everything is read once at startup and passed down explicitly; no
//! component reaches for the environment on its own.

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(AgentError::Config(format!("unknown LLM_PROVIDER '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm_provider: LlmProvider,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Override for the Gemini endpoint (proxies, local stubs)
    pub gemini_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    /// Offline echo generator instead of a hosted model
    pub fake_llm: bool,
    /// Postgres URL for the shared store; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub cache_ttl: Duration,
    pub rate_limit: u64,
    pub rate_window_secs: u64,
    pub brapi_base_url: String,
    pub brapi_token: Option<String>,
    pub buy_threshold: f64,
    pub reports_dir: PathBuf,
    pub port: u16,
    /// API chat sessions idle longer than this are evicted
    pub session_idle: Duration,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::Gemini,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: None,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            fake_llm: false,
            database_url: None,
            cache_ttl: Duration::from_secs(86_400),
            rate_limit: 5,
            rate_window_secs: 60,
            brapi_base_url: "https://brapi.dev/api".to_string(),
            brapi_token: None,
            buy_threshold: 7.0,
            reports_dir: PathBuf::from("reports"),
            port: 8080,
            session_idle: Duration::from_secs(30 * 60),
            max_sessions: 10_000,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary lookup; `from_env` is this over `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| get(key).map(|v| v.trim() == "1").unwrap_or(false);

        let llm_provider = match get("LLM_PROVIDER") {
            Some(value) => value.parse()?,
            None => defaults.llm_provider,
        };

        let database_url = if flag("FAKE_CACHE") {
            None
        } else {
            get("POSTGRES_URL").or_else(|| get("DATABASE_URL"))
        };

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(value) => parse_number("PORT", &value)?,
            None => defaults.port,
        };

        Ok(Self {
            llm_provider,
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: get("GEMINI_BASE_URL"),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: get("OPENAI_BASE_URL"),
            fake_llm: flag("FAKE_LLM"),
            database_url,
            cache_ttl: match get("CACHE_TTL_SECS") {
                Some(value) => Duration::from_secs(parse_number("CACHE_TTL_SECS", &value)?),
                None => defaults.cache_ttl,
            },
            rate_limit: match get("RATE_LIMIT") {
                Some(value) => parse_number("RATE_LIMIT", &value)?,
                None => defaults.rate_limit,
            },
            rate_window_secs: match get("RATE_WINDOW_SECS") {
                Some(value) => parse_number("RATE_WINDOW_SECS", &value)?,
                None => defaults.rate_window_secs,
            },
            brapi_base_url: get("BRAPI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.brapi_base_url),
            brapi_token: get("BRAPI_TOKEN"),
            buy_threshold: match get("BUY_THRESHOLD") {
                Some(value) => parse_number("BUY_THRESHOLD", &value)?,
                None => defaults.buy_threshold,
            },
            reports_dir: get("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            port,
            session_idle: match get("SESSION_IDLE_SECS") {
                Some(value) => Duration::from_secs(parse_number("SESSION_IDLE_SECS", &value)?),
                None => defaults.session_idle,
            },
            max_sessions: match get("MAX_SESSIONS") {
                Some(value) => parse_number("MAX_SESSIONS", &value)?,
                None => defaults.max_sessions,
            },
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{} must be a number, got '{}'", key, value)))
}
