//! Settings
//!
//! Read from the environment after loading an optional `.env` file. Every
//! value has a default except the model API key, which only the commands
//! that call the hosted model require.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Demo identity used when a request carries no user id
pub const DEMO_USER_ID: &str = "00000000-0000-0000-0000-000000000001";

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Settings {
    pub google_api_key: String,
    /// Model for the council stages
    pub chat_model: String,
    /// Model for journaling and meditation scripts
    pub utility_model: String,
    pub embedding_model: String,
    pub api_base: String,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub llm_timeout: Duration,
    pub retrieval_timeout: Duration,
    /// Zero disables idle eviction
    pub session_ttl: Duration,
    pub reset_situation_on_exit: bool,
    pub personas_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            chat_model: "gemini-3-flash-preview".to_string(),
            utility_model: "gemini-2.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            environment: "development".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            bind_addr: "0.0.0.0:8000".to_string(),
            data_dir: default_data_dir(),
            llm_timeout: Duration::from_secs(30),
            retrieval_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            reset_situation_on_exit: false,
            personas_path: None,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(anyhow!("Failed to load .env: {}", e));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GOOGLE_API_KEY") {
            settings.google_api_key = v;
        }
        if let Some(v) = get("MIRROR_CHAT_MODEL") {
            settings.chat_model = v;
        }
        if let Some(v) = get("MIRROR_UTILITY_MODEL") {
            settings.utility_model = v;
        }
        if let Some(v) = get("MIRROR_EMBEDDING_MODEL") {
            settings.embedding_model = v;
        }
        if let Some(v) = get("MIRROR_API_BASE") {
            settings.api_base = v;
        }
        if let Some(v) = get("ENVIRONMENT") {
            settings.environment = v;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            settings.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("MIRROR_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = get("MIRROR_DATA_DIR") {
            settings.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MIRROR_LLM_TIMEOUT_SECS") {
            settings.llm_timeout = Duration::from_secs(parse_var("MIRROR_LLM_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("MIRROR_RETRIEVAL_TIMEOUT_SECS") {
            settings.retrieval_timeout =
                Duration::from_secs(parse_var("MIRROR_RETRIEVAL_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("MIRROR_SESSION_TTL_SECS") {
            settings.session_ttl = Duration::from_secs(parse_var("MIRROR_SESSION_TTL_SECS", &v)?);
        }
        if let Some(v) = get("MIRROR_RESET_SITUATION_ON_EXIT") {
            settings.reset_situation_on_exit = parse_var("MIRROR_RESET_SITUATION_ON_EXIT", &v)?;
        }
        if let Some(v) = get("MIRROR_PERSONAS_PATH") {
            settings.personas_path = Some(PathBuf::from(v));
        }

        Ok(settings)
    }

    /// Fail early for commands that call the hosted model
    pub fn require_api_key(&self) -> Result<&str> {
        if self.google_api_key.is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY not set. Add it to the environment or .env"));
        }
        Ok(&self.google_api_key)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("journal.db")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{} has an invalid value: {:?}", key, raw))
}

fn default_data_dir() -> PathBuf {
    // XDG data dir on Linux, ~/Library/Application Support on macOS
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mirror")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(settings.llm_timeout, Duration::from_secs(30));
        assert!(!settings.reset_situation_on_exit);
        assert!(settings.require_api_key().is_err());
        assert!(settings.db_path().ends_with("journal.db"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "k"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("MIRROR_LLM_TIMEOUT_SECS", "5"),
            ("MIRROR_RESET_SITUATION_ON_EXIT", "true"),
            ("MIRROR_DATA_DIR", "/tmp/mirror-test"),
            ("ENVIRONMENT", "Production"),
        ]))
        .unwrap();

        assert_eq!(settings.require_api_key().unwrap(), "k");
        assert_eq!(settings.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(settings.llm_timeout, Duration::from_secs(5));
        assert!(settings.reset_situation_on_exit);
        assert_eq!(settings.db_path(), PathBuf::from("/tmp/mirror-test/journal.db"));
        assert!(settings.is_production());
    }

    #[test]
    fn test_bad_number_names_the_variable() {
        let err = Settings::from_lookup(lookup(&[("MIRROR_SESSION_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("MIRROR_SESSION_TTL_SECS"));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let settings = Settings::from_lookup(lookup(&[("MIRROR_CHAT_MODEL", "  ")])).unwrap();
        assert_eq!(settings.chat_model, "gemini-3-flash-preview");
    }
}
