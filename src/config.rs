use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEV_BASE_URL: &str = "http://localhost:8000";
const STAGING_BASE_URL: &str = "https://moments-staging.up.railway.app";
const PRODUCTION_BASE_URL: &str = "https://moments-api.up.railway.app";
const DOWNLOAD_DIR_NAME: &str = "moments";

pub const DEFAULT_UPLOAD_PATH: &str = "/api/v1/upload";
pub const VERSIONED_UPLOAD_PATH: &str = "/api/v1/upload/video";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const QUALITY: &str = "high";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Reads `MOMENTS_ENV`; without it, debug builds talk to a local backend.
    pub fn current() -> Self {
        match env::var("MOMENTS_ENV") {
            Ok(raw) => Self::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Unknown MOMENTS_ENV '{}', using build default", raw);
                Self::build_default()
            }),
            Err(_) => Self::build_default(),
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "staging" => Some(Self::Staging),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }

    fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Development => DEV_BASE_URL,
            Self::Staging => STAGING_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Development => Duration::from_secs(300),
            Self::Staging => Duration::from_secs(180),
            Self::Production => Duration::from_secs(120),
        }
    }

    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Staging => "info",
            Self::Production => "error",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Development => "DEV",
            Self::Staging => "STAGING",
            Self::Production => "PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Settings read once at startup. Cloned into whatever needs them, never mutated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub api_base_url: String,
    pub api_timeout: Duration,
    pub upload_path: String,
    pub poll_interval: Duration,
    pub download_dir: PathBuf,
}

impl AppConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            api_base_url: environment.default_base_url().to_string(),
            api_timeout: environment.default_timeout(),
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            download_dir: env::temp_dir().join(DOWNLOAD_DIR_NAME),
        }
    }

    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::for_environment(Environment::current());

        if let Ok(url) = env::var("API_BASE_URL") {
            config.api_base_url = normalize_base_url(&url);
        }
        if let Some(secs) = parse_env_u64("MOMENTS_API_TIMEOUT_SECS") {
            config.api_timeout = Duration::from_secs(secs.max(1));
        }
        if let Ok(path) = env::var("MOMENTS_UPLOAD_PATH") {
            config.upload_path = normalize_upload_path(&path);
        }
        if let Some(ms) = parse_env_u64("MOMENTS_POLL_INTERVAL_MS") {
            config.poll_interval = poll_interval_from_ms(ms);
        }
        if let Ok(dir) = env::var("MOMENTS_DOWNLOAD_DIR") {
            if !dir.trim().is_empty() {
                config.download_dir = PathBuf::from(dir.trim());
            }
        }

        config
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.api_base_url = normalize_base_url(url);
        self
    }

    pub fn describe(&self) -> String {
        format!(
            "env={} api={} timeout={}s upload={} poll={}ms downloads={}",
            self.environment,
            self.api_base_url,
            self.api_timeout.as_secs(),
            self.upload_path,
            self.poll_interval.as_millis(),
            self.download_dir.display()
        )
    }
}

/// Highlight length preset sent with every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub target_duration: u32,
    pub min_segment_duration: u32,
    pub max_segment_duration: u32,
}

impl VideoConfig {
    pub const QUICK: VideoConfig = VideoConfig {
        target_duration: 15,
        min_segment_duration: 2,
        max_segment_duration: 5,
    };

    pub const STANDARD: VideoConfig = VideoConfig {
        target_duration: 30,
        min_segment_duration: 3,
        max_segment_duration: 10,
    };

    pub const EXTENDED: VideoConfig = VideoConfig {
        target_duration: 60,
        min_segment_duration: 5,
        max_segment_duration: 15,
    };

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(Self::QUICK),
            "standard" => Some(Self::STANDARD),
            "extended" => Some(Self::EXTENDED),
            _ => None,
        }
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("target_duration", self.target_duration.to_string()),
            ("quality", QUALITY.to_string()),
        ]
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

pub fn normalize_base_url(input: &str) -> String {
    input.trim().trim_end_matches('/').to_string()
}

pub fn normalize_upload_path(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_UPLOAD_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Intervals below the floor would hammer the status endpoint.
pub fn poll_interval_from_ms(ms: u64) -> Duration {
    if ms < MIN_POLL_INTERVAL_MS {
        tracing::warn!(
            "Poll interval {}ms below {}ms floor, using {}ms",
            ms,
            MIN_POLL_INTERVAL_MS,
            MIN_POLL_INTERVAL_MS
        );
        return Duration::from_millis(MIN_POLL_INTERVAL_MS);
    }
    Duration::from_millis(ms)
}

fn parse_env_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}='{}': not a number", key, raw);
            None
        }
    }
}
