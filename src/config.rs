use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "AMApill";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for every persisted client storage key.
pub const STORAGE_PREFIX: &str = "amapill_";

/// Kakao OAuth authorize endpoint.
pub const KAKAO_AUTHORIZE_URL: &str = "https://kauth.kakao.com/oauth/authorize";

/// Refresh the access token when it expires within this many seconds.
pub const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Number of calendar dates the medication log cache keeps (two months).
pub const DEFAULT_LOG_CACHE_DATES: usize = 62;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Environment variable holding the tracing filter.
pub const LOG_ENV: &str = "AMAPILL_LOG";

/// Log filter used when `AMAPILL_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "amapill_client=info,amapill_listen=info,warn"
}

/// Per-user data directory, e.g. ~/.local/share/amapill on Linux.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join("amapill"))
        .ok_or(ConfigError::NoDataDir)
}

/// JSON file backing persisted client storage.
pub fn storage_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("storage.json"))
}

// ═══════════════════════════════════════════════════════════
// Deployment profiles
// ═══════════════════════════════════════════════════════════

/// Where the client talks to.
///
/// `Dev` reaches each backend service directly; `Production` goes through
/// the reverse proxy, so REST and the event stream share one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Dev,
    Production,
}

impl std::str::FromStr for Deployment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Production),
            other => Err(ConfigError::Invalid {
                var: "AMAPILL_DEPLOYMENT",
                value: other.to_string(),
            }),
        }
    }
}

/// Kakao application settings for the OAuth redirect flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KakaoConfig {
    pub client_id: String,
    pub redirect_uri: String,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub deployment: Deployment,
    /// REST base, without trailing slash (e.g. `http://localhost:8080/api`).
    pub api_base_url: String,
    /// Event stream base, without trailing slash.
    pub events_base_url: String,
    pub kakao: Option<KakaoConfig>,
    pub request_timeout_secs: u64,
    pub token_refresh_margin_secs: i64,
    pub log_cache_dates: usize,
}

impl ClientConfig {
    /// Local development: API gateway on 8080, notification service on 8081.
    pub fn dev() -> Self {
        Self::with_urls(
            Deployment::Dev,
            "http://localhost:8080/api",
            "http://localhost:8081",
        )
    }

    /// Production behind the reverse proxy at `origin`.
    pub fn production(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self::with_urls(
            Deployment::Production,
            &format!("{origin}/api"),
            &format!("{origin}/api"),
        )
    }

    fn with_urls(deployment: Deployment, api: &str, events: &str) -> Self {
        Self {
            deployment,
            api_base_url: api.trim_end_matches('/').to_string(),
            events_base_url: events.trim_end_matches('/').to_string(),
            kakao: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_refresh_margin_secs: DEFAULT_TOKEN_REFRESH_MARGIN_SECS,
            log_cache_dates: DEFAULT_LOG_CACHE_DATES,
        }
    }

    /// Read configuration from `AMAPILL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let deployment = match lookup("AMAPILL_DEPLOYMENT") {
            Some(raw) => raw.parse()?,
            None => Deployment::Dev,
        };

        let mut config = match deployment {
            Deployment::Dev => Self::dev(),
            Deployment::Production => {
                let origin = lookup("AMAPILL_ORIGIN").ok_or(ConfigError::Missing("AMAPILL_ORIGIN"))?;
                Self::production(&origin)
            }
        };

        if let Some(api) = lookup("AMAPILL_API_BASE_URL") {
            config.api_base_url = api.trim_end_matches('/').to_string();
        }
        if let Some(events) = lookup("AMAPILL_EVENTS_BASE_URL") {
            config.events_base_url = events.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("AMAPILL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "AMAPILL_REQUEST_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
        }

        config.kakao = match (
            lookup("AMAPILL_KAKAO_CLIENT_ID"),
            lookup("AMAPILL_KAKAO_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(redirect_uri)) => Some(KakaoConfig {
                client_id,
                redirect_uri,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("AMAPILL_KAKAO_REDIRECT_URI")),
            (None, Some(_)) => return Err(ConfigError::Missing("AMAPILL_KAKAO_CLIENT_ID")),
        };

        Ok(config)
    }
}

/// Errors resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error("Cannot determine user data directory")]
    NoDataDir,
}
