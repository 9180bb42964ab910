use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default directory holding the PEM key files.
pub const DEFAULT_KEYS_DIR: &str = "keys";

/// Default scheme for the `redirect_uri` sent to the broker.
pub const DEFAULT_PUBLIC_SCHEME: &str = "https";

/// Default organization name published in the entity statement.
pub const DEFAULT_ORGANIZATION_NAME: &str = "Saippuakauppias";

/// Default English service provider name shown by the broker.
pub const DEFAULT_SPNAME_EN: &str = "Soap for the people";

/// Default timeout for outbound broker calls.
pub const DEFAULT_BROKER_HTTP_TIMEOUT_SECONDS: u64 = 5;

/// Minimum allowed broker timeout.
pub const MIN_BROKER_HTTP_TIMEOUT_SECONDS: u64 = 1;

/// Maximum allowed broker timeout.
pub const MAX_BROKER_HTTP_TIMEOUT_SECONDS: u64 = 60;

/// Default upper bound on stored sessions.
pub const DEFAULT_SESSION_MAX_ENTRIES: usize = 10_000;

/// Relying party configuration.
///
/// `isb_host` and `client_id` are optional at startup so the trust
/// documents can still be served; flows that need them fail with a
/// configuration error instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub isb_host: Option<String>,
    pub isb_base_url: Option<String>,
    pub client_id: Option<String>,
    pub spname: BTreeMap<String, String>,
    pub keys_dir: PathBuf,
    pub public_scheme: String,
    pub organization_name: String,
    pub broker_http_timeout_seconds: u64,
    pub session_cookie_secure: bool,
    pub session_max_entries: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid SPNAME: {0}")]
    InvalidSpname(String),

    #[error("Invalid BROKER_HTTP_TIMEOUT_SECONDS: {0}")]
    InvalidTimeout(String),

    #[error("Invalid PUBLIC_SCHEME: {0}")]
    InvalidScheme(String),

    #[error("Invalid ISB_BASE_URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid SESSION_COOKIE_SECURE: {0}")]
    InvalidBool(String),

    #[error("Invalid SESSION_MAX_ENTRIES: {0}")]
    InvalidSessionLimit(String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // Empty values count as unset
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let bind_address = get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let isb_host = get("ISB_HOST");

        let isb_base_url = match get("ISB_BASE_URL") {
            Some(url) => {
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(ConfigError::InvalidBaseUrl(
                        "must start with http:// or https://".to_string(),
                    ));
                }
                Some(url.trim_end_matches('/').to_string())
            }
            None => None,
        };

        let client_id = get("CLIENT_ID");

        let spname = match get("SPNAME") {
            Some(raw) => parse_spname(&raw)?,
            None => BTreeMap::from([("en".to_string(), DEFAULT_SPNAME_EN.to_string())]),
        };

        let keys_dir = PathBuf::from(get("KEYS_DIR").unwrap_or_else(|| DEFAULT_KEYS_DIR.to_string()));

        let public_scheme =
            get("PUBLIC_SCHEME").unwrap_or_else(|| DEFAULT_PUBLIC_SCHEME.to_string());
        if public_scheme != "https" && public_scheme != "http" {
            return Err(ConfigError::InvalidScheme(format!(
                "expected http or https, got {public_scheme}"
            )));
        }

        let organization_name =
            get("ORGANIZATION_NAME").unwrap_or_else(|| DEFAULT_ORGANIZATION_NAME.to_string());

        let broker_http_timeout_seconds = match get("BROKER_HTTP_TIMEOUT_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidTimeout(format!("{value_str} is not a number: {e}"))
                })?;
                if !(MIN_BROKER_HTTP_TIMEOUT_SECONDS..=MAX_BROKER_HTTP_TIMEOUT_SECONDS)
                    .contains(&value)
                {
                    return Err(ConfigError::InvalidTimeout(format!(
                        "must be between {MIN_BROKER_HTTP_TIMEOUT_SECONDS} and {MAX_BROKER_HTTP_TIMEOUT_SECONDS}, got {value}"
                    )));
                }
                value
            }
            None => DEFAULT_BROKER_HTTP_TIMEOUT_SECONDS,
        };

        let session_cookie_secure = match get("SESSION_COOKIE_SECURE") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::InvalidBool(value)),
            },
            None => true,
        };

        let session_max_entries = match get("SESSION_MAX_ENTRIES") {
            Some(value_str) => {
                let value: usize = value_str.parse().map_err(|e| {
                    ConfigError::InvalidSessionLimit(format!("{value_str} is not a number: {e}"))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidSessionLimit(
                        "must be at least 1".to_string(),
                    ));
                }
                value
            }
            None => DEFAULT_SESSION_MAX_ENTRIES,
        };

        Ok(Config {
            bind_address,
            isb_host,
            isb_base_url,
            client_id,
            spname,
            keys_dir,
            public_scheme,
            organization_name,
            broker_http_timeout_seconds,
            session_cookie_secure,
            session_max_entries,
        })
    }

    /// Base URL for outbound broker calls.
    ///
    /// Falls back to `https://{isb_host}` when `ISB_BASE_URL` is unset.
    pub fn broker_base_url(&self) -> Option<String> {
        self.isb_base_url
            .clone()
            .or_else(|| self.isb_host.as_ref().map(|host| format!("https://{host}")))
    }
}

fn parse_spname(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let spname: BTreeMap<String, String> = serde_json::from_str(raw)
        .map_err(|e| ConfigError::InvalidSpname(format!("not a JSON string map: {e}")))?;

    if !spname.contains_key("en") {
        return Err(ConfigError::InvalidSpname(
            "an \"en\" entry is required".to_string(),
        ));
    }

    Ok(spname)
}
