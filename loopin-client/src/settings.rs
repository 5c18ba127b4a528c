use anyhow::{Context, Result, anyhow};

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the realtime database.
    pub database_url: String,
    /// Web API key sent with every auth request.
    pub api_key: String,
    /// Base URL of the identity service.
    pub auth_url: String,
    /// Base URL of the blob store bucket.
    pub storage_url: String,
    /// Log filter directive.
    pub log_level: String,
    /// Connection timeout for all HTTP clients, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout for reads and writes, in seconds.
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Reads the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let database_url =
            get_required("LOOPIN_DATABASE_URL").context("LOOPIN_DATABASE_URL is required")?;
        let api_key = get_required("LOOPIN_API_KEY").context("LOOPIN_API_KEY is required")?;
        let auth_url = std::env::var("LOOPIN_AUTH_URL")
            .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com/v1".to_string());
        let storage_url =
            get_required("LOOPIN_STORAGE_URL").context("LOOPIN_STORAGE_URL is required")?;
        let log_level = std::env::var("LOOPIN_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        let connect_timeout_secs = parse_u64_env("LOOPIN_CONNECT_TIMEOUT_SECS", 5)?;
        let request_timeout_secs = parse_u64_env("LOOPIN_REQUEST_TIMEOUT_SECS", 15)?;

        Ok(Self {
            database_url,
            api_key,
            auth_url,
            storage_url,
            log_level,
            connect_timeout_secs,
            request_timeout_secs,
        })
    }
}

fn get_required(key: &str) -> Result<String> {
    let value = std::env::var(key)?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("{key} must not be empty"));
    }
    Ok(value)
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64> {
    let value = std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}
