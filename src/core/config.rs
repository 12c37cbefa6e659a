use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;

/// API credentials for one exchange account
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub exchange: String,
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub passphrase: Option<Secret<String>>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeCredentials", 4)?;
        state.serialize_field("exchange", &self.exchange)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field(
            "passphrase",
            &self.passphrase.as_ref().map(|_| "[REDACTED]"),
        )?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeCredentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CredentialsHelper {
            exchange: String,
            api_key: String,
            secret_key: String,
            passphrase: Option<String>,
        }

        let helper = CredentialsHelper::deserialize(deserializer)?;
        Ok(Self {
            exchange: helper.exchange,
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            passphrase: helper.passphrase.map(Secret::new),
        })
    }
}

impl ExchangeCredentials {
    #[must_use]
    pub fn new(exchange: impl Into<String>, api_key: String, secret_key: String) -> Self {
        Self {
            exchange: exchange.into(),
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: None,
        }
    }

    #[must_use]
    pub fn with_passphrase(mut self, passphrase: String) -> Self {
        self.passphrase = Some(Secret::new(passphrase));
        self
    }

    /// Create credentials from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` (e.g., `KUCOIN_API_KEY`)
    /// - `{EXCHANGE}_SECRET_KEY`
    /// - `{EXCHANGE}_PASSPHRASE` (optional)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);
        let passphrase_var = format!("{}_PASSPHRASE", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let mut credentials = Self::new(exchange_prefix.to_lowercase(), api_key, secret_key);
        if let Ok(passphrase) = env::var(&passphrase_var) {
            credentials = credentials.with_passphrase(passphrase);
        }
        Ok(credentials)
    }

    /// Load a `.env` file (if present) before reading the environment
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        load_env_file(".env")?;
        Self::from_env(exchange_prefix)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.expose_secret().as_str())
    }
}

/// Load environment variables from a file, tolerating a missing file
#[cfg(feature = "env-file")]
pub fn load_env_file(path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            path, e
        ))),
    }
}

/// Per-stage network deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub resolve: Duration,
    pub connect: Duration,
    pub tls_handshake: Duration,
    pub send: Duration,
    pub receive: Duration,
    pub ws_upgrade: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            resolve: Duration::from_secs(5),
            connect: Duration::from_secs(5),
            tls_handshake: Duration::from_secs(10),
            send: Duration::from_secs(20),
            receive: Duration::from_secs(10),
            ws_upgrade: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    pub fn with_resolve(mut self, timeout: Duration) -> Self {
        self.resolve = timeout;
        self
    }

    pub fn with_connect(mut self, timeout: Duration) -> Self {
        self.connect = timeout;
        self
    }

    pub fn with_tls_handshake(mut self, timeout: Duration) -> Self {
        self.tls_handshake = timeout;
        self
    }

    pub fn with_send(mut self, timeout: Duration) -> Self {
        self.send = timeout;
        self
    }

    pub fn with_receive(mut self, timeout: Duration) -> Self {
        self.receive = timeout;
        self
    }

    pub fn with_ws_upgrade(mut self, timeout: Duration) -> Self {
        self.ws_upgrade = timeout;
        self
    }
}

/// Settings shared by every connector instance
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub timeouts: TimeoutConfig,
    /// Fixed delay between a failed session and the next bootstrap
    pub backoff: Duration,
    pub user_agent: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            backoff: Duration::from_secs(5),
            user_agent: "Streamlink/0.1".to_string(),
        }
    }
}

impl ConnectorConfig {
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Read `STREAM_BACKOFF_MS` and `STREAM_CONNECT_TIMEOUT_MS` overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = read_millis("STREAM_BACKOFF_MS")? {
            config.backoff = ms;
        }
        if let Some(ms) = read_millis("STREAM_CONNECT_TIMEOUT_MS")? {
            config.timeouts.connect = ms;
        }
        Ok(config)
    }
}

fn read_millis(var: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::InvalidConfiguration(format!("{}: {}", var, e))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
