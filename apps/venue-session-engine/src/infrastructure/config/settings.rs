//! Engine Configuration Settings
//!
//! Configuration types for the session engine, loaded from environment
//! variables. Each session role reads its own `VENUE_<ROLE>_*` block.

use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::fix::{
    Credentials, ReconnectConfig, SessionConfig, TlsMode, TlsSettings, TransportConfig,
};

/// Which session a settings block configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Quotes and market data.
    Pricing,
    /// Orders and execution reports.
    Trading,
}

impl SessionRole {
    /// Session label used in logs, metrics and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pricing => "pricing",
            Self::Trading => "trading",
        }
    }

    const fn env_prefix(self) -> &'static str {
        match self {
            Self::Pricing => "VENUE_PRICING_",
            Self::Trading => "VENUE_TRADING_",
        }
    }
}

/// Connection and session parameters for one role.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Role this block belongs to.
    pub role: SessionRole,
    /// Venue host.
    pub host: String,
    /// Venue port.
    pub port: u16,
    /// SenderCompID (49).
    pub sender_comp_id: String,
    /// TargetCompID (56).
    pub target_comp_id: String,
    /// TLS mode and certificate paths.
    pub tls: TlsMode,
    /// HeartBtInt.
    pub heartbeat_interval: Duration,
    /// Request a sequence reset on every logon.
    pub reset_on_logon: bool,
    /// File holding the next outbound MsgSeqNum.
    pub sequence_file: PathBuf,
    /// Raw message log; `None` disables it.
    pub message_log: Option<PathBuf>,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl SessionSettings {
    /// Default heartbeat interval.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    /// Default reconnect delay.
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

    fn from_lookup<F>(role: SessionRole, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = role.env_prefix();
        let key = |suffix: &str| format!("{prefix}{suffix}");

        let tls = if parse_bool(lookup, &key("TLS"), true)? {
            TlsMode::Enabled(TlsSettings {
                ca_file: lookup(&key("TLS_CA_FILE")).map(PathBuf::from),
                cert_file: lookup(&key("TLS_CERT_FILE")).map(PathBuf::from),
                key_file: lookup(&key("TLS_KEY_FILE")).map(PathBuf::from),
                server_name: lookup(&key("TLS_SERVER_NAME")),
            })
        } else {
            TlsMode::Disabled
        };

        Ok(Self {
            role,
            host: required(lookup, &key("HOST"))?,
            port: parse_required(lookup, &key("PORT"))?,
            sender_comp_id: required(lookup, &key("SENDER_COMP_ID"))?,
            target_comp_id: required(lookup, &key("TARGET_COMP_ID"))?,
            tls,
            heartbeat_interval: parse_secs(
                lookup,
                &key("HEARTBEAT_INTERVAL_SECS"),
                Self::DEFAULT_HEARTBEAT_INTERVAL,
            )?,
            reset_on_logon: parse_bool(lookup, &key("RESET_ON_LOGON"), false)?,
            sequence_file: lookup(&key("SEQUENCE_FILE"))
                .map_or_else(|| PathBuf::from(format!("data/{}.seq", role.as_str())), PathBuf::from),
            message_log: lookup(&key("MESSAGE_LOG")).map(PathBuf::from),
            reconnect_delay: parse_secs(
                lookup,
                &key("RECONNECT_DELAY_SECS"),
                Self::DEFAULT_RECONNECT_DELAY,
            )?,
        })
    }

    /// Build the controller configuration for this role.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let transport = TransportConfig {
            tls: self.tls.clone(),
            ..TransportConfig::plaintext(self.host.clone(), self.port)
        };
        let mut config = SessionConfig::new(
            self.role.as_str(),
            self.sender_comp_id.clone(),
            self.target_comp_id.clone(),
            transport,
        );
        config.heartbeat_interval = self.heartbeat_interval;
        config.reset_on_logon = self.reset_on_logon;
        config.reconnect = ReconnectConfig::fixed(self.reconnect_delay);
        config.message_log.clone_from(&self.message_log);
        config
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pricing session.
    pub pricing: SessionSettings,
    /// Separate trading session; `None` routes trades over the pricing
    /// session.
    pub trading: Option<SessionSettings>,
    /// Logon credentials; `None` leaves sessions idle until logon is called.
    pub credentials: Option<Credentials>,
    /// PartyID sent on NDF quote requests.
    pub liquidity_provider: Option<String>,
    /// Server settings.
    pub server: ServerSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pricing = SessionSettings::from_lookup(SessionRole::Pricing, &lookup)?;
        let trading = if lookup("VENUE_TRADING_HOST").is_some() {
            Some(SessionSettings::from_lookup(SessionRole::Trading, &lookup)?)
        } else {
            None
        };

        let credentials = match (lookup("VENUE_USERNAME"), lookup("VENUE_PASSWORD")) {
            (Some(username), Some(password)) => {
                if username.is_empty() {
                    return Err(ConfigError::EmptyValue("VENUE_USERNAME".to_string()));
                }
                Some(Credentials::new(username, password))
            }
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("VENUE_PASSWORD".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("VENUE_USERNAME".to_string())),
            (None, None) => None,
        };

        let server = ServerSettings {
            health_port: parse_or(&lookup, "VENUE_HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        Ok(Self {
            pricing,
            trading,
            credentials,
            liquidity_provider: lookup("VENUE_LIQUIDITY_PROVIDER").filter(|v| !v.is_empty()),
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable does not parse.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
}

fn parse_required<F, T>(lookup: &F, key: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    parse_value(key, required(lookup, key)?)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).map_or(Ok(default), |v| parse_value(key, v))
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |v| parse_value::<u64>(key, v).map(Duration::from_secs))
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}
